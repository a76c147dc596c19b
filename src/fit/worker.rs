//! Run a fit on a dedicated thread and stream its messages.
//!
//! The worker sends any number of `Progress` lines followed by exactly one
//! `Finished`. The caller can raise the abort flag at any time; the driver
//! then returns its best completed iterate.

use std::thread::JoinHandle;

use chrono::Local;
use crossbeam_channel::{Receiver, unbounded};
use tracing::debug;

use crate::domain::{Experiment, FitOptions, FitResult, ParameterSet};
use crate::error::AppError;
use crate::fit::driver::FitDriver;
use crate::fit::progress::{AbortHandle, Progress};

#[derive(Debug)]
pub enum FitMessage {
    Progress(String),
    Finished(Result<FitResult, AppError>),
}

/// `[YYYY-MM-DD HH:MM:SS] Done fitting!`
pub fn done_message() -> String {
    format!("[{}] Done fitting!", Local::now().format("%Y-%m-%d %H:%M:%S"))
}

pub struct FitHandle {
    rx: Receiver<FitMessage>,
    abort: AbortHandle,
    thread: JoinHandle<()>,
}

/// Start `driver.fit(...)` on its own thread.
pub fn spawn_fit(
    driver: FitDriver,
    experiment: Experiment,
    params: ParameterSet,
    options: FitOptions,
) -> Result<FitHandle, AppError> {
    let (tx, rx) = unbounded();
    let abort = driver.abort_handle();
    let driver = driver.with_progress(Progress::channel(tx.clone()));

    let thread = std::thread::Builder::new()
        .name("cyton-fit".to_string())
        .spawn(move || {
            let result = driver.fit(&experiment, &params, &options);
            if result.is_ok() {
                let _ = tx.send(FitMessage::Progress(done_message()));
            }
            let _ = tx.send(FitMessage::Finished(result));
        })
        .map_err(|e| AppError::io(format!("Failed to start the fit thread: {e}")))?;

    Ok(FitHandle { rx, abort, thread })
}

impl FitHandle {
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn receiver(&self) -> &Receiver<FitMessage> {
        &self.rx
    }

    /// Forward progress lines to `on_progress` until the terminal message.
    pub fn wait_with(self, mut on_progress: impl FnMut(&str)) -> Result<FitResult, AppError> {
        let mut outcome = None;
        for msg in self.rx.iter() {
            match msg {
                FitMessage::Progress(line) => on_progress(&line),
                FitMessage::Finished(result) => {
                    outcome = Some(result);
                    break;
                }
            }
        }
        if self.thread.join().is_err() {
            return Err(AppError::numeric("The fit thread panicked."));
        }
        debug!("fit thread joined");
        outcome.unwrap_or_else(|| Err(AppError::numeric("The fit thread exited without a result.")))
    }

    pub fn wait(self) -> Result<FitResult, AppError> {
        self.wait_with(|_| {})
    }
}
