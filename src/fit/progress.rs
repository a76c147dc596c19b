//! Cancellation flag and progress sink shared by the driver and its workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use tracing::debug;

use crate::fit::FitMessage;

/// Emit a progress line every this many objective evaluations.
pub const PROGRESS_EVERY: usize = 100;

/// Cooperative abort flag, checked once per objective evaluation.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Where progress lines go: always the log, optionally a worker channel.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<Sender<FitMessage>>,
}

impl Progress {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn channel(tx: Sender<FitMessage>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, line: String) {
        debug!(target: "cyton::fit", "{line}");
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is listening any more.
            let _ = tx.send(FitMessage::Progress(line));
        }
    }
}

/// `ITER n [p1, p2, ...] rss`
pub fn format_progress_line(iteration: usize, values: &[f64], rss: f64) -> String {
    let params = values
        .iter()
        .map(|v| format!("{v:.4}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("ITER {iteration} [{params}] {rss:.6e}")
}
