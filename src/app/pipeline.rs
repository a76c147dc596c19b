//! Shared simulate / fit / bootstrap workflows behind the CLI.
//!
//! The front-end only maps arguments onto [`RunSetup`] and prints; the steps
//! themselves live here so they can be driven from tests:
//!
//! - simulate: build model -> dense grid -> harvested rows
//! - fit: worker thread -> progress lines -> `FitResult` -> history update
//! - bootstrap: point fit -> resampled refits -> intervals

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::bootstrap::{BootstrapResult, run_bootstrap};
use crate::domain::{
    AlgorithmConfig, BootstrapConfig, DistributionConfig, Experiment, FitHistory, FitOptions, FitResult,
    ParameterSet, SimulationConfig,
};
use crate::error::AppError;
use crate::fit::{FitDriver, spawn_fit};
use crate::io::{load_history, save_history};
use crate::models::{ProfileTable, Simulation, build_model, simulate_harvested};

/// Everything a run needs besides the data.
#[derive(Debug, Clone)]
pub struct RunSetup {
    pub sim: SimulationConfig,
    pub dists: DistributionConfig,
    pub params: ParameterSet,
}

impl RunSetup {
    pub fn driver(&self) -> FitDriver {
        FitDriver::new(self.sim.clone(), self.dists)
    }
}

/// JSON layout of `simulate --export`.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationExport {
    pub model: &'static str,
    pub parameters: Vec<(String, f64)>,
    pub harvested: ProfileTable,
    pub dense: ProfileTable,
}

impl SimulationExport {
    pub fn new(setup: &RunSetup, simulation: &Simulation) -> Self {
        Self {
            model: setup.params.model.display_name(),
            parameters: setup.params.names().into_iter().zip(setup.params.values()).collect(),
            harvested: simulation.harvested.to_table(),
            dense: simulation.dense.to_table(),
        }
    }
}

/// Data-free simulation over `setup.sim.harvested_times`.
pub fn run_simulation(setup: &RunSetup) -> Result<Simulation, AppError> {
    setup.sim.validate()?;
    setup.params.validate()?;
    let model = build_model(setup.params.model, &setup.sim, &setup.dists);
    let simulation = simulate_harvested(
        model.as_ref(),
        &setup.params.values(),
        &setup.sim.harvested_times,
        setup.sim.time_inc,
    )?;
    info!(
        model = setup.params.model.display_name(),
        steps = simulation.dense.n_times(),
        "simulation finished"
    );
    Ok(simulation)
}

/// Fit on a worker thread, forwarding progress lines to `on_progress`.
pub fn run_fit(
    setup: &RunSetup,
    experiment: &Experiment,
    options: &FitOptions,
    on_progress: impl FnMut(&str),
) -> Result<FitResult, AppError> {
    let handle = spawn_fit(setup.driver(), experiment.clone(), setup.params.clone(), options.clone())?;
    handle.wait_with(on_progress)
}

/// Record `result` in the history file and return the model's updated entry.
pub fn update_history(path: &Path, result: &FitResult) -> Result<FitHistory, AppError> {
    let mut history = load_history(path)?;
    history.entry(result.model).record(result.chi_square);
    save_history(path, &history)?;
    debug!(history = ?history.as_map(), "updated fit history");
    Ok(*history.entry(result.model))
}

/// Point estimate plus its bootstrap.
#[derive(Debug, Clone)]
pub struct BootstrapRun {
    pub estimate: FitResult,
    pub bootstrap: BootstrapResult,
}

/// Fit the unresampled data with the bootstrap's local settings, then resample.
pub fn run_bootstrap_pipeline(
    setup: &RunSetup,
    experiment: &Experiment,
    config: &BootstrapConfig,
    on_progress: impl FnMut(&str),
) -> Result<BootstrapRun, AppError> {
    config.validate()?;
    let options = FitOptions {
        algorithm: AlgorithmConfig::Local(config.local.clone()),
        ..FitOptions::default()
    };
    let estimate = run_fit(setup, experiment, &options, on_progress)?;
    let bootstrap = run_bootstrap(&setup.driver(), experiment, &setup.params, &estimate, config)?;
    Ok(BootstrapRun { estimate, bootstrap })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitStatus, ModelKind};

    fn setup() -> RunSetup {
        RunSetup {
            sim: SimulationConfig {
                init_cell: 1000.0,
                max_div: 3,
                time_inc: 1.0,
                harvested_times: vec![0.0, 24.0, 48.0, 72.0],
            },
            dists: DistributionConfig::default(),
            params: ParameterSet::defaults(ModelKind::Cyton15),
        }
    }

    #[test]
    fn simulation_export_carries_both_tables() {
        let setup = setup();
        let sim = run_simulation(&setup).unwrap();
        let export = SimulationExport::new(&setup, &sim);
        assert_eq!(export.parameters.len(), 10);
        assert_eq!(export.harvested.times, vec![0.0, 24.0, 48.0, 72.0]);
        assert_eq!(export.dense.times.len(), 73);
    }

    #[test]
    fn fit_on_own_simulation_reports_progress_and_converges() {
        let mut setup = setup();
        let sim = run_simulation(&setup).unwrap();
        let exp = crate::data::synthesize_experiment(
            "self",
            &sim.harvested,
            &crate::data::SyntheticSpec {
                noise_cv: 0.0,
                ..Default::default()
            },
        )
        .unwrap();
        setup.params.vary_only(&["b", "pF"]).unwrap();

        let mut lines = Vec::new();
        let result = run_fit(&setup, &exp, &FitOptions::default(), |l| lines.push(l.to_string())).unwrap();
        assert!(result.chi_square < 1e-6);
        assert!(!matches!(result.status, FitStatus::Aborted));
        assert!(lines.last().is_some_and(|l| l.ends_with("Done fitting!")));
    }

    #[test]
    fn history_tracks_previous_and_current() {
        let path = std::env::temp_dir().join(format!("cyton-pipeline-history-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let mut result = FitResult {
            model: ModelKind::Cyton15,
            names: Vec::new(),
            values: Vec::new(),
            chi_square: 5.0,
            n_residuals: 0,
            n_free: 0,
            nfev: 0,
            iterations: 0,
            status: FitStatus::NothingToVary,
            elapsed_secs: 0.0,
            generations: Vec::new(),
        };
        update_history(&path, &result).unwrap();
        result.chi_square = 2.0;
        let h = update_history(&path, &result).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(h, FitHistory { previous: 5.0, current: 2.0 });
    }
}
