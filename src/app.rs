//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and initializes logging
//! - maps arguments onto the typed configuration structs
//! - runs simulations, fits and bootstraps through `pipeline`
//! - prints reports and writes optional exports

use std::time::Instant;

use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{AlgorithmKind, BootstrapArgs, Command, FitArgs, ModelArgs, OptimizerArgs, SimulateArgs};
use crate::data::{SyntheticSpec, synthesize_experiment};
use crate::domain::{
    AlgorithmConfig, BootstrapConfig, DEFAULT_MAX_DIV, DistributionConfig, Experiment, FitOptions, FitTarget,
    GlobalConfig, LocalConfig, ParameterSet, SimulationConfig,
};
use crate::error::AppError;
use crate::io::{FitExport, fitted_params, read_experiment, read_params, write_experiment, write_json};
use crate::report::{format_bootstrap, format_elapsed, format_experiment_summary, format_fit_summary, format_profile};

pub mod pipeline;

use pipeline::{RunSetup, SimulationExport};

/// Entry point for the `cyton` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Simulate(args) => handle_simulate(args),
        Command::Fit(args) => handle_fit(args),
        Command::Bootstrap(args) => handle_bootstrap(args),
    }
}

/// `RUST_LOG` controls verbosity; warnings and errors by default.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second initialization (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let setup = run_setup_from_args(&args.model, None, args.harvest.clone())?;
    let simulation = pipeline::run_simulation(&setup)?;
    let name = setup.params.model.display_name();

    println!("{}", format_profile(&simulation.harvested, &format!("{name}: harvested times")));
    if args.dense {
        println!();
        println!("{}", format_profile(&simulation.dense, &format!("{name}: every time step")));
    }

    if let Some(path) = &args.export {
        write_json(path, &SimulationExport::new(&setup, &simulation))?;
        debug!(path = %path.display(), "wrote simulation export");
    }
    if let Some(path) = &args.synthetic {
        let spec = SyntheticSpec {
            replicates: args.replicates,
            noise_cv: args.noise,
            seed: args.seed,
        };
        let experiment = synthesize_experiment(&format!("synthetic {name}"), &simulation.harvested, &spec)?;
        write_experiment(path, &experiment)?;
        println!("Wrote synthetic experiment to {}", path.display());
    }
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let experiment = read_experiment(&args.data)?;
    let setup = run_setup_from_args(&args.model, Some(&experiment), experiment.harvested_times.clone())?;
    let options = fit_options_from_args(&args);
    println!("{}", format_experiment_summary(&experiment));

    let result = pipeline::run_fit(&setup, &experiment, &options, |line| println!("{line}"))?;

    let history = match &args.history {
        Some(path) => Some(pipeline::update_history(path, &result)?),
        None => None,
    };
    println!("{}", format_fit_summary(&result, &setup.params, history.as_ref()));

    if let Some(path) = &args.export {
        let fitted = fitted_params(&setup.params, &result)?;
        write_json(
            path,
            &FitExport {
                result: &result,
                fitted: &fitted,
            },
        )?;
        debug!(path = %path.display(), "wrote fit export");
    }
    Ok(())
}

fn handle_bootstrap(args: BootstrapArgs) -> Result<(), AppError> {
    let started = Instant::now();
    let experiment = read_experiment(&args.data)?;
    let setup = run_setup_from_args(&args.model, Some(&experiment), experiment.harvested_times.clone())?;
    let config = bootstrap_config_from_args(&args);
    println!("{}", format_experiment_summary(&experiment));

    let run = pipeline::run_bootstrap_pipeline(&setup, &experiment, &config, |line| println!("{line}"))?;
    println!("{}", format_fit_summary(&run.estimate, &setup.params, None));
    println!();
    println!("{}", format_bootstrap(&run.bootstrap));
    println!("Total time: {}", format_elapsed(started.elapsed().as_secs_f64()));

    if let Some(path) = &args.export {
        write_json(path, &run.bootstrap)?;
        debug!(path = %path.display(), "wrote bootstrap export");
    }
    Ok(())
}

/// Build the simulation settings and starting parameters shared by every subcommand.
///
/// With data present, `max_div` defaults to the highest generation in the data.
pub fn run_setup_from_args(
    args: &ModelArgs,
    experiment: Option<&Experiment>,
    harvested_times: Vec<f64>,
) -> Result<RunSetup, AppError> {
    let mut params = match &args.params {
        Some(path) => read_params(path)?,
        None => ParameterSet::defaults(args.model),
    };
    if params.model != args.model {
        warn!(
            requested = args.model.display_name(),
            file = params.model.display_name(),
            "parameter file overrides --model"
        );
    }
    if !args.vary.is_empty() {
        let names: Vec<&str> = args.vary.iter().map(String::as_str).collect();
        params.vary_only(&names)?;
    }
    for name in &args.lock {
        params.set_vary(name, false)?;
    }

    let max_div = args
        .max_div
        .or_else(|| experiment.map(Experiment::max_div_in_data))
        .unwrap_or(DEFAULT_MAX_DIV);
    let sim = SimulationConfig {
        init_cell: args.init_cell,
        max_div,
        time_inc: args.time_inc,
        harvested_times,
    };
    sim.validate()?;

    Ok(RunSetup {
        sim,
        dists: DistributionConfig::uniform(args.family),
        params,
    })
}

pub fn local_config_from_args(args: &OptimizerArgs) -> LocalConfig {
    let defaults = LocalConfig::default();
    LocalConfig {
        max_nfev: args.max_nfev.unwrap_or(defaults.max_nfev),
        ftol: args.ftol,
        xtol: args.xtol,
        gtol: args.gtol,
        jacobian: args.jacobian,
    }
}

pub fn global_config_from_args(args: &OptimizerArgs) -> GlobalConfig {
    GlobalConfig {
        max_generations: args.max_generations,
        max_nfev: args.max_nfev,
        popsize: args.popsize,
        tol: args.tol,
        atol: args.atol,
        seed: args.de_seed,
        polish: !args.no_polish,
        ..GlobalConfig::default()
    }
}

pub fn fit_options_from_args(args: &FitArgs) -> FitOptions {
    let algorithm = match args.optimizer.algorithm {
        AlgorithmKind::Local => AlgorithmConfig::Local(local_config_from_args(&args.optimizer)),
        AlgorithmKind::Global => AlgorithmConfig::Global(global_config_from_args(&args.optimizer)),
    };
    FitOptions {
        algorithm,
        target: if args.total_cells {
            FitTarget::TotalCells
        } else {
            FitTarget::PerGeneration
        },
    }
}

pub fn bootstrap_config_from_args(args: &BootstrapArgs) -> BootstrapConfig {
    BootstrapConfig {
        iterations: args.iterations,
        workers: args.workers,
        seed: args.seed,
        confidence: args.confidence,
        method: args.method,
        local: LocalConfig {
            max_nfev: args.max_nfev,
            ..LocalConfig::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::{IntervalMethod, ModelKind};

    fn fit_args(argv: &[&str]) -> FitArgs {
        let mut full = vec!["cyton", "fit", "-d", "exp.json"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Fit(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_map_onto_global_config() {
        let args = fit_args(&["--algorithm", "global", "--popsize", "8", "--no-polish", "--max-nfev", "500"]);
        let options = fit_options_from_args(&args);
        let AlgorithmConfig::Global(cfg) = options.algorithm else {
            panic!("expected global");
        };
        assert_eq!(cfg.popsize, 8);
        assert!(!cfg.polish);
        assert_eq!(cfg.max_nfev, Some(500));
        assert_eq!(cfg.recombination, 0.7);
    }

    #[test]
    fn local_defaults_and_total_target() {
        let args = fit_args(&["--total-cells"]);
        let options = fit_options_from_args(&args);
        assert_eq!(options.algorithm, AlgorithmConfig::Local(LocalConfig::default()));
        assert_eq!(options.target, FitTarget::TotalCells);
    }

    #[test]
    fn max_div_follows_the_data_unless_given() {
        let exp = Experiment::new("e", vec![0.0, 24.0], vec![vec![vec![10.0, 0.0, 0.0]], vec![vec![5.0, 4.0, 1.0]]])
            .unwrap();
        let args = fit_args(&["--lock", "b"]);
        let setup = run_setup_from_args(&args.model, Some(&exp), exp.harvested_times.clone()).unwrap();
        assert_eq!(setup.sim.max_div, 2);
        assert!(!setup.params.get("b").unwrap().vary);

        let args = fit_args(&["--max-div", "6", "--vary", "pF"]);
        let setup = run_setup_from_args(&args.model, Some(&exp), exp.harvested_times.clone()).unwrap();
        assert_eq!(setup.sim.max_div, 6);
        assert_eq!(setup.params.free_indices(), vec![9]);
    }

    #[test]
    fn unknown_parameter_name_is_rejected() {
        let args = fit_args(&["--lock", "nope"]);
        let err = run_setup_from_args(&args.model, None, vec![0.0, 10.0]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn bootstrap_flags_map_onto_config() {
        let cli = Cli::parse_from([
            "cyton", "bootstrap", "-d", "e.json", "-n", "20", "--method", "normal", "--model", "cyton15",
        ]);
        let Command::Bootstrap(args) = cli.command else {
            panic!("expected bootstrap");
        };
        let cfg = bootstrap_config_from_args(&args);
        assert_eq!(cfg.iterations, 20);
        assert_eq!(cfg.method, IntervalMethod::Normal);
        assert_eq!(args.model.model, ModelKind::Cyton15);
        cfg.validate().unwrap();
    }
}
