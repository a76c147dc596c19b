//! Command-line parsing for the Cyton simulator and fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::{IntervalMethod, JacobianScheme, ModelKind};
use crate::math::Family;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "cyton", version, about = "Cyton lymphocyte proliferation simulator and fitter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Simulate a model without data and print per-generation tables.
    Simulate(SimulateArgs),
    /// Fit a model to an experiment JSON file.
    Fit(FitArgs),
    /// Fit, then bootstrap confidence intervals by resampling replicates.
    Bootstrap(BootstrapArgs),
}

/// Which optimizer backs the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmKind {
    Local,
    Global,
}

/// Model selection and experiment-wide settings shared by every subcommand.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Model variant.
    #[arg(short = 'm', long, value_enum, default_value_t = ModelKind::Cyton15)]
    pub model: ModelKind,

    /// Parameter set JSON (defaults for the model when omitted).
    #[arg(long, value_name = "JSON")]
    pub params: Option<PathBuf>,

    /// Maximum division number (default: 10 when simulating, the data's highest
    /// generation when fitting).
    #[arg(long)]
    pub max_div: Option<usize>,

    /// Initial cell count.
    #[arg(long, default_value_t = crate::domain::DEFAULT_INIT_CELL)]
    pub init_cell: f64,

    /// Simulation time increment (hours).
    #[arg(long, default_value_t = crate::domain::DEFAULT_TIME_INC)]
    pub time_inc: f64,

    /// Distribution family used for every sub-process.
    #[arg(long, value_enum, default_value_t = Family::Lognormal)]
    pub family: Family,

    /// Let only these parameters vary (comma separated); others are locked.
    #[arg(long, value_delimiter = ',')]
    pub vary: Vec<String>,

    /// Lock these parameters (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub lock: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Harvested times (comma separated).
    #[arg(long, value_delimiter = ',', default_values_t = crate::domain::DEFAULT_HARVESTED_TIMES)]
    pub harvest: Vec<f64>,

    /// Also print the dense (every time step) table.
    #[arg(long)]
    pub dense: bool,

    /// Export the harvested and dense tables to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Write a synthetic experiment drawn from the harvested rows.
    #[arg(long, value_name = "JSON")]
    pub synthetic: Option<PathBuf>,

    /// Replicates per harvested time in the synthetic experiment.
    #[arg(long, default_value_t = 3)]
    pub replicates: usize,

    /// Coefficient of variation of the synthetic noise.
    #[arg(long, default_value_t = 0.05)]
    pub noise: f64,

    /// Seed of the synthetic noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Optimizer knobs.
#[derive(Debug, Args, Clone)]
pub struct OptimizerArgs {
    /// Local (trust-region least squares) or global (differential evolution).
    #[arg(long, value_enum, default_value_t = AlgorithmKind::Local)]
    pub algorithm: AlgorithmKind,

    /// Maximum objective evaluations (local); optional cap for global.
    #[arg(long)]
    pub max_nfev: Option<usize>,

    #[arg(long, default_value_t = 1e-8)]
    pub ftol: f64,

    #[arg(long, default_value_t = 1e-8)]
    pub xtol: f64,

    #[arg(long, default_value_t = 1e-8)]
    pub gtol: f64,

    /// Finite-difference scheme of the local Jacobian.
    #[arg(long, value_enum, default_value_t = JacobianScheme::TwoPoint)]
    pub jacobian: JacobianScheme,

    /// Differential-evolution population multiplier.
    #[arg(long, default_value_t = 15)]
    pub popsize: usize,

    /// Differential-evolution relative tolerance.
    #[arg(long, default_value_t = 0.01)]
    pub tol: f64,

    /// Differential-evolution absolute tolerance.
    #[arg(long, default_value_t = 0.0)]
    pub atol: f64,

    /// Differential-evolution generation limit.
    #[arg(long, default_value_t = 1000)]
    pub max_generations: usize,

    /// Differential-evolution seed.
    #[arg(long, default_value_t = 57_893_928)]
    pub de_seed: u64,

    /// Skip the local polish after differential evolution.
    #[arg(long)]
    pub no_polish: bool,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub optimizer: OptimizerArgs,

    /// Experiment JSON file.
    #[arg(short = 'd', long, value_name = "JSON")]
    pub data: PathBuf,

    /// Fit total live cells per replicate instead of per generation (Cyton 1.5).
    #[arg(long)]
    pub total_cells: bool,

    /// Export the fit result and fitted parameter set to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Sum-of-squares history file (previous vs current per model).
    #[arg(long, value_name = "JSON")]
    pub history: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct BootstrapArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Experiment JSON file.
    #[arg(short = 'd', long, value_name = "JSON")]
    pub data: PathBuf,

    /// Number of resamples.
    #[arg(short = 'n', long, default_value_t = 100)]
    pub iterations: usize,

    /// Worker threads (0 = one per physical core).
    #[arg(long, default_value_t = 0)]
    pub workers: usize,

    /// Base seed; worker `w` uses `seed + w`.
    #[arg(long, default_value_t = 57_893_928)]
    pub seed: u64,

    /// Confidence level in (0, 1).
    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,

    /// Interval construction.
    #[arg(long, value_enum, default_value_t = IntervalMethod::Percentile)]
    pub method: IntervalMethod,

    /// Maximum evaluations per resample fit.
    #[arg(long, default_value_t = 2000)]
    pub max_nfev: usize,

    /// Export the bootstrap result to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}
