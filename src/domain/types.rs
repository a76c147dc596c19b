//! Shared domain types.
//!
//! These types are kept serializable so they can be:
//!
//! - passed by value into the simulator and the fit driver
//! - exported to JSON after a fit or a bootstrap run
//! - reloaded later as the starting point of another fit

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::Family;

/// Default time increment (hours) of the simulation grid.
pub const DEFAULT_TIME_INC: f64 = 1.0;
/// Default maximum division number.
pub const DEFAULT_MAX_DIV: usize = 10;
/// Default number of founder cells.
pub const DEFAULT_INIT_CELL: f64 = 10_000.0;
/// Harvested times used when no experiment is loaded (data-free mode).
pub const DEFAULT_HARVESTED_TIMES: [f64; 6] = [0.0, 16.0, 54.0, 80.0, 106.0, 120.0];

/// Which Cyton variant to simulate or fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Cyton1,
    Cyton15,
}

impl ModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Cyton1 => "Cyton 1",
            ModelKind::Cyton15 => "Cyton 1.5",
        }
    }

    /// Declared parameter names, in vector order.
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::Cyton1 => &crate::domain::CYTON1_NAMES,
            ModelKind::Cyton15 => &crate::domain::CYTON15_NAMES,
        }
    }

    pub fn param_count(self) -> usize {
        self.parameter_names().len()
    }
}

/// Experiment-wide simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub init_cell: f64,
    pub max_div: usize,
    pub time_inc: f64,
    /// Harvested times used in data-free mode; fits use the experiment's own.
    pub harvested_times: Vec<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            init_cell: DEFAULT_INIT_CELL,
            max_div: DEFAULT_MAX_DIV,
            time_inc: DEFAULT_TIME_INC,
            harvested_times: DEFAULT_HARVESTED_TIMES.to_vec(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.init_cell.is_finite() && self.init_cell > 0.0) {
            return Err(AppError::invalid(format!(
                "Initial cell count must be > 0, got {}",
                self.init_cell
            )));
        }
        if !(self.time_inc.is_finite() && self.time_inc > 0.0) {
            return Err(AppError::invalid(format!(
                "Time increment must be > 0, got {}",
                self.time_inc
            )));
        }
        if self.harvested_times.is_empty() {
            return Err(AppError::invalid("At least one harvested time is required."));
        }
        Ok(())
    }

    /// Last harvested time: the horizon of the dense grid.
    pub fn horizon(&self) -> f64 {
        self.harvested_times.iter().copied().fold(0.0, f64::max)
    }
}

/// Distribution family per Cyton 1 sub-process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cyton1Families {
    pub first_div: Family,
    pub first_death: Family,
    pub sub_div: Family,
    pub sub_death: Family,
}

/// Distribution family per Cyton 1.5 sub-process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cyton15Families {
    pub unstim_death: Family,
    pub stim_div: Family,
    pub stim_death: Family,
    pub stim_destiny: Family,
}

/// Family selections for both variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    pub cyton1: Cyton1Families,
    pub cyton15: Cyton15Families,
}

impl DistributionConfig {
    /// Use one family for every sub-process of both variants.
    pub fn uniform(family: Family) -> Self {
        Self {
            cyton1: Cyton1Families {
                first_div: family,
                first_death: family,
                sub_div: family,
                sub_death: family,
            },
            cyton15: Cyton15Families {
                unstim_death: family,
                stim_div: family,
                stim_death: family,
                stim_destiny: family,
            },
        }
    }
}

/// What the residuals compare against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FitTarget {
    /// One residual per (timepoint, replicate, generation).
    #[default]
    PerGeneration,
    /// One residual per (timepoint, replicate), summed over generations.
    TotalCells,
}

/// Finite-difference scheme for the local algorithm's Jacobian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum JacobianScheme {
    /// Forward differences (one extra evaluation per free parameter).
    #[default]
    TwoPoint,
    /// Central differences (two extra evaluations per free parameter).
    ThreePoint,
}

/// Knobs of the trust-region (Levenberg–Marquardt) least-squares backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    pub max_nfev: usize,
    /// Relative reduction of the sum of squares.
    pub ftol: f64,
    /// Relative size of the parameter step.
    pub xtol: f64,
    /// Cosine between the residual vector and the Jacobian columns.
    pub gtol: f64,
    pub jacobian: JacobianScheme,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            max_nfev: 2000,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            jacobian: JacobianScheme::TwoPoint,
        }
    }
}

impl LocalConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_nfev == 0 {
            return Err(AppError::invalid("max_nfev must be >= 1."));
        }
        for (name, v) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(AppError::invalid(format!("{name} must be finite and >= 0, got {v}")));
            }
        }
        Ok(())
    }
}

/// Knobs of the differential-evolution backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub max_generations: usize,
    /// Optional cap on objective evaluations (in addition to generations).
    pub max_nfev: Option<usize>,
    /// Population size multiplier: members = popsize × free parameters.
    pub popsize: usize,
    /// Relative tolerance on the spread of population energies.
    pub tol: f64,
    /// Absolute tolerance on the spread of population energies.
    pub atol: f64,
    pub mutation: (f64, f64),
    pub recombination: f64,
    pub seed: u64,
    /// Finish with a local least-squares run from the best member.
    pub polish: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_generations: 1000,
            max_nfev: None,
            popsize: 15,
            tol: 0.01,
            atol: 0.0,
            mutation: (0.5, 1.0),
            recombination: 0.7,
            seed: 57_893_928,
            polish: true,
        }
    }
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_generations == 0 {
            return Err(AppError::invalid("max_generations must be >= 1."));
        }
        if self.popsize == 0 {
            return Err(AppError::invalid("popsize must be >= 1."));
        }
        if !(self.tol.is_finite() && self.tol >= 0.0 && self.atol.is_finite() && self.atol >= 0.0) {
            return Err(AppError::invalid("DE tolerances must be finite and >= 0."));
        }
        let (lo, hi) = self.mutation;
        if !(lo.is_finite() && hi.is_finite() && 0.0 <= lo && lo <= hi && hi <= 2.0) {
            return Err(AppError::invalid(format!(
                "DE mutation range must satisfy 0 <= lo <= hi <= 2, got ({lo}, {hi})"
            )));
        }
        if !(0.0..=1.0).contains(&self.recombination) {
            return Err(AppError::invalid("DE recombination must be in [0, 1]."));
        }
        Ok(())
    }
}

/// Algorithm selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    Local(LocalConfig),
    Global(GlobalConfig),
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        AlgorithmConfig::Local(LocalConfig::default())
    }
}

impl AlgorithmConfig {
    pub fn display_name(&self) -> &'static str {
        match self {
            AlgorithmConfig::Local(_) => "trust-region least squares",
            AlgorithmConfig::Global(_) => "differential evolution",
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            AlgorithmConfig::Local(c) => c.validate(),
            AlgorithmConfig::Global(c) => c.validate(),
        }
    }
}

/// Everything a single fit needs besides data and parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    pub algorithm: AlgorithmConfig,
    pub target: FitTarget,
}

/// How bootstrap confidence intervals are formed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IntervalMethod {
    /// Empirical quantiles of the resampled estimates.
    #[default]
    Percentile,
    /// Point estimate ± z · bootstrap standard deviation.
    Normal,
}

impl IntervalMethod {
    pub fn display_name(self) -> &'static str {
        match self {
            IntervalMethod::Percentile => "percentile",
            IntervalMethod::Normal => "normal approximation",
        }
    }
}

/// Knobs of the resampling engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub iterations: usize,
    /// Worker threads; `0` means one per physical core.
    pub workers: usize,
    pub seed: u64,
    pub confidence: f64,
    pub method: IntervalMethod,
    /// Local algorithm used to refit every resample.
    pub local: LocalConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            workers: 0,
            seed: 57_893_928,
            confidence: 0.95,
            method: IntervalMethod::Percentile,
            local: LocalConfig::default(),
        }
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.iterations < 2 {
            return Err(AppError::invalid("Bootstrap needs at least 2 iterations."));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(AppError::invalid(format!(
                "Confidence level must be in (0, 1), got {}",
                self.confidence
            )));
        }
        self.local.validate()
    }

    /// Effective worker count.
    pub fn resolved_workers(&self) -> usize {
        let w = if self.workers == 0 {
            num_cpus::get_physical()
        } else {
            self.workers
        };
        w.clamp(1, self.iterations.max(1))
    }
}

/// How a fit ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitStatus {
    /// A tolerance criterion was met.
    Converged { criterion: String },
    /// The evaluation/generation budget ran out (informational, not an error).
    MaxEvaluations,
    /// The caller raised the abort flag; the best completed iterate is returned.
    Aborted,
    /// The optimizer failed; the last known-good iterate is returned.
    Recovered { reason: String },
    /// Every parameter was locked; the result is a plain evaluation.
    NothingToVary,
}

impl FitStatus {
    pub fn describe(&self) -> String {
        match self {
            FitStatus::Converged { criterion } => format!("converged ({criterion})"),
            FitStatus::MaxEvaluations => "evaluation budget exhausted".to_string(),
            FitStatus::Aborted => "aborted by caller".to_string(),
            FitStatus::Recovered { reason } => format!("recovered last valid iterate ({reason})"),
            FitStatus::NothingToVary => "all parameters locked".to_string(),
        }
    }
}

/// Per-generation record of the differential-evolution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationDiagnostic {
    pub generation: usize,
    pub best_cost: f64,
    /// Standard deviation of the finite population energies.
    pub energy_spread: f64,
    pub nfev: usize,
}

/// Output of one fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelKind,
    /// Parameter names, ordered as declared for the model.
    pub names: Vec<String>,
    /// Best-fit values in the same order.
    pub values: Vec<f64>,
    /// Sum of squared residuals at `values`.
    pub chi_square: f64,
    pub n_residuals: usize,
    pub n_free: usize,
    pub nfev: usize,
    pub iterations: usize,
    pub status: FitStatus,
    pub elapsed_secs: f64,
    /// Only filled by the global algorithm.
    pub generations: Vec<GenerationDiagnostic>,
}

impl FitResult {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    /// Root-mean-square residual.
    pub fn rms(&self) -> f64 {
        if self.n_residuals == 0 {
            return f64::NAN;
        }
        (self.chi_square / self.n_residuals as f64).sqrt()
    }
}

/// Previous/current sum of squares for one model, kept by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FitHistory {
    pub previous: f64,
    pub current: f64,
}

impl FitHistory {
    pub fn record(&mut self, chi_square: f64) {
        self.previous = self.current;
        self.current = chi_square;
    }

    pub fn improved(&self) -> bool {
        self.previous == 0.0 || self.current <= self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_names_match_declared_counts() {
        assert_eq!(ModelKind::Cyton1.param_count(), 13);
        assert_eq!(ModelKind::Cyton15.param_count(), 10);
    }

    #[test]
    fn non_positive_time_increment_is_rejected() {
        let cfg = SimulationConfig {
            time_inc: 0.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(AppError::InvalidConfig(_))));
    }

    #[test]
    fn history_shifts_current_into_previous() {
        let mut h = FitHistory::default();
        h.record(10.0);
        h.record(4.0);
        assert_eq!(h.previous, 10.0);
        assert_eq!(h.current, 4.0);
        assert!(h.improved());
    }

    #[test]
    fn algorithm_config_round_trips_through_json() {
        let cfg = AlgorithmConfig::Global(GlobalConfig::default());
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"method\":\"global\""));
        let back: AlgorithmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn bootstrap_workers_never_exceed_iterations() {
        let cfg = BootstrapConfig {
            iterations: 3,
            workers: 16,
            ..BootstrapConfig::default()
        };
        assert_eq!(cfg.resolved_workers(), 3);
        assert!(BootstrapConfig { confidence: 1.0, ..cfg }.validate().is_err());
    }

    #[test]
    fn default_workers_follow_physical_cores() {
        let cfg = BootstrapConfig {
            iterations: 10_000,
            ..BootstrapConfig::default()
        };
        assert_eq!(cfg.resolved_workers(), num_cpus::get_physical().max(1));
    }

    #[test]
    fn de_mutation_range_is_validated() {
        let cfg = GlobalConfig {
            mutation: (1.0, 0.5),
            ..GlobalConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
