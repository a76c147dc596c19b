//! The contract between the optimizers and the objective they minimize.

use crate::domain::{FitStatus, GenerationDiagnostic};
use crate::error::AppError;

/// A bounded least-squares problem over the free parameters.
pub trait Problem {
    fn dim(&self) -> usize;

    fn lower(&self) -> &[f64];

    fn upper(&self) -> &[f64];

    /// Residual vector at `x`, or `None` when the point is rejected
    /// (simulation failure, non-finite residuals) or the run was aborted.
    fn residuals(&mut self, x: &[f64]) -> Option<Vec<f64>>;

    fn evaluations(&self) -> usize;

    fn aborted(&self) -> bool;

    /// Sum of squares at `x`; `+∞` for rejected points.
    fn cost(&mut self, x: &[f64]) -> Option<f64> {
        match self.residuals(x) {
            Some(r) => Some(r.iter().map(|v| v * v).sum()),
            None if self.aborted() => None,
            None => Some(f64::INFINITY),
        }
    }
}

/// Why an optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Ftol,
    Xtol,
    Gtol,
    /// No step reduced the cost even under maximal damping.
    Stalled,
    /// Population energies collapsed (differential evolution).
    EnergySpread,
    MaxEvaluations,
    MaxGenerations,
    Aborted,
}

impl Termination {
    pub fn status(self) -> FitStatus {
        let converged = |c: &str| FitStatus::Converged {
            criterion: c.to_string(),
        };
        match self {
            Termination::Ftol => converged("ftol"),
            Termination::Xtol => converged("xtol"),
            Termination::Gtol => converged("gtol"),
            Termination::Stalled => converged("no further improvement"),
            Termination::EnergySpread => converged("population spread"),
            Termination::MaxEvaluations | Termination::MaxGenerations => FitStatus::MaxEvaluations,
            Termination::Aborted => FitStatus::Aborted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizerOutcome {
    pub x: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub termination: Termination,
    pub generations: Vec<GenerationDiagnostic>,
}

pub trait Optimizer {
    fn name(&self) -> &'static str;

    fn minimize(&self, problem: &mut dyn Problem, x0: &[f64]) -> Result<OptimizerOutcome, AppError>;
}

/// Clip `x` into `[lower, upper]` component-wise.
pub fn project(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((v, lo), hi) in x.iter_mut().zip(lower).zip(upper) {
        *v = v.clamp(*lo, *hi);
    }
}
