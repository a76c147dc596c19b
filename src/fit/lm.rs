//! Trust-region least squares (Levenberg–Marquardt with box projection).
//!
//! Per iteration:
//!
//! - numerical Jacobian of the residuals (forward or central differences,
//!   stepping inward at a bound)
//! - damped Gauss–Newton step from the augmented SVD solve (`damped_step`)
//! - projection of the trial point onto the bounds
//! - accept if the sum of squares drops (damping relaxed), otherwise raise
//!   the damping and retry
//!
//! Column scaling follows MINPACK: `D_j` is the running maximum of the
//! Jacobian column norms.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::{JacobianScheme, LocalConfig};
use crate::error::AppError;
use crate::fit::optimizer::{Optimizer, OptimizerOutcome, Problem, Termination, project};
use crate::math::{damped_step, max_gradient_cosine};

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;

#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LocalConfig,
}

impl LevenbergMarquardt {
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }

    /// `None` when the run was aborted mid-Jacobian.
    fn jacobian(
        &self,
        problem: &mut dyn Problem,
        x: &[f64],
        r0: &[f64],
    ) -> Option<DMatrix<f64>> {
        let n = x.len();
        let m = r0.len();
        let lower = problem.lower().to_vec();
        let upper = problem.upper().to_vec();
        let mut jac = DMatrix::<f64>::zeros(m, n);

        for j in 0..n {
            let scale = x[j].abs().max(1.0);
            let column = match self.config.jacobian {
                JacobianScheme::TwoPoint => {
                    let h = f64::EPSILON.sqrt() * scale;
                    let h = if x[j] + h <= upper[j] { h } else { -h };
                    one_sided(problem, x, r0, j, h)?
                }
                JacobianScheme::ThreePoint => {
                    let h = f64::EPSILON.cbrt() * scale;
                    if x[j] - h >= lower[j] && x[j] + h <= upper[j] {
                        central(problem, x, j, h)?
                    } else {
                        let h = if x[j] + h <= upper[j] { h } else { -h };
                        one_sided(problem, x, r0, j, h)?
                    }
                }
            };
            if let Some(col) = column {
                jac.set_column(j, &col);
            }
        }
        Some(jac)
    }
}

/// Outer `None`: aborted. Inner `None`: the probe was rejected.
fn one_sided(problem: &mut dyn Problem, x: &[f64], r0: &[f64], j: usize, h: f64) -> Option<Option<DVector<f64>>> {
    let mut probe = x.to_vec();
    probe[j] += h;
    let step = probe[j] - x[j];
    match problem.residuals(&probe) {
        Some(r) => Some(Some(DVector::from_iterator(
            r.len(),
            r.iter().zip(r0).map(|(a, b)| (a - b) / step),
        ))),
        None if problem.aborted() => None,
        None => Some(None),
    }
}

fn central(problem: &mut dyn Problem, x: &[f64], j: usize, h: f64) -> Option<Option<DVector<f64>>> {
    let mut plus = x.to_vec();
    plus[j] += h;
    let mut minus = x.to_vec();
    minus[j] -= h;
    let span = plus[j] - minus[j];

    let rp = match problem.residuals(&plus) {
        Some(r) => r,
        None if problem.aborted() => return None,
        None => return Some(None),
    };
    let rm = match problem.residuals(&minus) {
        Some(r) => r,
        None if problem.aborted() => return None,
        None => return Some(None),
    };
    Some(Some(DVector::from_iterator(
        rp.len(),
        rp.iter().zip(&rm).map(|(a, b)| (a - b) / span),
    )))
}

fn sse(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|a| a * a).sum::<f64>().sqrt()
}

impl Optimizer for LevenbergMarquardt {
    fn name(&self) -> &'static str {
        "levenberg-marquardt"
    }

    fn minimize(&self, problem: &mut dyn Problem, x0: &[f64]) -> Result<OptimizerOutcome, AppError> {
        let cfg = &self.config;
        let n = problem.dim();
        let lower = problem.lower().to_vec();
        let upper = problem.upper().to_vec();

        let mut x = x0.to_vec();
        project(&mut x, &lower, &upper);

        let done = |x: Vec<f64>, cost: f64, iterations: usize, termination: Termination| {
            debug!(?termination, iterations, cost, "local optimizer finished");
            Ok(OptimizerOutcome {
                x,
                cost,
                iterations,
                termination,
                generations: Vec::new(),
            })
        };

        let mut r = match problem.residuals(&x) {
            Some(r) => r,
            None if problem.aborted() => return done(x, f64::INFINITY, 0, Termination::Aborted),
            None => return Err(AppError::numeric("Initial parameters give no valid residuals.")),
        };
        let mut cost = sse(&r);
        let mut lambda = LAMBDA_INIT;
        let mut diag = DVector::<f64>::zeros(n);
        let mut iterations = 0;

        loop {
            if cost == 0.0 {
                return done(x, cost, iterations, Termination::Ftol);
            }
            if problem.evaluations() >= cfg.max_nfev {
                return done(x, cost, iterations, Termination::MaxEvaluations);
            }

            let Some(jac) = self.jacobian(problem, &x, &r) else {
                return done(x, cost, iterations, Termination::Aborted);
            };
            let rv = DVector::from_column_slice(&r);
            if max_gradient_cosine(&jac, &rv) <= cfg.gtol {
                return done(x, cost, iterations, Termination::Gtol);
            }
            for j in 0..n {
                diag[j] = diag[j].max(jac.column(j).norm());
                if diag[j] == 0.0 {
                    diag[j] = 1.0;
                }
            }
            iterations += 1;

            loop {
                let Some(step) = damped_step(&jac, &rv, lambda, &diag) else {
                    lambda *= 4.0;
                    if lambda > LAMBDA_MAX {
                        return Err(AppError::numeric("Damped step solve failed."));
                    }
                    continue;
                };

                let mut trial: Vec<f64> = x.iter().zip(step.iter()).map(|(a, d)| a + d).collect();
                project(&mut trial, &lower, &upper);
                let moved: Vec<f64> = trial.iter().zip(&x).map(|(a, b)| a - b).collect();
                if norm(&moved) <= cfg.xtol * (cfg.xtol + norm(&x)) {
                    return done(x, cost, iterations, Termination::Xtol);
                }

                match problem.residuals(&trial) {
                    Some(r_new) => {
                        let c_new = sse(&r_new);
                        if c_new < cost {
                            let reduction = (cost - c_new) / cost;
                            x = trial;
                            r = r_new;
                            cost = c_new;
                            lambda = (lambda / 3.0).max(LAMBDA_MIN);
                            if reduction <= cfg.ftol {
                                return done(x, cost, iterations, Termination::Ftol);
                            }
                            break;
                        }
                    }
                    None if problem.aborted() => return done(x, cost, iterations, Termination::Aborted),
                    None => {}
                }

                lambda *= 4.0;
                if lambda > LAMBDA_MAX {
                    return done(x, cost, iterations, Termination::Stalled);
                }
                if problem.evaluations() >= cfg.max_nfev {
                    return done(x, cost, iterations, Termination::MaxEvaluations);
                }
            }
        }
    }
}
