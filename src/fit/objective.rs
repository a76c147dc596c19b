//! The objective seen by the optimizers.
//!
//! It maps a free-parameter vector onto the full, ordered parameter vector
//! (locked entries copied verbatim), runs the residual model and keeps the
//! book-keeping the driver needs afterwards:
//!
//! - evaluation counter and periodic progress lines
//! - the last parameter vector that produced valid residuals
//! - the abort flag, checked before every evaluation

use tracing::trace;

use crate::domain::ParameterSet;
use crate::fit::optimizer::Problem;
use crate::fit::progress::{AbortHandle, PROGRESS_EVERY, Progress, format_progress_line};
use crate::fit::residual::{ResidualModel, sum_of_squares};

pub struct Objective<'a> {
    residual: &'a ResidualModel<'a>,
    template: Vec<f64>,
    free: Vec<usize>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    abort: AbortHandle,
    progress: Progress,
    nfev: usize,
    last_good: Option<(Vec<f64>, f64)>,
}

impl<'a> Objective<'a> {
    pub fn new(residual: &'a ResidualModel<'a>, params: &ParameterSet, abort: AbortHandle, progress: Progress) -> Self {
        let free = params.free_indices();
        let lower = free.iter().map(|&i| params.params[i].lower).collect();
        let upper = free.iter().map(|&i| params.params[i].upper).collect();
        Self {
            residual,
            template: params.values(),
            free,
            lower,
            upper,
            abort,
            progress,
            nfev: 0,
            last_good: None,
        }
    }

    /// Starting point of the free parameters.
    pub fn initial_free(&self) -> Vec<f64> {
        self.free.iter().map(|&i| self.template[i]).collect()
    }

    /// Full parameter vector for a free vector.
    pub fn expand(&self, x: &[f64]) -> Vec<f64> {
        let mut full = self.template.clone();
        for (&i, &v) in self.free.iter().zip(x) {
            full[i] = v;
        }
        full
    }

    /// Last full vector with valid residuals, and its sum of squares.
    pub fn last_good(&self) -> Option<&(Vec<f64>, f64)> {
        self.last_good.as_ref()
    }

    pub fn n_residuals(&self) -> usize {
        self.residual.len()
    }
}

impl Problem for Objective<'_> {
    fn dim(&self) -> usize {
        self.free.len()
    }

    fn lower(&self) -> &[f64] {
        &self.lower
    }

    fn upper(&self) -> &[f64] {
        &self.upper
    }

    fn residuals(&mut self, x: &[f64]) -> Option<Vec<f64>> {
        if self.abort.is_aborted() {
            return None;
        }
        self.nfev += 1;
        let full = self.expand(x);
        match self.residual.residuals(&full) {
            Ok(r) => {
                let rss = sum_of_squares(&r);
                if self.nfev % PROGRESS_EVERY == 0 {
                    self.progress.emit(format_progress_line(self.nfev, &full, rss));
                }
                self.last_good = Some((full, rss));
                Some(r)
            }
            Err(err) => {
                trace!(nfev = self.nfev, "rejected iterate: {err}");
                None
            }
        }
    }

    fn evaluations(&self) -> usize {
        self.nfev
    }

    fn aborted(&self) -> bool {
        self.abort.is_aborted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DistributionConfig, Experiment, FitTarget, ModelKind, SimulationConfig};
    use crate::models::build_model;

    #[test]
    fn locked_entries_come_from_the_template() {
        let exp = Experiment::new("e", vec![0.0, 10.0], vec![vec![vec![100.0, 0.0]], vec![vec![90.0, 5.0]]]).unwrap();
        let sim = SimulationConfig {
            init_cell: 100.0,
            max_div: 2,
            ..SimulationConfig::default()
        };
        let model = build_model(ModelKind::Cyton15, &sim, &DistributionConfig::default());
        let residual = ResidualModel::new(model.as_ref(), &exp, None, FitTarget::PerGeneration, 1.0).unwrap();

        let mut params = ParameterSet::defaults(ModelKind::Cyton15);
        params.vary_only(&["stimMuDiv", "pF"]).unwrap();
        let mut obj = Objective::new(&residual, &params, AbortHandle::new(), Progress::silent());

        assert_eq!(obj.initial_free(), vec![25.0, 0.7]);
        let full = obj.expand(&[30.0, 0.5]);
        assert_eq!(full[2], 30.0);
        assert_eq!(full[9], 0.5);
        assert_eq!(full[0].to_bits(), params.params[0].value.to_bits());

        assert!(obj.residuals(&[30.0, 0.5]).is_some());
        assert_eq!(obj.evaluations(), 1);
        assert_eq!(obj.last_good().unwrap().0, full);
    }

    #[test]
    fn aborted_objective_stops_evaluating() {
        let exp = Experiment::new("e", vec![0.0], vec![vec![vec![100.0]]]).unwrap();
        let model = build_model(ModelKind::Cyton15, &SimulationConfig::default(), &DistributionConfig::default());
        let residual = ResidualModel::new(model.as_ref(), &exp, None, FitTarget::PerGeneration, 1.0).unwrap();
        let params = ParameterSet::defaults(ModelKind::Cyton15);
        let abort = AbortHandle::new();
        let mut obj = Objective::new(&residual, &params, abort.clone(), Progress::silent());

        abort.abort();
        let x = obj.initial_free();
        assert!(obj.residuals(&x).is_none());
        assert!(obj.aborted());
        assert_eq!(obj.evaluations(), 0);
        assert_eq!(obj.cost(&x), None);
    }
}
