//! One optimization run, end to end.
//!
//! The driver:
//!
//! - validates the configuration at the boundary (never clamps)
//! - builds a fresh simulator and residual model for the run
//! - hands the objective to the selected optimizer
//! - falls back to the last valid iterate if the optimizer itself fails
//! - assembles the `FitResult` (full ordered vector, sum of squares, status)

use std::time::Instant;

use tracing::{info, warn};

use crate::domain::{
    AlgorithmConfig, DistributionConfig, Experiment, FitOptions, FitResult, FitStatus, FitTarget,
    GenerationDiagnostic, ParameterSet, SimulationConfig,
};
use crate::error::AppError;
use crate::fit::de::DifferentialEvolution;
use crate::fit::lm::LevenbergMarquardt;
use crate::fit::objective::Objective;
use crate::fit::optimizer::{Optimizer, Problem};
use crate::fit::progress::{AbortHandle, Progress};
use crate::fit::residual::{ResidualModel, sum_of_squares};
use crate::models::build_model;
use crate::report::format_elapsed;

#[derive(Debug, Clone)]
pub struct FitDriver {
    sim: SimulationConfig,
    dists: DistributionConfig,
    abort: AbortHandle,
    progress: Progress,
}

impl FitDriver {
    pub fn new(sim: SimulationConfig, dists: DistributionConfig) -> Self {
        Self {
            sim,
            dists,
            abort: AbortHandle::new(),
            progress: Progress::silent(),
        }
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn simulation(&self) -> &SimulationConfig {
        &self.sim
    }

    pub fn distributions(&self) -> &DistributionConfig {
        &self.dists
    }

    /// Fit `params` (values, bounds, vary flags) to one experiment.
    pub fn fit(
        &self,
        experiment: &Experiment,
        params: &ParameterSet,
        options: &FitOptions,
    ) -> Result<FitResult, AppError> {
        options.algorithm.validate()?;
        let optimizer: Box<dyn Optimizer> = match &options.algorithm {
            AlgorithmConfig::Local(cfg) => Box::new(LevenbergMarquardt::new(cfg.clone())),
            AlgorithmConfig::Global(cfg) => Box::new(DifferentialEvolution::new(cfg.clone())),
        };
        self.fit_with(experiment, params, options.target, optimizer.as_ref())
    }

    /// Same as [`FitDriver::fit`] with a caller-supplied optimizer.
    pub fn fit_with(
        &self,
        experiment: &Experiment,
        params: &ParameterSet,
        target: FitTarget,
        optimizer: &dyn Optimizer,
    ) -> Result<FitResult, AppError> {
        let started = Instant::now();
        self.sim.validate()?;
        params.validate()?;

        let model = build_model(params.model, &self.sim, &self.dists);
        let residual = ResidualModel::new(
            model.as_ref(),
            experiment,
            Some(&experiment.mask),
            target,
            self.sim.time_inc,
        )?;
        let mut objective = Objective::new(&residual, params, self.abort.clone(), self.progress.clone());
        let x0 = objective.initial_free();

        info!(
            model = params.model.display_name(),
            algorithm = optimizer.name(),
            n_free = x0.len(),
            n_residuals = residual.len(),
            "starting fit"
        );

        let make_result = |values: Vec<f64>,
                           chi_square: f64,
                           nfev: usize,
                           iterations: usize,
                           status: FitStatus,
                           generations: Vec<GenerationDiagnostic>| {
            FitResult {
                model: params.model,
                names: params.names(),
                values,
                chi_square,
                n_residuals: residual.len(),
                n_free: x0.len(),
                nfev,
                iterations,
                status,
                elapsed_secs: started.elapsed().as_secs_f64(),
                generations,
            }
        };

        if x0.is_empty() {
            let values = params.values();
            let chi_square = sum_of_squares(&residual.residuals(&values)?);
            return Ok(make_result(values, chi_square, 1, 0, FitStatus::NothingToVary, Vec::new()));
        }

        let result = match optimizer.minimize(&mut objective, &x0) {
            Ok(out) => {
                let nfev = objective.evaluations();
                make_result(
                    objective.expand(&out.x),
                    out.cost,
                    nfev,
                    out.iterations,
                    out.termination.status(),
                    out.generations,
                )
            }
            Err(err) if err.is_recoverable_in_fit() => {
                let Some((values, chi_square)) = objective.last_good().cloned() else {
                    return Err(AppError::numeric(format!(
                        "{} never reached a valid iterate: {err}",
                        optimizer.name()
                    )));
                };
                warn!("{} failed, returning last valid iterate: {err}", optimizer.name());
                make_result(
                    values,
                    chi_square,
                    objective.evaluations(),
                    0,
                    FitStatus::Recovered {
                        reason: err.to_string(),
                    },
                    Vec::new(),
                )
            }
            Err(err) => return Err(err),
        };

        info!(
            status = %result.status.describe(),
            chi_square = result.chi_square,
            nfev = result.nfev,
            elapsed = %format_elapsed(result.elapsed_secs),
            "fit finished"
        );
        Ok(result)
    }

    /// Joint fitting across conditions is not available; a single condition
    /// is fitted as usual.
    pub fn fit_batch(
        &self,
        experiments: &[Experiment],
        params: &ParameterSet,
        options: &FitOptions,
    ) -> Result<FitResult, AppError> {
        match experiments {
            [] => Err(AppError::invalid("No experiment to fit.")),
            [single] => self.fit(single, params, options),
            _ => Err(AppError::not_supported(
                "Batch fitting across multiple conditions is not supported.",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GlobalConfig, LocalConfig, ModelKind};
    use crate::fit::optimizer::OptimizerOutcome;
    use crate::models::simulate_harvested;

    fn setup() -> (FitDriver, Experiment, ParameterSet) {
        let sim = SimulationConfig {
            init_cell: 10_000.0,
            max_div: 4,
            ..SimulationConfig::default()
        };
        let dists = DistributionConfig::default();
        let truth = ParameterSet::defaults(ModelKind::Cyton15);
        let model = build_model(ModelKind::Cyton15, &sim, &dists);
        let out = simulate_harvested(model.as_ref(), &truth.values(), &sim.harvested_times, sim.time_inc).unwrap();
        let counts = (0..out.harvested.n_times())
            .map(|k| {
                let row: Vec<f64> = (0..out.harvested.n_generations()).map(|g| out.harvested.live(k, g)).collect();
                vec![row.clone(), row]
            })
            .collect();
        let exp = Experiment::new("synthetic", sim.harvested_times.clone(), counts).unwrap();
        (FitDriver::new(sim, dists), exp, truth)
    }

    fn perturbed(truth: &ParameterSet) -> ParameterSet {
        let mut start = truth.clone();
        start.vary_only(&["stimMuDiv", "stimMuDeath", "b", "pF"]).unwrap();
        start.set_value("stimMuDiv", 28.0).unwrap();
        start.set_value("stimMuDeath", 68.0).unwrap();
        start.set_value("b", 11.0).unwrap();
        start.set_value("pF", 0.6).unwrap();
        start
    }

    #[test]
    fn local_fit_recovers_parameters_and_keeps_locked_values() {
        let (driver, exp, truth) = setup();
        let start = perturbed(&truth);
        let res = driver.fit(&exp, &start, &FitOptions::default()).unwrap();

        assert!(matches!(res.status, FitStatus::Converged { .. }), "{:?}", res.status);
        for name in ["stimMuDiv", "stimMuDeath", "b", "pF"] {
            let want = truth.get(name).unwrap().value;
            let got = res.value(name).unwrap();
            assert!((got - want).abs() < 1e-3 * want.max(1.0), "{name}: {got} vs {want}");
        }
        for (i, p) in start.params.iter().enumerate() {
            if !p.vary {
                assert_eq!(res.values[i].to_bits(), p.value.to_bits(), "{} moved", p.name);
            }
        }
        assert!(res.chi_square < 1e-6);
    }

    #[test]
    fn global_fit_agrees_with_local_fit() {
        let (driver, exp, truth) = setup();
        let mut start = truth.clone();
        start.vary_only(&["stimMuDiv", "pF"]).unwrap();
        start.set_value("stimMuDiv", 28.0).unwrap();
        start.set_value("pF", 0.6).unwrap();
        start.set_bounds("stimMuDiv", 10.0, 40.0).unwrap();
        let options = FitOptions {
            algorithm: AlgorithmConfig::Global(GlobalConfig {
                max_generations: 60,
                popsize: 8,
                ..GlobalConfig::default()
            }),
            ..FitOptions::default()
        };
        let global = driver.fit(&exp, &start, &options).unwrap();
        let local = driver.fit(&exp, &start, &FitOptions::default()).unwrap();

        assert!(!global.generations.is_empty());
        for name in ["stimMuDiv", "pF"] {
            let g = global.value(name).unwrap();
            let l = local.value(name).unwrap();
            let want = truth.get(name).unwrap().value;
            assert!((g - l).abs() < 1e-3 * l.abs().max(1.0), "{name}: {g} vs {l}");
            assert!((g - want).abs() < 1e-3 * want.max(1.0), "{name}: {g} vs {want}");
        }
        let locked = start.get("stimMuDeath").unwrap().value;
        assert_eq!(global.value("stimMuDeath").unwrap().to_bits(), locked.to_bits());
    }

    #[test]
    fn out_of_bounds_start_is_rejected() {
        let (driver, exp, truth) = setup();
        let mut start = truth.clone();
        start.set_bounds("b", 1.0, 5.0).unwrap();
        let err = driver.fit(&exp, &start, &FitOptions::default()).unwrap_err();
        assert!(matches!(err, AppError::InvalidConfig(_)));
    }

    #[test]
    fn abort_before_start_returns_the_initial_point() {
        let (driver, exp, truth) = setup();
        let abort = AbortHandle::new();
        abort.abort();
        let driver = driver.with_abort(abort);
        let res = driver.fit(&exp, &perturbed(&truth), &FitOptions::default()).unwrap();
        assert_eq!(res.status, FitStatus::Aborted);
        assert_eq!(res.value("b"), Some(11.0));
    }

    #[test]
    fn evaluation_budget_is_not_an_error() {
        let (driver, exp, truth) = setup();
        let options = FitOptions {
            algorithm: AlgorithmConfig::Local(LocalConfig {
                max_nfev: 3,
                ..LocalConfig::default()
            }),
            ..FitOptions::default()
        };
        let res = driver.fit(&exp, &perturbed(&truth), &options).unwrap();
        assert_eq!(res.status, FitStatus::MaxEvaluations);
    }

    #[test]
    fn all_locked_is_a_plain_evaluation() {
        let (driver, exp, truth) = setup();
        let mut start = truth.clone();
        start.vary_only(&[]).unwrap();
        let res = driver.fit(&exp, &start, &FitOptions::default()).unwrap();
        assert_eq!(res.status, FitStatus::NothingToVary);
        assert!(res.chi_square < 1e-12);
    }

    #[test]
    fn start_outside_the_model_domain_is_a_config_error() {
        let (driver, exp, truth) = setup();
        let mut start = truth.clone();
        start.set_bounds("stimSigDiv", 0.0, 1.0).unwrap();
        start.set_value("stimSigDiv", 0.0).unwrap();
        let err = driver.fit(&exp, &start, &FitOptions::default()).unwrap_err();
        assert!(matches!(err, AppError::InvalidConfig(_)), "{err:?}");
        assert_eq!(err.exit_code(), 2);

        let mut start = truth.clone();
        start.set_bounds("pF", -0.5, 2.0).unwrap();
        start.set_value("pF", 1.5).unwrap();
        let err = driver.fit(&exp, &start, &FitOptions::default()).unwrap_err();
        assert!(matches!(err, AppError::InvalidConfig(_)), "{err:?}");
    }

    /// Evaluates `steps` points along the first axis, then gives up.
    struct GivesUpAfter {
        steps: usize,
    }

    impl Optimizer for GivesUpAfter {
        fn name(&self) -> &'static str {
            "gives-up"
        }

        fn minimize(&self, problem: &mut dyn Problem, x0: &[f64]) -> Result<OptimizerOutcome, AppError> {
            let mut x = x0.to_vec();
            for _ in 0..self.steps {
                let _ = problem.cost(&x);
                x[0] += 0.5;
            }
            Err(AppError::numeric("singular normal equations"))
        }
    }

    #[test]
    fn optimizer_failure_returns_the_last_valid_iterate() {
        let (driver, exp, truth) = setup();
        let start = perturbed(&truth);
        let res = driver
            .fit_with(&exp, &start, FitTarget::PerGeneration, &GivesUpAfter { steps: 3 })
            .unwrap();

        assert!(
            matches!(&res.status, FitStatus::Recovered { reason } if reason.contains("singular")),
            "{:?}",
            res.status
        );
        // Third evaluated point: stimMuDiv moved twice by 0.5.
        let mut want = start.values();
        want[2] = 29.0;
        assert_eq!(res.values, want);
        assert_eq!(res.nfev, 3);
        assert!(res.chi_square.is_finite() && res.chi_square > 0.0);
    }

    #[test]
    fn optimizer_failure_without_a_valid_iterate_is_numeric() {
        let (driver, exp, truth) = setup();
        let err = driver
            .fit_with(&exp, &perturbed(&truth), FitTarget::PerGeneration, &GivesUpAfter { steps: 0 })
            .unwrap_err();
        assert!(matches!(err, AppError::NumericFailure(_)), "{err:?}");
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn cyton1_round_trip_recovers_free_and_keeps_locked_values() {
        let sim = SimulationConfig {
            init_cell: 10_000.0,
            max_div: 4,
            ..SimulationConfig::default()
        };
        let dists = DistributionConfig::default();
        let mut truth = ParameterSet::defaults(ModelKind::Cyton1);
        truth.set_value("pF0", 0.8).unwrap();
        truth.set_value("MDProp", 0.2).unwrap();
        let model = build_model(ModelKind::Cyton1, &sim, &dists);
        let out = simulate_harvested(model.as_ref(), &truth.values(), &sim.harvested_times, sim.time_inc).unwrap();
        let counts = (0..out.harvested.n_times())
            .map(|k| vec![(0..out.harvested.n_generations()).map(|g| out.harvested.live(k, g)).collect::<Vec<f64>>()])
            .collect();
        let exp = Experiment::new("cyton1", sim.harvested_times.clone(), counts).unwrap();
        let driver = FitDriver::new(sim, dists);

        let mut start = truth.clone();
        start.vary_only(&["mu0Div", "muSubDiv", "pF0", "MDProp"]).unwrap();
        start.set_value("mu0Div", 44.0).unwrap();
        start.set_value("muSubDiv", 13.5).unwrap();
        start.set_value("pF0", 0.7).unwrap();
        start.set_value("MDProp", 0.3).unwrap();

        let res = driver.fit(&exp, &start, &FitOptions::default()).unwrap();
        assert!(matches!(res.status, FitStatus::Converged { .. }), "{:?}", res.status);
        assert!(res.chi_square < 1e-6, "chi = {}", res.chi_square);
        for name in ["mu0Div", "muSubDiv", "pF0", "MDProp"] {
            let want = truth.get(name).unwrap().value;
            let got = res.value(name).unwrap();
            assert!((got - want).abs() < 1e-3 * want.max(1.0), "{name}: {got} vs {want}");
        }
        for (i, p) in start.params.iter().enumerate() {
            if !p.vary {
                assert_eq!(res.values[i].to_bits(), p.value.to_bits(), "{} moved", p.name);
            }
        }
    }

    #[test]
    fn batch_of_several_conditions_is_not_supported() {
        let (driver, exp, truth) = setup();
        let err = driver
            .fit_batch(&[exp.clone(), exp], &truth, &FitOptions::default())
            .unwrap_err();
        assert!(matches!(err, AppError::NotSupported(_)));
    }
}
