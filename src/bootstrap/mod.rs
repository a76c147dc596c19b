//! Case-resampling bootstrap for parameter confidence intervals.
//!
//! The run is split over a dedicated rayon pool:
//!
//! - iterations are partitioned evenly, the remainder going to the lowest
//!   worker ids
//! - worker `w` seeds its own `StdRng` with `seed + w` and owns its dataset
//! - every worker returns its accepted parameter vectors; the results are
//!   concatenated in worker order before the intervals are formed
//!
//! Resamples whose refit fails are counted and dropped.

pub mod interval;
pub mod resample;

pub use interval::*;
pub use resample::*;

use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{
    AlgorithmConfig, BootstrapConfig, Experiment, FitOptions, FitResult, FitStatus, IntervalMethod, ModelKind,
    ParameterSet,
};
use crate::error::AppError;
use crate::fit::{FitDriver, Progress};
use crate::report::format_elapsed;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapResult {
    pub model: ModelKind,
    pub method: IntervalMethod,
    pub confidence: f64,
    pub intervals: Vec<ParameterInterval>,
    /// Accepted full parameter vectors, in worker order.
    pub samples: Vec<Vec<f64>>,
    pub n_failed: usize,
    pub elapsed_secs: f64,
}

#[derive(Debug)]
struct WorkerOutput {
    worker_id: usize,
    samples: Vec<Vec<f64>>,
    failed: usize,
}

/// Iterations per worker: even split, remainder to the lowest ids.
pub fn partition_iterations(iterations: usize, workers: usize) -> Vec<usize> {
    let workers = workers.max(1);
    let base = iterations / workers;
    let extra = iterations % workers;
    (0..workers).map(|w| base + usize::from(w < extra)).collect()
}

/// Bootstrap the fit of `params` to `experiment`.
///
/// `estimate` is the fit to the unresampled data; its values are the starting
/// point of every refit and the point estimates of the intervals.
pub fn run_bootstrap(
    driver: &FitDriver,
    experiment: &Experiment,
    params: &ParameterSet,
    estimate: &FitResult,
    config: &BootstrapConfig,
) -> Result<BootstrapResult, AppError> {
    if params.model == ModelKind::Cyton1 {
        return Err(AppError::not_supported("Bootstrap is not available for Cyton 1."));
    }
    config.validate()?;
    if estimate.model != params.model || estimate.values.len() != params.len() {
        return Err(AppError::invalid("Point estimate does not belong to the parameter set."));
    }
    let start = params.with_values(&estimate.values)?;
    start.validate()?;

    let started = Instant::now();
    let workers = config.resolved_workers();
    let shares = partition_iterations(config.iterations, workers);
    let options = FitOptions {
        algorithm: AlgorithmConfig::Local(config.local.clone()),
        ..FitOptions::default()
    };
    // Inner fits stay quiet; the shared abort flag still stops them.
    let inner = driver.clone().with_progress(Progress::silent());

    info!(
        iterations = config.iterations,
        workers,
        method = config.method.display_name(),
        "starting bootstrap"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("cyton-boot-{i}"))
        .build()
        .map_err(|e| AppError::io(format!("Failed to build the bootstrap thread pool: {e}")))?;

    let mut outputs: Vec<WorkerOutput> = pool.install(|| {
        shares
            .par_iter()
            .enumerate()
            .map(|(worker_id, &n)| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(worker_id as u64));
                let mut out = WorkerOutput {
                    worker_id,
                    samples: Vec::with_capacity(n),
                    failed: 0,
                };
                for _ in 0..n {
                    let refit = resample_replicates(experiment, &mut rng)
                        .and_then(|data| inner.fit(&data, &start, &options));
                    match refit {
                        Ok(res) if !matches!(res.status, FitStatus::Aborted) => out.samples.push(res.values),
                        Ok(_) => break,
                        Err(err) => {
                            debug!(worker_id, "resample fit failed: {err}");
                            out.failed += 1;
                        }
                    }
                }
                out
            })
            .collect()
    });
    outputs.sort_by_key(|o| o.worker_id);

    let n_failed: usize = outputs.iter().map(|o| o.failed).sum();
    let samples: Vec<Vec<f64>> = outputs.into_iter().flat_map(|o| o.samples).collect();
    if n_failed > 0 {
        warn!(n_failed, "some resample fits failed and were dropped");
    }
    if samples.len() < 2 {
        return Err(AppError::numeric(format!(
            "Only {} resample fit(s) succeeded; at least 2 are needed for intervals.",
            samples.len()
        )));
    }

    let intervals = start
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let column: Vec<f64> = samples.iter().map(|s| s[i]).collect();
            interval(&p.name, estimate.values[i], &column, config.confidence, config.method)
        })
        .collect();

    let elapsed_secs = started.elapsed().as_secs_f64();
    info!(
        accepted = samples.len(),
        n_failed,
        elapsed = %format_elapsed(elapsed_secs),
        "bootstrap finished"
    );

    Ok(BootstrapResult {
        model: params.model,
        method: config.method,
        confidence: config.confidence,
        intervals,
        samples,
        n_failed,
        elapsed_secs,
    })
}

#[cfg(test)]
mod tests {
    use rand_distr::{Distribution, Normal};

    use super::*;
    use crate::domain::{DistributionConfig, SimulationConfig};
    use crate::models::{build_model, simulate_harvested};

    #[test]
    fn partition_gives_remainder_to_first_workers() {
        assert_eq!(partition_iterations(10, 4), vec![3, 3, 2, 2]);
        assert_eq!(partition_iterations(3, 5), vec![1, 1, 1, 0, 0]);
        assert_eq!(partition_iterations(8, 0), vec![8]);
    }

    fn noisy_experiment(sim: &SimulationConfig, truth: &ParameterSet) -> Experiment {
        let model = build_model(ModelKind::Cyton15, sim, &DistributionConfig::default());
        let out = simulate_harvested(model.as_ref(), &truth.values(), &sim.harvested_times, sim.time_inc).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let noise = Normal::new(1.0, 0.05).unwrap();
        let counts = (0..out.harvested.n_times())
            .map(|k| {
                (0..3)
                    .map(|_| {
                        (0..out.harvested.n_generations())
                            .map(|g| (out.harvested.live(k, g) * noise.sample(&mut rng)).max(0.0))
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Experiment::new("noisy", sim.harvested_times.clone(), counts).unwrap()
    }

    #[test]
    fn intervals_cover_the_point_estimate_and_are_reproducible() {
        let sim = SimulationConfig {
            init_cell: 10_000.0,
            max_div: 4,
            ..SimulationConfig::default()
        };
        let mut params = ParameterSet::defaults(ModelKind::Cyton15);
        params.vary_only(&["stimMuDiv", "pF"]).unwrap();
        let exp = noisy_experiment(&sim, &params);

        let driver = FitDriver::new(sim, DistributionConfig::default());
        let estimate = driver.fit(&exp, &params, &FitOptions::default()).unwrap();
        let cfg = BootstrapConfig {
            iterations: 12,
            workers: 3,
            ..BootstrapConfig::default()
        };

        let a = run_bootstrap(&driver, &exp, &params, &estimate, &cfg).unwrap();
        let b = run_bootstrap(&driver, &exp, &params, &estimate, &cfg).unwrap();
        assert_eq!(a.samples, b.samples);
        assert_eq!(a.samples.len() + a.n_failed, 12);

        let mu = &a.intervals[2];
        assert_eq!(mu.name, "stimMuDiv");
        assert!(mu.lower <= mu.upper);
        assert!(mu.std_dev > 0.0);
        // Locked parameters never move.
        let b_iv = &a.intervals[8];
        assert_eq!((b_iv.lower, b_iv.upper), (b_iv.estimate, b_iv.estimate));
    }

    #[test]
    fn cyton1_is_not_supported() {
        let params = ParameterSet::defaults(ModelKind::Cyton1);
        let exp = Experiment::new("e", vec![0.0], vec![vec![vec![1.0]]]).unwrap();
        let driver = FitDriver::new(SimulationConfig::default(), DistributionConfig::default());
        let estimate = FitResult {
            model: ModelKind::Cyton1,
            names: params.names(),
            values: params.values(),
            chi_square: 0.0,
            n_residuals: 1,
            n_free: 0,
            nfev: 0,
            iterations: 0,
            status: FitStatus::NothingToVary,
            elapsed_secs: 0.0,
            generations: Vec::new(),
        };
        let err = run_bootstrap(&driver, &exp, &params, &estimate, &BootstrapConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::NotSupported(_)));
    }
}
