//! Synthetic experiments drawn from a simulated profile.
//!
//! Each replicate count is the simulated live count multiplied by
//! log-normal noise with the requested coefficient of variation, so zero
//! generations stay zero and counts never turn negative.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::LogNormal;

use crate::domain::Experiment;
use crate::error::AppError;
use crate::models::GenerationProfile;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub replicates: usize,
    /// Coefficient of variation of the multiplicative noise; `0` is noiseless.
    pub noise_cv: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            replicates: 3,
            noise_cv: 0.05,
            seed: 42,
        }
    }
}

/// Build an experiment from the harvested rows of `profile`.
pub fn synthesize_experiment(
    name: &str,
    profile: &GenerationProfile,
    spec: &SyntheticSpec,
) -> Result<Experiment, AppError> {
    if spec.replicates == 0 {
        return Err(AppError::invalid("Synthetic data needs at least one replicate."));
    }
    if !(spec.noise_cv.is_finite() && spec.noise_cv >= 0.0) {
        return Err(AppError::invalid(format!("Noise CV must be >= 0, got {}", spec.noise_cv)));
    }

    let mut rng = StdRng::seed_from_u64(spec.seed);
    // Mean-one log-normal: sigma² = ln(1 + cv²), mu = -sigma²/2.
    let sigma = (1.0 + spec.noise_cv * spec.noise_cv).ln().sqrt();
    let noise = if sigma > 0.0 {
        Some(
            LogNormal::new(-0.5 * sigma * sigma, sigma)
                .map_err(|e| AppError::invalid(format!("Noise distribution error: {e}")))?,
        )
    } else {
        None
    };

    let counts = (0..profile.n_times())
        .map(|k| {
            (0..spec.replicates)
                .map(|_| {
                    (0..profile.n_generations())
                        .map(|g| {
                            let live = profile.live(k, g);
                            match &noise {
                                Some(d) => live * d.sample(&mut rng),
                                None => live,
                            }
                        })
                        .collect()
                })
                .collect()
        })
        .collect();

    Experiment::new(name, profile.times.clone(), counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> GenerationProfile {
        let mut p = GenerationProfile::zeros(vec![0.0, 10.0], 2);
        p.live_dividing[(0, 0)] = 1000.0;
        p.live_dividing[(1, 0)] = 600.0;
        p.live_destiny[(1, 1)] = 500.0;
        p
    }

    #[test]
    fn noiseless_copies_the_profile() {
        let spec = SyntheticSpec {
            noise_cv: 0.0,
            ..SyntheticSpec::default()
        };
        let exp = synthesize_experiment("clean", &profile(), &spec).unwrap();
        assert_eq!(exp.n_replicates(1), 3);
        assert_eq!(exp.counts[1][2], vec![600.0, 500.0]);
        assert_eq!(exp.counts[0][0], vec![1000.0, 0.0]);
    }

    #[test]
    fn noise_is_seeded_and_keeps_zeros() {
        let spec = SyntheticSpec::default();
        let a = synthesize_experiment("a", &profile(), &spec).unwrap();
        let b = synthesize_experiment("b", &profile(), &spec).unwrap();
        assert_eq!(a.counts, b.counts);
        assert!(a.counts[0].iter().all(|r| r[1] == 0.0));
        assert!(a.counts[1].iter().any(|r| r[0] != 600.0));
    }
}
