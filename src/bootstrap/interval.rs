//! Confidence intervals from bootstrap samples.

use serde::Serialize;

use crate::domain::IntervalMethod;
use crate::math::{mean, quantile, std_dev, std_normal_quantile};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterInterval {
    pub name: String,
    /// Value from the fit to the unresampled data.
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Interval for one parameter from its resampled values.
pub fn interval(name: &str, estimate: f64, samples: &[f64], confidence: f64, method: IntervalMethod) -> ParameterInterval {
    let alpha = 1.0 - confidence;
    let m = mean(samples);
    let sd = std_dev(samples);
    let (lower, upper) = match method {
        IntervalMethod::Percentile => (quantile(samples, alpha / 2.0), quantile(samples, 1.0 - alpha / 2.0)),
        IntervalMethod::Normal => {
            let z = std_normal_quantile(1.0 - alpha / 2.0);
            (estimate - z * sd, estimate + z * sd)
        }
    };
    ParameterInterval {
        name: name.to_string(),
        estimate,
        lower,
        upper,
        mean: m,
        std_dev: sd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interval_brackets_the_middle() {
        let samples: Vec<f64> = (0..=100).map(|i| i as f64).collect();
        let iv = interval("x", 50.0, &samples, 0.9, IntervalMethod::Percentile);
        assert!((iv.lower - 5.0).abs() < 1e-9);
        assert!((iv.upper - 95.0).abs() < 1e-9);
        assert!((iv.mean - 50.0).abs() < 1e-12);
    }

    #[test]
    fn normal_interval_is_symmetric_about_the_estimate() {
        let samples = [9.0, 10.0, 11.0, 10.0];
        let iv = interval("x", 10.0, &samples, 0.95, IntervalMethod::Normal);
        assert!(((iv.upper - 10.0) - (10.0 - iv.lower)).abs() < 1e-12);
        assert!(iv.upper > 11.0);
    }

    #[test]
    fn constant_samples_collapse() {
        let iv = interval("x", 3.0, &[3.0; 5], 0.95, IntervalMethod::Percentile);
        assert_eq!((iv.lower, iv.upper, iv.std_dev), (3.0, 3.0, 0.0));
    }
}
