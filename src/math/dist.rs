//! Continuous lifetime distributions used by the Cyton models.
//!
//! Three families are supported:
//!
//! - `Lognormal`: `ln t ~ N(ln location, scale)`, so `location` is the median
//! - `Gaussian`: `N(location, scale)`
//! - `Exponential`: rate `1 / location` (`scale` is ignored)
//!
//! Numerical notes:
//! - the simulators work with *ages*, which are never negative; `LifetimeCdf`
//!   truncates each family at zero so the whole probability mass sits on
//!   `t >= 0` (only the Gaussian family is affected)
//! - the statrs constructors are only called after `validate_shape` so their
//!   error paths are unreachable in practice, but they are still propagated

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Exp, LogNormal, Normal};

use crate::error::AppError;

/// Distribution family for one sub-process (division, death, destiny).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    #[default]
    Lognormal,
    Gaussian,
    Exponential,
}

impl Family {
    pub fn display_name(self) -> &'static str {
        match self {
            Family::Lognormal => "Lognormal",
            Family::Gaussian => "Gaussian",
            Family::Exponential => "Exponential",
        }
    }
}

/// A family bound to concrete location/scale values.
#[derive(Debug, Clone, Copy)]
pub enum Lifetime {
    Lognormal(LogNormal),
    Gaussian(Normal),
    Exponential(Exp),
}

impl Lifetime {
    pub fn new(family: Family, location: f64, scale: f64) -> Result<Self, AppError> {
        validate_shape(family, location, scale)?;
        let built = match family {
            Family::Lognormal => LogNormal::new(location.ln(), scale).map(Lifetime::Lognormal),
            Family::Gaussian => Normal::new(location, scale).map(Lifetime::Gaussian),
            Family::Exponential => {
                return Exp::new(1.0 / location)
                    .map(Lifetime::Exponential)
                    .map_err(|e| AppError::invalid(format!("Exponential(rate=1/{location}): {e}")));
            }
        };
        built.map_err(|e| {
            AppError::invalid(format!(
                "{}(location={location}, scale={scale}): {e}",
                family.display_name()
            ))
        })
    }

    pub fn pdf(&self, t: f64) -> f64 {
        match self {
            // statrs returns 0 for t <= 0 on the lognormal and exponential.
            Lifetime::Lognormal(d) => d.pdf(t),
            Lifetime::Gaussian(d) => d.pdf(t),
            Lifetime::Exponential(d) => d.pdf(t),
        }
    }

    pub fn cdf(&self, t: f64) -> f64 {
        match self {
            Lifetime::Lognormal(d) => {
                if t <= 0.0 {
                    0.0
                } else {
                    d.cdf(t)
                }
            }
            Lifetime::Gaussian(d) => d.cdf(t),
            Lifetime::Exponential(d) => {
                if t <= 0.0 {
                    0.0
                } else {
                    d.cdf(t)
                }
            }
        }
    }
}

/// Probability density of `family(location, scale)` at `t`.
pub fn pdf(t: f64, location: f64, scale: f64, family: Family) -> Result<f64, AppError> {
    Ok(Lifetime::new(family, location, scale)?.pdf(t))
}

/// Cumulative distribution of `family(location, scale)` at `t`.
pub fn cdf(t: f64, location: f64, scale: f64, family: Family) -> Result<f64, AppError> {
    Ok(Lifetime::new(family, location, scale)?.cdf(t))
}

/// Vectorised `pdf` over a slice of times.
pub fn pdf_many(times: &[f64], location: f64, scale: f64, family: Family) -> Result<Vec<f64>, AppError> {
    let d = Lifetime::new(family, location, scale)?;
    Ok(times.iter().map(|&t| d.pdf(t)).collect())
}

/// Vectorised `cdf` over a slice of times.
pub fn cdf_many(times: &[f64], location: f64, scale: f64, family: Family) -> Result<Vec<f64>, AppError> {
    let d = Lifetime::new(family, location, scale)?;
    Ok(times.iter().map(|&t| d.cdf(t)).collect())
}

/// CDF of a non-negative lifetime: the family truncated to `[0, ∞)`.
///
/// `F̃(a) = (F(a) - F(0)) / (1 - F(0))` for `a >= 0`, and `0` for `a < 0`.
#[derive(Debug, Clone, Copy)]
pub struct LifetimeCdf {
    dist: Lifetime,
    mass_below_zero: f64,
}

impl LifetimeCdf {
    pub fn new(family: Family, location: f64, scale: f64) -> Result<Self, AppError> {
        let dist = Lifetime::new(family, location, scale)?;
        let mass_below_zero = dist.cdf(0.0);
        if !(mass_below_zero < 1.0) {
            return Err(AppError::numeric(format!(
                "{} lifetime has no mass on t >= 0 (location={location}, scale={scale})",
                family.display_name()
            )));
        }
        Ok(Self {
            dist,
            mass_below_zero,
        })
    }

    pub fn at(&self, age: f64) -> f64 {
        if age <= 0.0 {
            return 0.0;
        }
        let raw = (self.dist.cdf(age) - self.mass_below_zero) / (1.0 - self.mass_below_zero);
        raw.clamp(0.0, 1.0)
    }

    /// CDF sampled at ages `0, dt, 2dt, ..., (n-1)dt`.
    pub fn tabulate(&self, dt: f64, n: usize) -> Vec<f64> {
        (0..n).map(|m| self.at(m as f64 * dt)).collect()
    }
}

fn validate_shape(family: Family, location: f64, scale: f64) -> Result<(), AppError> {
    if !(location.is_finite() && location > 0.0) {
        return Err(AppError::invalid(format!(
            "{} location must be finite and > 0, got {location}",
            family.display_name()
        )));
    }
    if family != Family::Exponential && !(scale.is_finite() && scale > 0.0) {
        return Err(AppError::invalid(format!(
            "{} scale must be finite and > 0, got {scale}",
            family.display_name()
        )));
    }
    Ok(())
}
