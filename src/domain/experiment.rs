//! Observed cell counts and the inclusion mask.
//!
//! Data layout: `counts[timepoint][replicate][generation]`. Replicate counts
//! may differ across timepoints, but every replicate carries the same number
//! of generations.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Per-entry include flags, same shape as the counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionMask {
    flags: Vec<Vec<Vec<bool>>>,
}

impl InclusionMask {
    /// Everything included.
    pub fn all_included(counts: &[Vec<Vec<f64>>]) -> Self {
        let flags = counts
            .iter()
            .map(|reps| reps.iter().map(|gens| vec![true; gens.len()]).collect())
            .collect();
        Self { flags }
    }

    pub fn from_flags(flags: Vec<Vec<Vec<bool>>>) -> Self {
        Self { flags }
    }

    pub fn flags(&self) -> &[Vec<Vec<bool>>] {
        &self.flags
    }

    pub fn is_included(&self, itpt: usize, irep: usize, igen: usize) -> bool {
        self.flags
            .get(itpt)
            .and_then(|r| r.get(irep))
            .and_then(|g| g.get(igen))
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, itpt: usize, irep: usize, igen: usize, included: bool) -> Result<(), AppError> {
        let slot = self
            .flags
            .get_mut(itpt)
            .and_then(|r| r.get_mut(irep))
            .and_then(|g| g.get_mut(igen))
            .ok_or_else(|| {
                AppError::invalid(format!("Mask index ({itpt}, {irep}, {igen}) is out of range"))
            })?;
        *slot = included;
        Ok(())
    }

    /// Set every replicate of one generation at one timepoint.
    pub fn set_generation(&mut self, itpt: usize, igen: usize, included: bool) -> Result<(), AppError> {
        let n_reps = self.flags.get(itpt).map(Vec::len).unwrap_or(0);
        if n_reps == 0 {
            return Err(AppError::invalid(format!("Timepoint index {itpt} is out of range")));
        }
        for irep in 0..n_reps {
            self.set(itpt, irep, igen, included)?;
        }
        Ok(())
    }

    pub fn count_included(&self) -> usize {
        self.flags.iter().flatten().flatten().filter(|f| **f).count()
    }

    pub fn matches_shape(&self, counts: &[Vec<Vec<f64>>]) -> bool {
        self.flags.len() == counts.len()
            && self.flags.iter().zip(counts).all(|(fr, cr)| {
                fr.len() == cr.len() && fr.iter().zip(cr).all(|(fg, cg)| fg.len() == cg.len())
            })
    }
}

/// One experimental condition: harvested times and replicate counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    pub harvested_times: Vec<f64>,
    pub counts: Vec<Vec<Vec<f64>>>,
    pub mask: InclusionMask,
}

impl Experiment {
    /// Validate the shape and build an all-included mask.
    pub fn new(
        name: impl Into<String>,
        harvested_times: Vec<f64>,
        counts: Vec<Vec<Vec<f64>>>,
    ) -> Result<Self, AppError> {
        let mask = InclusionMask::all_included(&counts);
        Self::with_mask(name, harvested_times, counts, mask)
    }

    pub fn with_mask(
        name: impl Into<String>,
        harvested_times: Vec<f64>,
        counts: Vec<Vec<Vec<f64>>>,
        mask: InclusionMask,
    ) -> Result<Self, AppError> {
        let exp = Self {
            name: name.into(),
            harvested_times,
            counts,
            mask,
        };
        exp.validate()?;
        Ok(exp)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.harvested_times.is_empty() {
            return Err(AppError::invalid("Experiment has no harvested times."));
        }
        if self.harvested_times.len() != self.counts.len() {
            return Err(AppError::invalid(format!(
                "Experiment has {} harvested times but {} count blocks",
                self.harvested_times.len(),
                self.counts.len()
            )));
        }
        if self.harvested_times.iter().any(|t| !(t.is_finite() && *t >= 0.0)) {
            return Err(AppError::invalid("Harvested times must be finite and >= 0."));
        }
        if self.harvested_times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::invalid("Harvested times must be strictly increasing."));
        }

        let n_gens = self.n_generations();
        if n_gens == 0 {
            return Err(AppError::invalid("Experiment has no generation columns."));
        }
        for (itpt, reps) in self.counts.iter().enumerate() {
            if reps.is_empty() {
                return Err(AppError::invalid(format!(
                    "Timepoint {} has no replicates",
                    self.harvested_times[itpt]
                )));
            }
            for (irep, gens) in reps.iter().enumerate() {
                if gens.len() != n_gens {
                    return Err(AppError::invalid(format!(
                        "Replicate {irep} at t={} has {} generations, expected {n_gens}",
                        self.harvested_times[itpt],
                        gens.len()
                    )));
                }
                if gens.iter().any(|c| !(c.is_finite() && *c >= 0.0)) {
                    return Err(AppError::invalid(format!(
                        "Replicate {irep} at t={} has a negative or non-finite count",
                        self.harvested_times[itpt]
                    )));
                }
            }
        }

        if !self.mask.matches_shape(&self.counts) {
            return Err(AppError::invalid("Inclusion mask shape does not match the counts."));
        }
        Ok(())
    }

    pub fn n_timepoints(&self) -> usize {
        self.harvested_times.len()
    }

    pub fn n_replicates(&self, itpt: usize) -> usize {
        self.counts.get(itpt).map(Vec::len).unwrap_or(0)
    }

    /// Number of generation columns (`max division in data + 1`).
    pub fn n_generations(&self) -> usize {
        self.counts
            .first()
            .and_then(|reps| reps.first())
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Highest division number present in the data.
    pub fn max_div_in_data(&self) -> usize {
        self.n_generations().saturating_sub(1)
    }

    /// Replicate mean per generation at one timepoint.
    pub fn mean_per_generation(&self, itpt: usize) -> Vec<f64> {
        let reps = &self.counts[itpt];
        let n = reps.len().max(1) as f64;
        (0..self.n_generations())
            .map(|g| reps.iter().map(|r| r[g]).sum::<f64>() / n)
            .collect()
    }

    /// Replicate totals (summed over generations) at one timepoint.
    pub fn totals(&self, itpt: usize) -> Vec<f64> {
        self.counts[itpt].iter().map(|r| r.iter().sum()).collect()
    }
}
