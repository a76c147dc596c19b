//! Residual construction against masked replicate data.
//!
//! Observations are flattened once, in timepoint → replicate → generation
//! order, skipping masked entries. Each flattened term remembers which
//! simulated cells it compares against:
//!
//! - per-generation mode: one generation at one harvested time
//! - total-cell mode: the sum of the included generations of one replicate
//!
//! Residuals follow the `model - observed` convention.

use crate::domain::{Experiment, FitTarget, InclusionMask, ModelKind};
use crate::error::AppError;
use crate::models::{GenerationProfile, PopulationModel, TimeGrid};

#[derive(Debug, Clone, PartialEq)]
struct Term {
    /// Grid index of the harvested time.
    time_idx: usize,
    generations: Vec<usize>,
}

pub struct ResidualModel<'a> {
    model: &'a dyn PopulationModel,
    grid: TimeGrid,
    terms: Vec<Term>,
    observed: Vec<f64>,
}

impl<'a> ResidualModel<'a> {
    /// Flatten `experiment` against `model`.
    ///
    /// `mask = None` behaves exactly like an all-included mask.
    pub fn new(
        model: &'a dyn PopulationModel,
        experiment: &Experiment,
        mask: Option<&InclusionMask>,
        target: FitTarget,
        time_inc: f64,
    ) -> Result<Self, AppError> {
        experiment.validate()?;
        if target == FitTarget::TotalCells && model.kind() == ModelKind::Cyton1 {
            return Err(AppError::not_supported("Total-cell fitting is not available for Cyton 1."));
        }
        let n_model_gens = model.max_div() + 1;
        if experiment.n_generations() > n_model_gens {
            return Err(AppError::invalid(format!(
                "Data has {} generations but the model only simulates {n_model_gens} (max_div={})",
                experiment.n_generations(),
                model.max_div()
            )));
        }
        if let Some(m) = mask {
            if !m.matches_shape(&experiment.counts) {
                return Err(AppError::invalid("Inclusion mask shape does not match the counts."));
            }
        }

        let (grid, harvest_idx) = TimeGrid::for_harvested(&experiment.harvested_times, time_inc)?;
        let included = |itpt: usize, irep: usize, igen: usize| match mask {
            Some(m) => m.is_included(itpt, irep, igen),
            None => true,
        };

        let mut terms = Vec::new();
        let mut observed = Vec::new();
        for (itpt, reps) in experiment.counts.iter().enumerate() {
            let time_idx = harvest_idx[itpt];
            for (irep, gens) in reps.iter().enumerate() {
                match target {
                    FitTarget::PerGeneration => {
                        for (igen, &count) in gens.iter().enumerate() {
                            if included(itpt, irep, igen) {
                                terms.push(Term {
                                    time_idx,
                                    generations: vec![igen],
                                });
                                observed.push(count);
                            }
                        }
                    }
                    FitTarget::TotalCells => {
                        let picked: Vec<usize> = (0..gens.len()).filter(|&g| included(itpt, irep, g)).collect();
                        if picked.is_empty() {
                            continue;
                        }
                        observed.push(picked.iter().map(|&g| gens[g]).sum());
                        terms.push(Term {
                            time_idx,
                            generations: picked,
                        });
                    }
                }
            }
        }

        if terms.is_empty() {
            return Err(AppError::invalid("Every observation is masked out; nothing to fit."));
        }

        Ok(Self {
            model,
            grid,
            terms,
            observed,
        })
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn observed(&self) -> &[f64] {
        &self.observed
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn model_kind(&self) -> ModelKind {
        self.model.kind()
    }

    /// Model values for every flattened term.
    pub fn predicted(&self, values: &[f64]) -> Result<Vec<f64>, AppError> {
        let profile = self.model.simulate(values, &self.grid)?;
        Ok(self.project(&profile))
    }

    /// `model - observed` for every flattened term.
    pub fn residuals(&self, values: &[f64]) -> Result<Vec<f64>, AppError> {
        let predicted = self.predicted(values)?;
        let out: Vec<f64> = predicted.iter().zip(&self.observed).map(|(m, o)| m - o).collect();
        if out.iter().any(|r| !r.is_finite()) {
            return Err(AppError::numeric("Non-finite residual."));
        }
        Ok(out)
    }

    fn project(&self, profile: &GenerationProfile) -> Vec<f64> {
        self.terms
            .iter()
            .map(|term| term.generations.iter().map(|&g| profile.live(term.time_idx, g)).sum())
            .collect()
    }
}

/// Sum of squares of a residual vector.
pub fn sum_of_squares(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}
