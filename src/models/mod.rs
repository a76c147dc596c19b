//! Cyton population simulators.
//!
//! Both variants implement `PopulationModel`, so the residual model and the
//! optimizers stay generic over the variant:
//!
//! - `cyton1`: per-generation competing division/death clocks
//! - `cyton15`: unstimulated/stimulated split with division destiny
//!
//! A simulation is pure: the same parameter vector and grid always give the
//! same `GenerationProfile`.

pub mod cyton1;
pub mod cyton15;
pub mod grid;
pub mod profile;

pub use cyton1::*;
pub use cyton15::*;
pub use grid::*;
pub use profile::*;

use crate::domain::{DistributionConfig, ModelKind, SimulationConfig};
use crate::error::AppError;

pub trait PopulationModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn max_div(&self) -> usize;

    /// Simulate on `grid` from a full parameter vector in declared order.
    fn simulate(&self, values: &[f64], grid: &TimeGrid) -> Result<GenerationProfile, AppError>;
}

/// Fresh simulator for `kind`, configured from the experiment settings.
pub fn build_model(
    kind: ModelKind,
    sim: &SimulationConfig,
    dists: &DistributionConfig,
) -> Box<dyn PopulationModel> {
    match kind {
        ModelKind::Cyton1 => Box::new(Cyton1Model::new(sim.init_cell, sim.max_div, dists.cyton1)),
        ModelKind::Cyton15 => Box::new(Cyton15Model::new(sim.init_cell, sim.max_div, dists.cyton15)),
    }
}

/// Dense and harvested views of one simulation.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub dense: GenerationProfile,
    pub harvested: GenerationProfile,
    pub harvest_idx: Vec<usize>,
}

/// Simulate up to the last harvested time and sample the harvested rows.
pub fn simulate_harvested(
    model: &dyn PopulationModel,
    values: &[f64],
    harvested_times: &[f64],
    time_inc: f64,
) -> Result<Simulation, AppError> {
    let (grid, harvest_idx) = TimeGrid::for_harvested(harvested_times, time_inc)?;
    let dense = model.simulate(values, &grid)?;
    let harvested = dense.select_rows(&harvest_idx)?;
    Ok(Simulation {
        dense,
        harvested,
        harvest_idx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParameterSet;

    #[test]
    fn data_free_defaults_simulate_both_variants() {
        let sim = SimulationConfig::default();
        let dists = DistributionConfig::default();
        for kind in [ModelKind::Cyton1, ModelKind::Cyton15] {
            let model = build_model(kind, &sim, &dists);
            let values = ParameterSet::defaults(kind).values();
            let out = simulate_harvested(model.as_ref(), &values, &sim.harvested_times, sim.time_inc).unwrap();
            assert_eq!(out.dense.n_times(), 121);
            assert_eq!(out.harvested.times, sim.harvested_times);
            assert_eq!(out.harvested.n_generations(), sim.max_div + 1);
            assert!((out.harvested.total_live(0) - sim.init_cell).abs() < 1e-9);
        }
    }

    #[test]
    fn wrong_vector_length_is_invalid() {
        let model = build_model(ModelKind::Cyton15, &SimulationConfig::default(), &DistributionConfig::default());
        let grid = TimeGrid::new(10.0, 1.0).unwrap();
        assert!(matches!(model.simulate(&[1.0; 3], &grid), Err(AppError::InvalidConfig(_))));
    }
}
