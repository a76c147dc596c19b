//! Uniform simulation time grid.

use crate::error::AppError;

const ALIGN_TOL: f64 = 1e-9;

/// Times `0, dt, 2dt, ..., horizon`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    dt: f64,
    times: Vec<f64>,
}

impl TimeGrid {
    pub fn new(horizon: f64, dt: f64) -> Result<Self, AppError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(AppError::invalid(format!("Time increment must be > 0, got {dt}")));
        }
        if !(horizon.is_finite() && horizon >= 0.0) {
            return Err(AppError::invalid(format!("Time horizon must be >= 0, got {horizon}")));
        }
        let steps = aligned_steps(horizon, dt).ok_or_else(|| {
            AppError::invalid(format!(
                "Time increment {dt} does not divide the last harvested time {horizon}"
            ))
        })?;
        let times = (0..=steps).map(|k| k as f64 * dt).collect();
        Ok(Self { dt, times })
    }

    /// Grid reaching the last harvested time; every harvested time must lie on it.
    pub fn for_harvested(harvested: &[f64], dt: f64) -> Result<(Self, Vec<usize>), AppError> {
        let horizon = harvested.iter().copied().fold(0.0, f64::max);
        let grid = Self::new(horizon, dt)?;
        let idx = harvested
            .iter()
            .map(|&t| grid.index_of(t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((grid, idx))
    }

    /// Grid index of a harvested time.
    pub fn index_of(&self, t: f64) -> Result<usize, AppError> {
        match aligned_steps(t, self.dt) {
            Some(k) if k < self.times.len() => Ok(k),
            Some(_) => Err(AppError::invalid(format!(
                "Harvested time {t} lies beyond the grid horizon {}",
                self.horizon()
            ))),
            None => Err(AppError::invalid(format!(
                "Harvested time {t} is not a multiple of the time increment {}",
                self.dt
            ))),
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn horizon(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }
}

fn aligned_steps(t: f64, dt: f64) -> Option<usize> {
    if t < 0.0 {
        return None;
    }
    let k = (t / dt).round();
    if (k * dt - t).abs() <= ALIGN_TOL * t.abs().max(1.0) {
        Some(k as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_includes_both_ends() {
        let g = TimeGrid::new(120.0, 1.0).unwrap();
        assert_eq!(g.len(), 121);
        assert_eq!(g.times()[0], 0.0);
        assert_eq!(g.horizon(), 120.0);
    }

    #[test]
    fn harvested_times_map_to_indices() {
        let (g, idx) = TimeGrid::for_harvested(&[0.0, 16.0, 54.0], 0.5).unwrap();
        assert_eq!(g.len(), 109);
        assert_eq!(idx, vec![0, 32, 108]);
    }

    #[test]
    fn misaligned_harvest_is_rejected() {
        let err = TimeGrid::for_harvested(&[0.0, 10.0, 15.0], 4.0).unwrap_err();
        assert!(matches!(err, AppError::InvalidConfig(_)));
    }
}
