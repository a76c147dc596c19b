//! Simulated population, per time and generation.
//!
//! Every matrix is `time × generation`. Cells are split into the sub-states
//! the fit and the report care about:
//!
//! - dividing (still progressing towards another division)
//! - destiny (stopped dividing; Cyton 1 non-progressors, Cyton 1.5 destiny)
//! - unstimulated (Cyton 1.5 only, always generation 0)
//!
//! `live` and `dead` counts are cumulative per generation: dead cells are
//! never removed.

use nalgebra::DMatrix;
use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationProfile {
    pub times: Vec<f64>,
    pub live_dividing: DMatrix<f64>,
    pub live_destiny: DMatrix<f64>,
    pub dead_dividing: DMatrix<f64>,
    pub dead_destiny: DMatrix<f64>,
    pub unstim_live: Vec<f64>,
    pub unstim_dead: Vec<f64>,
}

impl GenerationProfile {
    pub fn zeros(times: Vec<f64>, n_generations: usize) -> Self {
        let n = times.len();
        Self {
            live_dividing: DMatrix::zeros(n, n_generations),
            live_destiny: DMatrix::zeros(n, n_generations),
            dead_dividing: DMatrix::zeros(n, n_generations),
            dead_destiny: DMatrix::zeros(n, n_generations),
            unstim_live: vec![0.0; n],
            unstim_dead: vec![0.0; n],
            times,
        }
    }

    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    pub fn n_generations(&self) -> usize {
        self.live_dividing.ncols()
    }

    /// Live cells in generation `g` at time index `k` (unstimulated included in generation 0).
    pub fn live(&self, k: usize, g: usize) -> f64 {
        let unstim = if g == 0 { self.unstim_live[k] } else { 0.0 };
        self.live_dividing[(k, g)] + self.live_destiny[(k, g)] + unstim
    }

    /// Cumulative dead cells in generation `g` at time index `k`.
    pub fn dead(&self, k: usize, g: usize) -> f64 {
        let unstim = if g == 0 { self.unstim_dead[k] } else { 0.0 };
        self.dead_dividing[(k, g)] + self.dead_destiny[(k, g)] + unstim
    }

    pub fn total_live(&self, k: usize) -> f64 {
        (0..self.n_generations()).map(|g| self.live(k, g)).sum()
    }

    pub fn total_dead(&self, k: usize) -> f64 {
        (0..self.n_generations()).map(|g| self.dead(k, g)).sum()
    }

    /// Founder-equivalent cells: `Σ_g (live + dead) / 2^g`.
    ///
    /// Constant in time (equal to the initial cell count) for a consistent
    /// simulation.
    pub fn cohort_total(&self, k: usize) -> f64 {
        (0..self.n_generations())
            .map(|g| (self.live(k, g) + self.dead(k, g)) / 2f64.powi(g as i32))
            .sum()
    }

    pub fn total_live_series(&self) -> Vec<f64> {
        (0..self.n_times()).map(|k| self.total_live(k)).collect()
    }

    /// Rows at the given time indices (sparse, harvested view).
    pub fn select_rows(&self, idx: &[usize]) -> Result<Self, AppError> {
        if let Some(&bad) = idx.iter().find(|&&k| k >= self.n_times()) {
            return Err(AppError::invalid(format!(
                "Time index {bad} is beyond the simulated grid ({} points)",
                self.n_times()
            )));
        }
        let pick = |m: &DMatrix<f64>| DMatrix::from_fn(idx.len(), m.ncols(), |r, c| m[(idx[r], c)]);
        Ok(Self {
            times: idx.iter().map(|&k| self.times[k]).collect(),
            live_dividing: pick(&self.live_dividing),
            live_destiny: pick(&self.live_destiny),
            dead_dividing: pick(&self.dead_dividing),
            dead_destiny: pick(&self.dead_destiny),
            unstim_live: idx.iter().map(|&k| self.unstim_live[k]).collect(),
            unstim_dead: idx.iter().map(|&k| self.unstim_dead[k]).collect(),
        })
    }

    /// Clamp rounding negatives to zero and reject non-finite values.
    pub(crate) fn sanitize(&mut self) -> Result<(), AppError> {
        let series = [
            self.live_dividing.as_mut_slice(),
            self.live_destiny.as_mut_slice(),
            self.dead_dividing.as_mut_slice(),
            self.dead_destiny.as_mut_slice(),
            self.unstim_live.as_mut_slice(),
            self.unstim_dead.as_mut_slice(),
        ];
        for s in series {
            for v in s.iter_mut() {
                if !v.is_finite() {
                    return Err(AppError::numeric("Simulation produced a non-finite cell count."));
                }
                if *v < 0.0 {
                    *v = 0.0;
                }
            }
        }
        Ok(())
    }

    /// Row-major export view.
    pub fn to_table(&self) -> ProfileTable {
        let ng = self.n_generations();
        ProfileTable {
            times: self.times.clone(),
            live: (0..self.n_times())
                .map(|k| (0..ng).map(|g| self.live(k, g)).collect())
                .collect(),
            dead: (0..self.n_times())
                .map(|k| (0..ng).map(|g| self.dead(k, g)).collect())
                .collect(),
            unstim_live: self.unstim_live.clone(),
            total_live: self.total_live_series(),
        }
    }
}

/// Serializable `time × generation` rows of a profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileTable {
    pub times: Vec<f64>,
    pub live: Vec<Vec<f64>>,
    pub dead: Vec<Vec<f64>>,
    pub unstim_live: Vec<f64>,
    pub total_live: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstimulated_cells_count_towards_generation_zero() {
        let mut p = GenerationProfile::zeros(vec![0.0, 1.0], 2);
        p.live_dividing[(1, 0)] = 10.0;
        p.live_destiny[(1, 1)] = 4.0;
        p.unstim_live[1] = 5.0;
        p.unstim_dead[1] = 1.0;
        assert_eq!(p.live(1, 0), 15.0);
        assert_eq!(p.total_live(1), 19.0);
        assert_eq!(p.cohort_total(1), 15.0 + 1.0 + 2.0);
    }

    #[test]
    fn sanitize_clamps_tiny_negatives() {
        let mut p = GenerationProfile::zeros(vec![0.0], 1);
        p.dead_dividing[(0, 0)] = -1e-14;
        p.sanitize().unwrap();
        assert_eq!(p.dead_dividing[(0, 0)], 0.0);

        p.live_destiny[(0, 0)] = f64::NAN;
        assert!(matches!(p.sanitize(), Err(AppError::NumericFailure(_))));
    }

    #[test]
    fn select_rows_keeps_requested_times() {
        let mut p = GenerationProfile::zeros(vec![0.0, 1.0, 2.0], 1);
        p.live_dividing[(2, 0)] = 7.0;
        let s = p.select_rows(&[0, 2]).unwrap();
        assert_eq!(s.times, vec![0.0, 2.0]);
        assert_eq!(s.live(1, 0), 7.0);
        assert!(p.select_rows(&[3]).is_err());
    }
}
