//! Cyton 1.5: unstimulated/stimulated split with a division-destiny clock.
//!
//! - A fraction `1 - pF` of the founders is never stimulated: those cells
//!   stay in generation 0 and only die.
//! - Stimulated cells divide for the first time at `T1 ~ F_div`, then every
//!   `b` hours. One death clock `F_die` applies across all generations.
//! - Division destiny: a cell keeps dividing out of generation `g` only if the
//!   destiny clock has not fired by `stimMuDiv + g·b`.
//!
//! The generation distribution has a closed form at every time, so the
//! profile is evaluated point-wise; deaths per step use the trapezoid average
//! of the generation distribution over the step.

use crate::domain::{Cyton15Families, Cyton15Params, ModelKind};
use crate::error::AppError;
use crate::math::LifetimeCdf;
use crate::models::{GenerationProfile, PopulationModel, TimeGrid};

#[derive(Debug, Clone)]
pub struct Cyton15Model {
    init_cell: f64,
    max_div: usize,
    families: Cyton15Families,
}

/// Probabilities of a stimulated cell being in each generation, split into
/// still-dividing and destiny sub-states.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationShares {
    pub dividing: Vec<f64>,
    pub destiny: Vec<f64>,
}

/// Generation shares of a live stimulated cell at time `t`.
///
/// `q[g]` is the probability of still dividing out of generation `g`
/// (`g < max_div`).
pub fn generation_shares(f_div: &LifetimeCdf, q: &[f64], b: f64, t: f64, max_div: usize) -> GenerationShares {
    let n_gens = max_div + 1;

    let mut reached = vec![1.0; n_gens];
    let mut at_least = vec![0.0; n_gens + 1];
    at_least[0] = 1.0;
    for i in 1..n_gens {
        reached[i] = f_div.at(t - (i - 1) as f64 * b);
        at_least[i] = reached[i] * q[i - 1];
    }

    let mut dividing = vec![0.0; n_gens];
    let mut destiny = vec![0.0; n_gens];
    for g in 0..n_gens {
        let total = (at_least[g] - at_least[g + 1]).max(0.0);
        let dest = if g == max_div {
            total
        } else if g == 0 {
            1.0 - q[0]
        } else {
            reached[g] * (q[g - 1] - q[g])
        };
        let dest = dest.clamp(0.0, total);
        destiny[g] = dest;
        dividing[g] = total - dest;
    }

    GenerationShares { dividing, destiny }
}

impl Cyton15Model {
    pub fn new(init_cell: f64, max_div: usize, families: Cyton15Families) -> Self {
        Self {
            init_cell,
            max_div,
            families,
        }
    }

    pub fn simulate_params(&self, p: &Cyton15Params, grid: &TimeGrid) -> Result<GenerationProfile, AppError> {
        let fam = &self.families;
        let f_unstim = LifetimeCdf::new(fam.unstim_death, p.unstim_mu_death, p.unstim_sig_death)?;
        let f_div = LifetimeCdf::new(fam.stim_div, p.stim_mu_div, p.stim_sig_div)?;
        let f_die = LifetimeCdf::new(fam.stim_death, p.stim_mu_death, p.stim_sig_death)?;
        let f_dd = LifetimeCdf::new(fam.stim_destiny, p.stim_mu_dd, p.stim_sig_dd)?;

        let q: Vec<f64> = (0..self.max_div)
            .map(|g| 1.0 - f_dd.at(p.stim_mu_div + g as f64 * p.b))
            .collect();

        let n_gens = self.max_div + 1;
        let stim = self.init_cell * p.pf;
        let unstim = self.init_cell * (1.0 - p.pf);
        let mut profile = GenerationProfile::zeros(grid.times().to_vec(), n_gens);

        let mut prev: Option<(GenerationShares, f64)> = None;
        for (k, &t) in grid.times().iter().enumerate() {
            let shares = generation_shares(&f_div, &q, p.b, t, self.max_div);
            let die = f_die.at(t);

            for g in 0..n_gens {
                let scale = stim * 2f64.powi(g as i32);
                profile.live_dividing[(k, g)] = scale * (1.0 - die) * shares.dividing[g];
                profile.live_destiny[(k, g)] = scale * (1.0 - die) * shares.destiny[g];
                if let Some((prev_shares, prev_die)) = &prev {
                    let d_die = die - prev_die;
                    profile.dead_dividing[(k, g)] = profile.dead_dividing[(k - 1, g)]
                        + scale * d_die * 0.5 * (shares.dividing[g] + prev_shares.dividing[g]);
                    profile.dead_destiny[(k, g)] = profile.dead_destiny[(k - 1, g)]
                        + scale * d_die * 0.5 * (shares.destiny[g] + prev_shares.destiny[g]);
                }
            }

            let f_u = f_unstim.at(t);
            profile.unstim_live[k] = unstim * (1.0 - f_u);
            profile.unstim_dead[k] = unstim * f_u;

            prev = Some((shares, die));
        }

        profile.sanitize()?;
        Ok(profile)
    }
}

impl PopulationModel for Cyton15Model {
    fn kind(&self) -> ModelKind {
        ModelKind::Cyton15
    }

    fn max_div(&self) -> usize {
        self.max_div
    }

    fn simulate(&self, values: &[f64], grid: &TimeGrid) -> Result<GenerationProfile, AppError> {
        let p = Cyton15Params::from_values(values)?;
        self.simulate_params(&p, grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DEFAULT_HARVESTED_TIMES, ParameterSet};
    use crate::math::Family;

    fn default_params() -> Cyton15Params {
        Cyton15Params::from_values(&ParameterSet::defaults(ModelKind::Cyton15).values()).unwrap()
    }

    fn run(p: &Cyton15Params, max_div: usize) -> GenerationProfile {
        let grid = TimeGrid::new(120.0, 1.0).unwrap();
        Cyton15Model::new(10_000.0, max_div, Cyton15Families::default())
            .simulate_params(p, &grid)
            .unwrap()
    }

    #[test]
    fn ten_thousand_cell_scenario() {
        let prof = run(&default_params(), 3);
        assert!((prof.total_live(0) - 10_000.0).abs() < 1e-9);
        let (_, idx) = TimeGrid::for_harvested(&DEFAULT_HARVESTED_TIMES, 1.0).unwrap();
        let sparse = prof.select_rows(&idx).unwrap();
        for k in 0..sparse.n_times() {
            assert!(
                (sparse.cohort_total(k) - 10_000.0).abs() < 1e-6,
                "t={} cohort={}",
                sparse.times[k],
                sparse.cohort_total(k)
            );
        }
    }

    #[test]
    fn generations_wait_for_division_timing() {
        let p = default_params();
        let prof = run(&p, 6);
        for g in 1..prof.n_generations() {
            let horizon = (g as f64 - 1.0) * p.b;
            for (k, &t) in prof.times.iter().enumerate() {
                if t <= horizon {
                    assert_eq!(prof.live(k, g), 0.0, "g={g} t={t}");
                }
            }
        }
    }

    #[test]
    fn dead_counts_never_decrease() {
        let prof = run(&default_params(), 5);
        for g in 0..prof.n_generations() {
            for k in 1..prof.n_times() {
                assert!(prof.dead(k, g) >= prof.dead(k - 1, g));
            }
        }
    }

    #[test]
    fn progressor_fraction_boundaries() {
        let mut p = default_params();
        p.pf = 0.0;
        let none = run(&p, 4);
        for k in 0..none.n_times() {
            assert_eq!(none.live_dividing.row(k).sum(), 0.0);
            assert_eq!(none.live_destiny.row(k).sum(), 0.0);
        }
        assert_eq!(none.unstim_live[0], 10_000.0);

        p.pf = 1.0;
        let all = run(&p, 4);
        assert!(all.unstim_live.iter().all(|v| *v == 0.0));
        assert!(all.unstim_dead.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn shares_sum_to_one() {
        let f_div = LifetimeCdf::new(Family::Lognormal, 25.0, 0.2).unwrap();
        let q = vec![0.9, 0.6, 0.3];
        for t in [0.0, 20.0, 30.0, 60.0, 200.0] {
            let s = generation_shares(&f_div, &q, 10.0, t, 3);
            let total: f64 = s.dividing.iter().chain(&s.destiny).sum();
            assert!((total - 1.0).abs() < 1e-12, "t={t} total={total}");
            assert!(s.dividing[3] == 0.0);
        }
    }

    #[test]
    fn max_div_zero_is_all_destiny() {
        let prof = run(&default_params(), 0);
        assert_eq!(prof.n_generations(), 1);
        assert!(prof.live_dividing.iter().all(|v| *v == 0.0));
        assert!((prof.cohort_total(60) - 10_000.0).abs() < 1e-6);
    }
}
