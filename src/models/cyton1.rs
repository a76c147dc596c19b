//! Cyton 1: competing division and death clocks per generation.
//!
//! Each cell entering a generation is either a progressor (it races a
//! division clock against a death clock) or a non-progressor (destiny: only
//! the death clock runs). Generation 0 uses the first-division/death
//! lifetimes, later generations the subsequent ones.
//!
//! The population is propagated as cohorts on the time grid: the cells that
//! enter generation `g` at grid time `t_j` are followed by age `m = k - j`.
//! Per age interval the progressor outflow is split into division and death
//! using trapezoid averages of the competing CDFs; this split conserves
//! probability exactly, so `Σ_g (live_g + dead_g) / 2^g` stays equal to the
//! initial cell count.

use crate::domain::{Cyton1Families, Cyton1Params, ModelKind};
use crate::error::AppError;
use crate::math::{LifetimeCdf, std_normal_cdf};
use crate::models::{GenerationProfile, PopulationModel, TimeGrid};

/// Age-indexed transition tables for one generation class.
#[derive(Debug, Clone)]
struct AgeKernel {
    /// Progressor still undivided and alive at age `m`.
    survival: Vec<f64>,
    /// Progressors dividing in the age interval ending at `m`.
    divided: Vec<f64>,
    /// Cumulative progressor deaths up to age `m`.
    progressor_dead: Vec<f64>,
    /// Death CDF; non-progressor cumulative deaths.
    death: Vec<f64>,
}

impl AgeKernel {
    fn new(div: &LifetimeCdf, death: &LifetimeCdf, dt: f64, n: usize) -> Self {
        let phi = div.tabulate(dt, n);
        let psi = death.tabulate(dt, n);

        let mut survival = Vec::with_capacity(n);
        let mut divided = vec![0.0; n];
        let mut progressor_dead = vec![0.0; n];
        for m in 0..n {
            survival.push((1.0 - phi[m]) * (1.0 - psi[m]));
            if m > 0 {
                let d_phi = phi[m] - phi[m - 1];
                let d_psi = psi[m] - psi[m - 1];
                divided[m] = d_phi * (1.0 - 0.5 * (psi[m] + psi[m - 1]));
                progressor_dead[m] = progressor_dead[m - 1] + d_psi * (1.0 - 0.5 * (phi[m] + phi[m - 1]));
            }
        }

        Self {
            survival,
            divided,
            progressor_dead,
            death: psi,
        }
    }
}

/// Fraction of cells entering generation `g` that will attempt to divide.
pub fn progressor_fraction(p: &Cyton1Params, g: usize, max_div: usize) -> f64 {
    if g >= max_div {
        return 0.0;
    }
    if g == 0 {
        return p.pf0;
    }
    let z = (g as f64 - p.pf_mu) / p.pf_sig;
    (p.pf0 + (1.0 - p.pf0) * std_normal_cdf(z)).clamp(0.0, 1.0)
}

/// Mechanical-death survival factor at absolute time `t`.
pub fn mechanical_survival(p: &Cyton1Params, t: f64) -> f64 {
    1.0 - p.md_prop * (1.0 - (-p.md_decay * t).exp())
}

#[derive(Debug, Clone)]
pub struct Cyton1Model {
    init_cell: f64,
    max_div: usize,
    families: Cyton1Families,
}

impl Cyton1Model {
    pub fn new(init_cell: f64, max_div: usize, families: Cyton1Families) -> Self {
        Self {
            init_cell,
            max_div,
            families,
        }
    }

    pub fn simulate_params(&self, p: &Cyton1Params, grid: &TimeGrid) -> Result<GenerationProfile, AppError> {
        let n = grid.len();
        let dt = grid.dt();
        let fam = &self.families;

        let first = AgeKernel::new(
            &LifetimeCdf::new(fam.first_div, p.mu0_div, p.sig0_div)?,
            &LifetimeCdf::new(fam.first_death, p.mu0_death, p.sig0_death)?,
            dt,
            n,
        );
        let sub = AgeKernel::new(
            &LifetimeCdf::new(fam.sub_div, p.mu_sub_div, p.sig_sub_div)?,
            &LifetimeCdf::new(fam.sub_death, p.mu_sub_death, p.sig_sub_death)?,
            dt,
            n,
        );
        let mech: Vec<f64> = grid.times().iter().map(|&t| mechanical_survival(p, t)).collect();

        let n_gens = self.max_div + 1;
        let mut profile = GenerationProfile::zeros(grid.times().to_vec(), n_gens);

        let mut entry = vec![0.0; n];
        entry[0] = self.init_cell;

        for g in 0..n_gens {
            let kernel = if g == 0 { &first } else { &sub };
            let pg = progressor_fraction(p, g, self.max_div);
            let can_divide = g < self.max_div;

            let mut live_div = vec![0.0; n];
            let mut live_dest = vec![0.0; n];
            let mut dead_div = vec![0.0; n];
            let mut dead_dest = vec![0.0; n];
            let mut next = vec![0.0; n];

            for (j, &e) in entry.iter().enumerate() {
                if e == 0.0 {
                    continue;
                }
                let prog = e * pg;
                let dest = e * (1.0 - pg);
                for k in j..n {
                    let m = k - j;
                    live_div[k] += prog * kernel.survival[m];
                    live_dest[k] += dest * (1.0 - kernel.death[m]);
                    dead_div[k] += prog * kernel.progressor_dead[m];
                    dead_dest[k] += dest * kernel.death[m];
                    if can_divide {
                        next[k] += 2.0 * prog * kernel.divided[m];
                    }
                }
            }

            // Mechanical death scales every state by M(t); the cells it removes
            // in a step are booked to the dead count of the state they left.
            let mut dd = 0.0;
            let mut ds = 0.0;
            for k in 0..n {
                if k > 0 {
                    let dm = mech[k - 1] - mech[k];
                    dd += (dead_div[k] - dead_div[k - 1]) * mech[k] + live_div[k - 1] * dm;
                    ds += (dead_dest[k] - dead_dest[k - 1]) * mech[k] + live_dest[k - 1] * dm;
                }
                profile.live_dividing[(k, g)] = live_div[k] * mech[k];
                profile.live_destiny[(k, g)] = live_dest[k] * mech[k];
                profile.dead_dividing[(k, g)] = dd;
                profile.dead_destiny[(k, g)] = ds;
            }

            entry = next;
        }

        profile.sanitize()?;
        Ok(profile)
    }
}

impl PopulationModel for Cyton1Model {
    fn kind(&self) -> ModelKind {
        ModelKind::Cyton1
    }

    fn max_div(&self) -> usize {
        self.max_div
    }

    fn simulate(&self, values: &[f64], grid: &TimeGrid) -> Result<GenerationProfile, AppError> {
        let p = Cyton1Params::from_values(values)?;
        self.simulate_params(&p, grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParameterSet;
    use crate::math::Family;

    fn default_params() -> Cyton1Params {
        Cyton1Params::from_values(&ParameterSet::defaults(ModelKind::Cyton1).values()).unwrap()
    }

    fn run(p: &Cyton1Params, max_div: usize) -> GenerationProfile {
        let grid = TimeGrid::new(120.0, 1.0).unwrap();
        Cyton1Model::new(10_000.0, max_div, Cyton1Families::default())
            .simulate_params(p, &grid)
            .unwrap()
    }

    #[test]
    fn starts_with_all_cells_in_generation_zero() {
        let prof = run(&default_params(), 10);
        assert_eq!(prof.total_live(0), 10_000.0);
        assert_eq!(prof.total_dead(0), 0.0);
    }

    #[test]
    fn cohort_total_is_conserved() {
        let mut p = default_params();
        p.pf0 = 0.6;
        p.md_prop = 0.3;
        p.md_decay = 0.05;
        let prof = run(&p, 10);
        for k in 0..prof.n_times() {
            let c = prof.cohort_total(k);
            assert!((c - 10_000.0).abs() < 1e-6, "t={} cohort={c}", prof.times[k]);
        }
    }

    #[test]
    fn generation_is_empty_before_its_index() {
        let prof = run(&default_params(), 10);
        for g in 1..prof.n_generations() {
            for k in 0..g.min(prof.n_times()) {
                assert_eq!(prof.live(k, g), 0.0);
                assert_eq!(prof.dead(k, g), 0.0);
            }
        }
    }

    #[test]
    fn dead_counts_never_decrease() {
        let mut p = default_params();
        p.md_prop = 0.5;
        let prof = run(&p, 6);
        for g in 0..prof.n_generations() {
            for k in 1..prof.n_times() {
                assert!(prof.dead(k, g) >= prof.dead(k - 1, g) - 1e-9);
            }
        }
    }

    #[test]
    fn progressor_fraction_rises_and_stops_at_max_div() {
        let mut p = default_params();
        p.pf0 = 0.2;
        let f: Vec<f64> = (0..=5).map(|g| progressor_fraction(&p, g, 5)).collect();
        assert_eq!(f[0], 0.2);
        assert!(f.windows(2).take(4).all(|w| w[1] >= w[0]));
        assert_eq!(f[5], 0.0);
    }

    #[test]
    fn max_div_zero_keeps_everyone_in_generation_zero() {
        let prof = run(&default_params(), 0);
        assert_eq!(prof.n_generations(), 1);
        let last = prof.n_times() - 1;
        assert!((prof.live(last, 0) + prof.dead(last, 0) - 10_000.0).abs() < 1e-6);
        assert_eq!(prof.live_dividing[(last, 0)], 0.0);
    }

    #[test]
    fn gaussian_families_conserve_too() {
        let grid = TimeGrid::new(60.0, 0.5).unwrap();
        let fams = Cyton1Families {
            first_div: Family::Gaussian,
            first_death: Family::Exponential,
            sub_div: Family::Gaussian,
            sub_death: Family::Lognormal,
        };
        let mut p = default_params();
        p.sig0_div = 8.0;
        p.sig_sub_div = 3.0;
        let prof = Cyton1Model::new(500.0, 8, fams).simulate_params(&p, &grid).unwrap();
        let last = prof.n_times() - 1;
        assert!((prof.cohort_total(last) - 500.0).abs() < 1e-8);
    }

    #[test]
    fn invalid_scale_is_rejected() {
        let mut v = ParameterSet::defaults(ModelKind::Cyton1).values();
        v[1] = 0.0;
        let grid = TimeGrid::new(10.0, 1.0).unwrap();
        let err = Cyton1Model::new(100.0, 3, Cyton1Families::default())
            .simulate(&v, &grid)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidConfig(_)));
    }
}
