//! Differential evolution (`best1bin`) over the box of free parameters.
//!
//! - Latin-hypercube initial population of `popsize × n_free` members, with
//!   the caller's starting point as member 0
//! - dithered mutation factor drawn once per generation
//! - binomial crossover; out-of-bounds trial components are redrawn
//!   uniformly inside the bounds
//! - greedy replacement, then a convergence test on the spread of the
//!   population energies
//!
//! The best member can optionally be polished with the local algorithm.

use rand::prelude::*;
use rand::rngs::StdRng;
use tracing::{debug, warn};

use crate::domain::{GenerationDiagnostic, GlobalConfig, LocalConfig};
use crate::error::AppError;
use crate::fit::lm::LevenbergMarquardt;
use crate::fit::optimizer::{Optimizer, OptimizerOutcome, Problem, Termination};
use crate::math::{mean, population_std_dev};

const MIN_POPULATION: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct DifferentialEvolution {
    config: GlobalConfig,
}

impl DifferentialEvolution {
    pub fn new(config: GlobalConfig) -> Self {
        Self { config }
    }

    fn budget_spent(&self, problem: &dyn Problem) -> bool {
        self.config
            .max_nfev
            .is_some_and(|cap| problem.evaluations() >= cap)
    }
}

/// `n` points in the box, one per stratum along every axis.
pub fn latin_hypercube(n: usize, lower: &[f64], upper: &[f64], rng: &mut StdRng) -> Vec<Vec<f64>> {
    let dim = lower.len();
    let mut pop = vec![vec![0.0; dim]; n];
    for d in 0..dim {
        let mut strata: Vec<usize> = (0..n).collect();
        strata.shuffle(rng);
        for (i, s) in strata.into_iter().enumerate() {
            let u = (s as f64 + rng.r#gen::<f64>()) / n as f64;
            pop[i][d] = lower[d] + u * (upper[d] - lower[d]);
        }
    }
    pop
}

fn converged(energies: &[f64], tol: f64, atol: f64) -> bool {
    if energies.iter().any(|e| !e.is_finite()) {
        return false;
    }
    population_std_dev(energies) <= atol + tol * mean(energies).abs()
}

fn finite_spread(energies: &[f64]) -> f64 {
    let finite: Vec<f64> = energies.iter().copied().filter(|e| e.is_finite()).collect();
    population_std_dev(&finite)
}

impl Optimizer for DifferentialEvolution {
    fn name(&self) -> &'static str {
        "differential-evolution"
    }

    fn minimize(&self, problem: &mut dyn Problem, x0: &[f64]) -> Result<OptimizerOutcome, AppError> {
        let cfg = &self.config;
        let n = problem.dim();
        let lower = problem.lower().to_vec();
        let upper = problem.upper().to_vec();
        let np = (cfg.popsize * n).max(MIN_POPULATION);
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        let mut pop = latin_hypercube(np, &lower, &upper, &mut rng);
        pop[0] = x0.to_vec();

        let mut energies = Vec::with_capacity(np);
        for member in &pop {
            match problem.cost(member) {
                Some(c) => energies.push(c),
                None => {
                    let (x, cost) = best_so_far(&pop, &energies, x0);
                    return Ok(OptimizerOutcome {
                        x,
                        cost,
                        iterations: 0,
                        termination: Termination::Aborted,
                        generations: Vec::new(),
                    });
                }
            }
        }
        let mut best = argmin(&energies);
        if !energies[best].is_finite() {
            return Err(AppError::numeric("No member of the initial population gives valid residuals."));
        }

        let (mut_lo, mut_hi) = cfg.mutation;
        let mut diagnostics = Vec::new();
        let mut termination = Termination::MaxGenerations;
        let mut generation = 0;

        'evolve: while generation < cfg.max_generations {
            if self.budget_spent(problem) {
                termination = Termination::MaxEvaluations;
                break;
            }
            generation += 1;
            let f = if mut_hi > mut_lo { rng.gen_range(mut_lo..mut_hi) } else { mut_lo };

            for i in 0..np {
                let (r1, r2) = pick_two(np, i, &mut rng);
                let j_rand = rng.gen_range(0..n);
                let mut trial = pop[i].clone();
                for j in 0..n {
                    if j == j_rand || rng.r#gen::<f64>() < cfg.recombination {
                        trial[j] = pop[best][j] + f * (pop[r1][j] - pop[r2][j]);
                    }
                    if trial[j] < lower[j] || trial[j] > upper[j] {
                        trial[j] = lower[j] + rng.r#gen::<f64>() * (upper[j] - lower[j]);
                    }
                }

                let Some(e) = problem.cost(&trial) else {
                    termination = Termination::Aborted;
                    break 'evolve;
                };
                if e <= energies[i] {
                    pop[i] = trial;
                    energies[i] = e;
                    if e < energies[best] {
                        best = i;
                    }
                }
                if self.budget_spent(problem) {
                    termination = Termination::MaxEvaluations;
                    break 'evolve;
                }
            }

            let spread = finite_spread(&energies);
            debug!(generation, best = energies[best], spread, "differential evolution generation");
            diagnostics.push(GenerationDiagnostic {
                generation,
                best_cost: energies[best],
                energy_spread: spread,
                nfev: problem.evaluations(),
            });

            if converged(&energies, cfg.tol, cfg.atol) {
                termination = Termination::EnergySpread;
                break;
            }
        }

        let mut x = pop[best].clone();
        let mut cost = energies[best];

        if cfg.polish && termination != Termination::Aborted {
            let local = LocalConfig {
                max_nfev: cfg
                    .max_nfev
                    .map(|cap| cap.saturating_sub(problem.evaluations()).max(1))
                    .unwrap_or(LocalConfig::default().max_nfev),
                ..LocalConfig::default()
            };
            match LevenbergMarquardt::new(local).minimize(problem, &x) {
                Ok(polished) if polished.cost < cost => {
                    debug!(before = cost, after = polished.cost, "polish improved the best member");
                    x = polished.x;
                    cost = polished.cost;
                    if polished.termination == Termination::Aborted {
                        termination = Termination::Aborted;
                    }
                }
                Ok(_) => {}
                Err(err) => warn!("polish failed, keeping the best member: {err}"),
            }
        }

        Ok(OptimizerOutcome {
            x,
            cost,
            iterations: generation,
            termination,
            generations: diagnostics,
        })
    }
}

fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v < values[best] {
            best = i;
        }
    }
    best
}

fn best_so_far(pop: &[Vec<f64>], energies: &[f64], x0: &[f64]) -> (Vec<f64>, f64) {
    if energies.is_empty() {
        return (x0.to_vec(), f64::INFINITY);
    }
    let i = argmin(energies);
    (pop[i].clone(), energies[i])
}

/// Two distinct member indices, both different from `i`.
fn pick_two(np: usize, i: usize, rng: &mut StdRng) -> (usize, usize) {
    let mut r1 = rng.gen_range(0..np);
    while r1 == i {
        r1 = rng.gen_range(0..np);
    }
    let mut r2 = rng.gen_range(0..np);
    while r2 == i || r2 == r1 {
        r2 = rng.gen_range(0..np);
    }
    (r1, r2)
}
