//! Case resampling of replicate rows.

use rand::Rng;

use crate::domain::{Experiment, InclusionMask};
use crate::error::AppError;

/// Draw, within every harvested time, as many replicates as observed, with
/// replacement. Each drawn replicate brings its own mask row.
pub fn resample_replicates<R: Rng + ?Sized>(experiment: &Experiment, rng: &mut R) -> Result<Experiment, AppError> {
    let mut counts = Vec::with_capacity(experiment.n_timepoints());
    let mut flags = Vec::with_capacity(experiment.n_timepoints());

    for (itpt, reps) in experiment.counts.iter().enumerate() {
        let n = reps.len();
        let mut c = Vec::with_capacity(n);
        let mut f = Vec::with_capacity(n);
        for _ in 0..n {
            let pick = rng.gen_range(0..n);
            c.push(reps[pick].clone());
            f.push(experiment.mask.flags()[itpt][pick].clone());
        }
        counts.push(c);
        flags.push(f);
    }

    Experiment::with_mask(
        experiment.name.clone(),
        experiment.harvested_times.clone(),
        counts,
        InclusionMask::from_flags(flags),
    )
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn rows_and_masks_travel_together() {
        let mut exp = Experiment::new(
            "e",
            vec![0.0, 10.0],
            vec![
                vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]],
                vec![vec![10.0, 1.0]],
            ],
        )
        .unwrap();
        exp.mask.set(0, 1, 1, false).unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let r = resample_replicates(&exp, &mut rng).unwrap();
            assert_eq!(r.n_replicates(0), 3);
            assert_eq!(r.counts[1], vec![vec![10.0, 1.0]]);
            for (irep, row) in r.counts[0].iter().enumerate() {
                let from_second = row[0] == 2.0;
                assert_eq!(r.mask.is_included(0, irep, 1), !from_second);
            }
        }
    }
}
