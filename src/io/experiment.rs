//! Experiment JSON files.
//!
//! Schema:
//!
//! ```json
//! {
//!   "name": "condition A",
//!   "harvested_times": [0, 24, 48],
//!   "counts": [[[1000, 0]], [[600, 200], [620, 190]], [[300, 500]]],
//!   "mask": null
//! }
//! ```
//!
//! `mask` is optional; when present it has the shape of `counts`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Experiment, InclusionMask};
use crate::error::AppError;
use crate::io::{read_json, write_json};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentFile {
    #[serde(default)]
    pub name: String,
    pub harvested_times: Vec<f64>,
    pub counts: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub mask: Option<Vec<Vec<Vec<bool>>>>,
}

impl TryFrom<ExperimentFile> for Experiment {
    type Error = AppError;

    fn try_from(file: ExperimentFile) -> Result<Self, Self::Error> {
        let mask = match file.mask {
            Some(flags) => InclusionMask::from_flags(flags),
            None => InclusionMask::all_included(&file.counts),
        };
        Experiment::with_mask(file.name, file.harvested_times, file.counts, mask)
    }
}

impl From<&Experiment> for ExperimentFile {
    fn from(e: &Experiment) -> Self {
        Self {
            name: e.name.clone(),
            harvested_times: e.harvested_times.clone(),
            counts: e.counts.clone(),
            mask: Some(e.mask.flags().to_vec()),
        }
    }
}

pub fn read_experiment(path: &Path) -> Result<Experiment, AppError> {
    let file: ExperimentFile = read_json(path)?;
    Experiment::try_from(file)
}

pub fn write_experiment(path: &Path, experiment: &Experiment) -> Result<(), AppError> {
    write_json(path, &ExperimentFile::from(experiment))
}
