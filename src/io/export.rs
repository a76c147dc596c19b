//! JSON read/write for parameter sets, fit results and simulation tables.
//!
//! Exports are meant to be easy to reload (a fitted `ParameterSet` is a valid
//! `--params` input) and to consume from downstream scripts.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{FitResult, ParameterSet};
use crate::error::AppError;

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", path.display())))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let file = File::open(path).map_err(|e| AppError::io(format!("Failed to open '{}': {e}", path.display())))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| AppError::invalid(format!("Invalid JSON in '{}': {e}", path.display())))
}

/// Read and validate a parameter set.
pub fn read_params(path: &Path) -> Result<ParameterSet, AppError> {
    let params: ParameterSet = read_json(path)?;
    params.validate()?;
    Ok(params)
}

/// The parameter set a fit ended at (bounds and vary flags from `start`).
pub fn fitted_params(start: &ParameterSet, result: &FitResult) -> Result<ParameterSet, AppError> {
    if result.model != start.model {
        return Err(AppError::invalid("Fit result and parameter set belong to different models."));
    }
    start.with_values(&result.values)
}

/// Everything a `fit` export carries.
#[derive(Debug, Clone, Serialize)]
pub struct FitExport<'a> {
    pub result: &'a FitResult,
    pub fitted: &'a ParameterSet,
}
