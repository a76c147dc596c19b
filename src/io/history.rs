//! Per-model sum-of-squares history kept between CLI runs.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{FitHistory, ModelKind};
use crate::error::AppError;
use crate::io::{read_json, write_json};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFile {
    #[serde(default)]
    pub cyton1: FitHistory,
    #[serde(default)]
    pub cyton15: FitHistory,
}

impl HistoryFile {
    pub fn entry(&mut self, model: ModelKind) -> &mut FitHistory {
        match model {
            ModelKind::Cyton1 => &mut self.cyton1,
            ModelKind::Cyton15 => &mut self.cyton15,
        }
    }

    /// Flat view for logging.
    pub fn as_map(&self) -> BTreeMap<&'static str, FitHistory> {
        BTreeMap::from([
            (ModelKind::Cyton1.display_name(), self.cyton1),
            (ModelKind::Cyton15.display_name(), self.cyton15),
        ])
    }
}

/// A missing file is an empty history.
pub fn load_history(path: &Path) -> Result<HistoryFile, AppError> {
    if !path.exists() {
        return Ok(HistoryFile::default());
    }
    read_json(path)
}

pub fn save_history(path: &Path, history: &HistoryFile) -> Result<(), AppError> {
    write_json(path, history)
}
