//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - model and algorithm selections (`ModelKind`, `AlgorithmConfig`, `FitTarget`)
//! - named, bounded parameter vectors (`ParameterSet`, typed views per model)
//! - observed replicate counts with their inclusion mask (`Experiment`)
//! - fit outputs (`FitResult`, `FitStatus`, `FitHistory`)

pub mod experiment;
pub mod params;
pub mod types;

pub use experiment::*;
pub use params::*;
pub use types::*;
