//! Input/output helpers.
//!
//! - experiment JSON read/write (`experiment`)
//! - parameter and result exports (`export`)
//! - sum-of-squares history between runs (`history`)

pub mod experiment;
pub mod export;
pub mod history;

pub use experiment::*;
pub use export::*;
pub use history::*;
