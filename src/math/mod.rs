//! Mathematical utilities: lifetime distributions, least-squares kernels and
//! descriptive statistics.

pub mod dist;
pub mod ols;
pub mod stats;

pub use dist::*;
pub use ols::*;
pub use stats::*;
