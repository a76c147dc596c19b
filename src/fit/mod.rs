//! Fitting engine.
//!
//! Responsibilities:
//!
//! - flatten masked replicate data into residual terms (`residual`)
//! - expose the free parameters to the optimizers (`objective`)
//! - local and global optimizers behind one trait (`lm`, `de`)
//! - orchestrate one run with recovery and cancellation (`driver`)
//! - run a fit on a worker thread with streamed progress (`worker`)

pub mod de;
pub mod driver;
pub mod lm;
pub mod objective;
pub mod optimizer;
pub mod progress;
pub mod residual;
pub mod worker;

pub use de::*;
pub use driver::*;
pub use lm::*;
pub use objective::*;
pub use optimizer::*;
pub use progress::*;
pub use residual::*;
pub use worker::*;
