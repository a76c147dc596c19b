//! `cyton-fit` library crate.
//!
//! The binary (`cyton`) is a thin wrapper around this library so that:
//!
//! - the models and the fitting engine are testable without spawning processes
//! - simulation, fitting and bootstrapping can be driven from other front-ends

pub mod app;
pub mod bootstrap;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
