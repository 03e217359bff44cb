//! finmodel command-line application
//!
//! Loads a YAML model into an in-memory assumption store, submits one job to the
//! orchestrator, polls it to completion and prints the output as JSON.

pub mod cli;
pub mod data;
mod logging;
pub mod run;

pub use logging::init_logging;
