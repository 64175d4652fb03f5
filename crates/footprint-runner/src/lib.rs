//! # footprint-runner
//!
//! Command-line front end of the footprint pipeline: YAML configuration,
//! logging setup and the `extract`, `merge` and `status` commands behind the
//! `footprint` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;

pub use cli::{Cli, Command};
pub use commands::{extract, merge, run, state_label, status, ClipTarget};
pub use config::{Config, PostprocessSection};
pub use error::{Result, RunnerError};
pub use logging::init_logging;
