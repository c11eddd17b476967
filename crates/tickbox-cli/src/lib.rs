#![forbid(unsafe_code)]

//! `tickbox`: drive a persisted task list from the command line.

pub mod cli;
pub mod error;
pub mod logging;

pub use cli::{Cli, Commands, execute, run, run_from_env};
pub use error::{CliError, Result};
