//! CLI module for `slbctl`.
//!
//! This module provides the command-line interface for reconciling,
//! sweeping and verifying load balancers.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
