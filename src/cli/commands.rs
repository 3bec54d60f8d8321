//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// slbctl - Declarative load balancer reconciliation and orphan sweeping.
#[derive(Parser, Debug)]
#[command(name = "slbctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "SLBCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Run against an in-process control plane instead of the remote one.
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Delete orphaned load balancers left behind by test runs.
    Sweep {
        /// Region to sweep (defaults to the configured regions).
        #[arg(short, long)]
        region: Option<String>,

        /// Classify and report without deleting.
        #[arg(long)]
        dry_run: bool,
    },

    /// List registered sweepers in execution order.
    Sweepers,

    /// Converge a load balancer to a declared-state file.
    Apply {
        /// Declared-state YAML file.
        file: PathBuf,

        /// Identifier of the existing load balancer, if any.
        #[arg(long)]
        id: Option<String>,
    },

    /// Show the live attributes of a load balancer.
    Show {
        /// Load balancer identifier.
        id: String,
    },

    /// Delete a load balancer.
    Destroy {
        /// Load balancer identifier.
        id: String,

        /// Switch delete protection off first.
        #[arg(short, long)]
        force: bool,
    },

    /// Run a verification scenario.
    Scenario {
        /// Scenario YAML file.
        file: PathBuf,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
