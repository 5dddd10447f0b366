// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::{DependencyPolicyKind, IssuePolicyKind};

/// Command-line arguments for `streamdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "streamdag",
    version,
    about = "Replay an accelerator workload through the dependency scheduler.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workload file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Workload.toml")]
    pub workload: PathBuf,

    /// Override `[config].dependency_policy`.
    #[arg(long, value_enum, value_name = "POLICY")]
    pub dependency_policy: Option<DependencyPolicyKind>,

    /// Override `[config].issue_policy`.
    #[arg(long, value_enum, value_name = "POLICY")]
    pub issue_policy: Option<IssuePolicyKind>,

    /// Write the resulting DAG in Graphviz DOT format to this file.
    #[arg(long, value_name = "PATH")]
    pub dot: Option<PathBuf>,

    /// Parse + validate, print the workload, but don't schedule anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STREAMDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
