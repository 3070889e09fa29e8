// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskdock`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskdock",
    version,
    about = "Run development tasks as graphs of containers.",
    long_about = None
)]
pub struct CliArgs {
    /// Name of the task to run.
    pub task: String,

    /// Extra arguments appended to the main container's command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub task_args: Vec<String>,

    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "taskdock.toml")]
    pub config: String,

    /// Maximum number of steps to run at the same time.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub level_of_parallelism: usize,

    /// Leave containers and the task network behind after a failure instead
    /// of cleaning them up.
    #[arg(long)]
    pub no_cleanup_after_failure: bool,

    /// Do not convert Ctrl+C into a graceful cleanup.
    #[arg(long)]
    pub no_interrupt_handling: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKDOCK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Write structured JSON diagnostics to this file.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<String>,

    /// Parse + validate, print the container graph, but don't execute.
    #[arg(long)]
    pub dry_run: bool,
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

impl LogLevel {
    pub fn tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
