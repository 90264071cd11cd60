use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "qcflow",
    version,
    about = "Build, submit and track quantum chemistry jobs.",
    long_about = None
)]
pub struct Cli {
    /// Path to the config file (YAML).
    ///
    /// Default: `$QCFLOW_CONFIG`, then `qcflow.yaml` in the current directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level, `QCFLOW_LOG` or `info` when omitted.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Report what a working directory contains
    Read {
        workdir: PathBuf,

        /// Print only the status name
        #[arg(short = 's', long, conflicts_with = "print")]
        status: bool,

        /// Print the whole reading as YAML
        #[arg(short = 'p', long)]
        print: bool,

        /// Dotted keys of the reading to print, e.g. `status.code`
        keys: Vec<String>,
    },
    /// Run every job of a manifest
    Run {
        manifest: PathBuf,

        /// Build the job files without running or submitting anything
        #[arg(long)]
        test_mode: bool,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> Cli {
    Cli::parse()
}
