//! CLI module for Rustible Events
//!
//! Consumer-side tools for streams captured from a playbook run: decoding
//! framed event records back into JSON and summarizing a run.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rustible Events - inspect captured playbook event streams
#[derive(Parser, Debug, Clone)]
#[command(name = "rustible-events")]
#[command(author = "Rustible Contributors")]
#[command(version)]
#[command(about = "Decode and summarize captured playbook event streams", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print every event of a captured stream as one JSON line
    Decode(commands::decode::DecodeArgs),

    /// Count events per name and per host
    Summary(commands::summary::SummaryArgs),
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-4)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(4)
    }

    /// Input file of the selected command, `None` for stdin.
    pub fn input(&self) -> Option<&PathBuf> {
        match &self.command {
            Commands::Decode(args) => args.file.as_ref(),
            Commands::Summary(args) => args.file.as_ref(),
        }
    }
}
