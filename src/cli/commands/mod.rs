//! Subcommands module for Rustible Events CLI
//!
//! Every command reads a captured stream incrementally through
//! [`EventStreamReader`], so a run can be piped in while it is still going.

pub mod decode;
pub mod summary;

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::callback::wire::{EventStreamReader, StreamItem};
use crate::cli::output::OutputFormatter;
use crate::cli::Cli;

/// Size of each read from the input stream.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Common context shared between commands
pub struct CommandContext {
    /// Output formatter
    pub output: OutputFormatter,
    /// Verbosity level
    pub verbosity: u8,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &Cli) -> Self {
        let json = matches!(&cli.command, crate::cli::Commands::Summary(args) if args.json);
        Self {
            output: OutputFormatter::new(!cli.no_color, json, cli.verbosity()),
            verbosity: cli.verbosity(),
        }
    }
}

/// Open `path`, or stdin when absent or `-`.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(path) if path != Path::new("-") => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(io::stdin())),
    }
}

/// Decode `input` and hand every stream item to `f` as soon as it is complete.
pub fn for_each_item<R, F>(mut input: R, mut f: F) -> Result<()>
where
    R: Read,
    F: FnMut(StreamItem) -> Result<()>,
{
    let mut reader = EventStreamReader::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read event stream"),
        };
        for item in reader.feed(&buf[..n])? {
            f(item)?;
        }
    }

    for item in reader.finish()? {
        f(item)?;
    }
    debug!(bytes = reader.position(), "event stream consumed");
    Ok(())
}
