//! Rustible Events - inspect captured playbook event streams
//!
//! This is the main entry point for the `rustible-events` CLI.

use rustible_events::cli::commands::CommandContext;
use rustible_events::cli::{Cli, Commands};
use rustible_events::error::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application authors
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

fn main() {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Display version if verbose
    if cli.verbosity() >= 2 {
        eprintln!(
            "rustible-events v{} by {}",
            rustible_events::version(),
            AUTHORS
        );
    }

    let mut ctx = CommandContext::new(&cli);

    let result = match &cli.command {
        Commands::Decode(args) => args.execute(&mut ctx),
        Commands::Summary(args) => args.execute(&mut ctx),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            ctx.output.error(&format!("{:#}", e));
            tracing::debug!(error = ?e, "command failed");
            e.downcast_ref::<Error>().map_or(1, Error::exit_code)
        }
    };

    std::process::exit(exit_code);
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity >= 3),
        )
        .with(env_filter)
        .init();
}
