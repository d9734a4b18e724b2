//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use tracing::debug;

use crate::config::Config;
use crate::output::OutputFormat;

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    crate::logging::init(cli.verbose, cli.no_color);

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;

    // Determine output format
    let output_format = cli
        .output
        .or(config.output_format)
        .unwrap_or(OutputFormat::Pretty);
    debug!(
        config = ?cli.config,
        output = ?output_format,
        cert_dir = %config.identity.cert_dir.display(),
        "configuration loaded"
    );

    // Create context for commands
    let ctx = commands::Context {
        config,
        config_path: cli.config,
        output_format,
    };

    // Dispatch to appropriate command
    match cli.command {
        Commands::Ensure(args) => commands::ensure::execute(&ctx, args),
        Commands::Inspect(args) => commands::inspect::execute(&ctx, args),
        Commands::Config(args) => commands::config::execute(&ctx, args),
    }
}
