//! `certgen config` - CLI configuration.

use anyhow::Result;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};
use crate::config::Config;
use crate::output::OutputFormat;

pub fn execute(ctx: &Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(ctx),
        ConfigCommands::Path => show_path(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    match ctx.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ctx.config)?),
        OutputFormat::Pretty => print!("{}", toml::to_string_pretty(&ctx.config)?),
    }
    Ok(())
}

fn show_path(ctx: &Context) -> Result<()> {
    let path = match &ctx.config_path {
        Some(path) => path.clone(),
        None => Config::path()?,
    };
    println!("{}", path.display());
    Ok(())
}
