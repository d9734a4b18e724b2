//! Command implementations.

pub mod config;
pub mod ensure;
pub mod inspect;

use std::path::PathBuf;

use crate::config::Config;
use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded configuration
    pub config: Config,

    /// `--config` as given, if any
    pub config_path: Option<PathBuf>,

    /// Output format
    pub output_format: OutputFormat,
}
