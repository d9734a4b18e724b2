//! Command-line argument definitions using clap.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Provision the self-signed TLS identity for local HTTP/2 servers
///
/// Reuses `server.crt` / `server.key` when they already cover every
/// requested DNS name and IP address, and regenerates both otherwise.
#[derive(Parser, Debug)]
#[command(name = "certgen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: platform config dir)
    #[arg(short, long, env = "CERTGEN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reuse or regenerate the certificate and key
    Ensure(EnsureArgs),

    /// Show what is on disk without changing it
    Inspect(InspectArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),
}

// ============================================================================
// Ensure command
// ============================================================================

#[derive(Args, Debug, Default)]
pub struct EnsureArgs {
    /// Generate certs (if needed) and store them in this dir
    #[arg(long = "certdir", visible_alias = "cert-dir", value_name = "DIR")]
    pub cert_dir: Option<PathBuf>,

    /// Subject common name
    #[arg(long, value_name = "CN")]
    pub common_name: Option<String>,

    /// Extra DNS name for the certificate (repeatable)
    #[arg(long = "dns-name", value_name = "NAME")]
    pub dns_names: Vec<String>,

    /// Extra IP address for the certificate (repeatable)
    #[arg(long = "ip", value_name = "ADDR")]
    pub ip_addresses: Vec<IpAddr>,

    /// Lifetime of a newly generated certificate, in days (1-36500)
    #[arg(long, value_name = "DAYS", value_parser = clap::value_parser!(u32).range(1..=36500))]
    pub validity_days: Option<u32>,

    /// Regenerate even if the existing pair would do
    #[arg(long)]
    pub force: bool,
}

// ============================================================================
// Inspect command
// ============================================================================

#[derive(Args, Debug, Default)]
pub struct InspectArgs {
    /// Directory holding server.crt / server.key
    #[arg(long = "certdir", visible_alias = "cert-dir", value_name = "DIR")]
    pub cert_dir: Option<PathBuf>,
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,

    /// Show config file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repeated_san_flags_accumulate_in_order() {
        let cli = Cli::parse_from([
            "certgen",
            "ensure",
            "--dns-name",
            "b.local",
            "--ip",
            "127.0.0.1",
            "--dns-name",
            "a.local",
            "--ip",
            "::1",
        ]);
        let Commands::Ensure(args) = cli.command else {
            panic!("expected ensure");
        };
        assert_eq!(args.dns_names, vec!["b.local", "a.local"]);
        assert_eq!(
            args.ip_addresses,
            vec![
                "127.0.0.1".parse::<IpAddr>().unwrap(),
                "::1".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_bad_ip_is_rejected() {
        assert!(Cli::try_parse_from(["certgen", "ensure", "--ip", "localhost"]).is_err());
    }

    #[test]
    fn test_validity_days_is_bounded() {
        let cli = Cli::parse_from(["certgen", "ensure", "--validity-days", "30"]);
        let Commands::Ensure(args) = cli.command else {
            panic!("expected ensure");
        };
        assert_eq!(args.validity_days, Some(30));

        for days in ["0", "36501", "4000000"] {
            assert!(
                Cli::try_parse_from(["certgen", "ensure", "--validity-days", days]).is_err(),
                "{days} should be rejected"
            );
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["certgen", "inspect", "-vv", "-o", "json"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output, Some(OutputFormat::Json));
    }
}
