//! `certgen ensure` - reuse or regenerate the TLS identity.

use anyhow::{Context as _, Result};
use colored::Colorize;
use tls_identity::{CertStore, EnsuredIdentity, IdentityConfig, IdentityManager, IdentityRequest};
use tracing::debug;

use super::Context;
use crate::cli::args::EnsureArgs;
use crate::output::OutputFormat;

pub fn execute(ctx: &Context, args: EnsureArgs) -> Result<()> {
    let request = build_request(&ctx.config.identity, &args);

    let mut identity_config = ctx.config.identity.clone();
    if let Some(days) = args.validity_days {
        identity_config.validity_days = days;
    }
    let manager = IdentityManager::with_cert_store(
        CertStore::new().with_validity(identity_config.validity()),
    );

    debug!(
        dir = %request.directory.display(),
        dns_names = ?request.dns_names,
        ip_addresses = ?request.ip_addresses,
        validity_days = identity_config.validity_days,
        force = args.force,
        "ensuring TLS identity"
    );

    let identity = if args.force {
        manager.force_regenerate(&request)
    } else {
        manager.ensure(&request)
    }
    .with_context(|| format!("ensure TLS identity in {}", request.directory.display()))?;

    match ctx.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&to_json(&identity))?);
        }
        OutputFormat::Pretty => print_pretty(&identity),
    }

    Ok(())
}

/// Config values first, then flags. Repeated SAN flags extend the
/// configured lists in the order given.
pub fn build_request(config: &IdentityConfig, args: &EnsureArgs) -> IdentityRequest {
    let dir = args.cert_dir.as_ref().unwrap_or(&config.cert_dir);
    let common_name = args
        .common_name
        .as_deref()
        .unwrap_or(config.common_name.as_str());

    IdentityRequest::builder(dir)
        .common_name(common_name)
        .organization(&config.organization)
        .organizational_unit(&config.organizational_unit)
        .dns_names(config.dns_names.iter().cloned())
        .dns_names(args.dns_names.iter().cloned())
        .ip_addresses(config.ip_addresses.iter().copied())
        .ip_addresses(args.ip_addresses.iter().copied())
        .build()
}

fn to_json(identity: &EnsuredIdentity) -> serde_json::Value {
    let cert = &identity.certificate;
    serde_json::json!({
        "reused": identity.decision.is_reuse(),
        "reason": identity.decision.reason().map(ToString::to_string),
        "cert_path": identity.cert_path,
        "key_path": identity.key_path,
        "fingerprint": cert.fingerprint,
        "serial": cert.serial,
        "not_before": cert.not_before.to_rfc3339(),
        "not_after": cert.not_after.to_rfc3339(),
        "dns_names": cert.dns_names,
        "ip_addresses": cert.ip_addresses,
    })
}

fn print_pretty(identity: &EnsuredIdentity) {
    let cert = &identity.certificate;

    match identity.decision.reason() {
        None => println!("{} existing TLS identity", "Reused".green().bold()),
        Some(reason) => println!(
            "{} new TLS identity {}",
            "Generated".yellow().bold(),
            format!("({reason})").dimmed()
        ),
    }
    println!();
    println!("  {} {}", "certificate:".bold(), identity.cert_path.display());
    println!("  {} {}", "key:".bold(), identity.key_path.display());
    println!("  {} {}", "fingerprint:".bold(), cert.fingerprint.cyan());
    println!("  {} {}", "expires:".bold(), cert.not_after.to_rfc3339());
    if cert.is_expired() {
        println!("  {}", "certificate has expired".red().bold());
    }
    if !cert.dns_names.is_empty() {
        println!("  {} {}", "dns names:".bold(), cert.dns_names.join(", "));
    }
    if !cert.ip_addresses.is_empty() {
        let ips: Vec<String> = cert.ip_addresses.iter().map(ToString::to_string).collect();
        println!("  {} {}", "ip addresses:".bold(), ips.join(", "));
    }
}
