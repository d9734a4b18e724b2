//! `certgen inspect` - report on the identity directory.

use anyhow::Result;
use colored::Colorize;
use tls_identity::{CertificateState, IdentityManager, IdentityStatus};
use tracing::debug;

use super::Context;
use crate::cli::args::InspectArgs;
use crate::output::OutputFormat;

pub fn execute(ctx: &Context, args: InspectArgs) -> Result<()> {
    let dir = args
        .cert_dir
        .unwrap_or_else(|| ctx.config.identity.cert_dir.clone());
    debug!(dir = %dir.display(), "inspecting TLS identity");
    let status = IdentityManager::new().inspect(&dir);

    match ctx.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&to_json(&status))?);
        }
        OutputFormat::Pretty => print_pretty(&status),
    }

    Ok(())
}

fn to_json(status: &IdentityStatus) -> serde_json::Value {
    let certificate = match &status.certificate {
        CertificateState::Valid(cert) => serde_json::json!({
            "valid": true,
            "subject": cert.subject,
            "serial": cert.serial,
            "fingerprint": cert.fingerprint,
            "not_before": cert.not_before.to_rfc3339(),
            "not_after": cert.not_after.to_rfc3339(),
            "expired": cert.is_expired(),
            "dns_names": cert.dns_names,
            "ip_addresses": cert.ip_addresses,
        }),
        CertificateState::Invalid(why) => serde_json::json!({
            "valid": false,
            "reason": why.to_string(),
        }),
    };

    serde_json::json!({
        "cert_path": status.cert_path,
        "key_path": status.key_path,
        "key_present": status.key_present(),
        "key_error": status.key_error,
        "key_matches": status.key_matches,
        "certificate": certificate,
    })
}

fn print_pretty(status: &IdentityStatus) {
    println!("{}", "TLS identity:".bold());
    println!();

    let key = match &status.key_error {
        None => "present".green().to_string(),
        Some(e) => format!("{} ({e})", "missing".red()),
    };
    println!("  {} {} [{}]", "key:".bold(), status.key_path.display(), key);

    match &status.certificate {
        CertificateState::Valid(cert) => {
            println!(
                "  {} {} [{}]",
                "certificate:".bold(),
                status.cert_path.display(),
                "valid".green()
            );
            println!("  {} {}", "subject:".bold(), cert.subject);
            println!("  {} {}", "serial:".bold(), cert.serial);
            println!("  {} {}", "fingerprint:".bold(), cert.fingerprint.cyan());
            let expires = cert.not_after.to_rfc3339();
            if cert.is_expired() {
                println!("  {} {} {}", "expires:".bold(), expires, "(expired)".red().bold());
            } else {
                println!("  {} {}", "expires:".bold(), expires);
            }
            println!("  {} {}", "dns names:".bold(), or_none(&cert.dns_names));
            let ips: Vec<String> = cert.ip_addresses.iter().map(ToString::to_string).collect();
            println!("  {} {}", "ip addresses:".bold(), or_none(&ips));
        }
        CertificateState::Invalid(why) => {
            println!(
                "  {} {} [{}]",
                "certificate:".bold(),
                status.cert_path.display(),
                format!("invalid: {why}").red()
            );
        }
    }

    match status.key_matches {
        Some(true) => println!("  {} {}", "key pair:".bold(), "matches".green()),
        Some(false) => println!(
            "  {} {}",
            "key pair:".bold(),
            "MISMATCH - run `certgen ensure --force`".red().bold()
        ),
        None => {}
    }
}

fn or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".dimmed().to_string()
    } else {
        items.join(", ")
    }
}
