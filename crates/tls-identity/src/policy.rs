//! Reuse-or-regenerate decision.
//!
//! The check is asymmetric containment: every requested SAN must be in the
//! existing certificate, but the certificate may carry more. The validity
//! window is not consulted: an expired certificate that covers the request
//! is still reused.

use std::fmt;
use std::net::IpAddr;

use crate::cert_store::{CertificateState, InvalidCertificate, LoadedCertificate};
use crate::request::IdentityRequest;

/// Outcome of [`decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Existing files satisfy the request.
    Reuse,
    /// A new key and certificate must be written.
    Regenerate(RegenerateReason),
}

impl Decision {
    pub const fn is_reuse(&self) -> bool {
        matches!(self, Self::Reuse)
    }

    /// The reason, if the decision was to regenerate.
    pub const fn reason(&self) -> Option<&RegenerateReason> {
        match self {
            Self::Reuse => None,
            Self::Regenerate(reason) => Some(reason),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reuse => f.write_str("reuse"),
            Self::Regenerate(reason) => write!(f, "regenerate ({reason})"),
        }
    }
}

/// Why the existing pair cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegenerateReason {
    /// No loadable key file.
    KeyMissing,
    /// Certificate file absent or unusable.
    CertificateInvalid(InvalidCertificate),
    /// A requested DNS name is not in the certificate.
    MissingDnsName(String),
    /// A requested IP address is not in the certificate.
    MissingIpAddress(IpAddr),
    /// The caller asked for regeneration unconditionally.
    Forced,
}

impl fmt::Display for RegenerateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyMissing => f.write_str("key file missing or unreadable"),
            Self::CertificateInvalid(why) => write!(f, "{why}"),
            Self::MissingDnsName(name) => write!(f, "certificate lacks DNS name {name}"),
            Self::MissingIpAddress(ip) => write!(f, "certificate lacks IP address {ip}"),
            Self::Forced => f.write_str("forced"),
        }
    }
}

/// Decide whether the on-disk pair can serve `requested`.
pub fn decide(
    existing: &CertificateState,
    key_present: bool,
    requested: &IdentityRequest,
) -> Decision {
    if !key_present {
        return Decision::Regenerate(RegenerateReason::KeyMissing);
    }

    let cert = match existing {
        CertificateState::Valid(cert) => cert,
        CertificateState::Invalid(why) => {
            return Decision::Regenerate(RegenerateReason::CertificateInvalid(why.clone()))
        }
    };

    match first_missing(cert, requested) {
        Some(reason) => Decision::Regenerate(reason),
        None => Decision::Reuse,
    }
}

fn first_missing(cert: &LoadedCertificate, requested: &IdentityRequest) -> Option<RegenerateReason> {
    if let Some(name) = requested
        .dns_names
        .iter()
        .find(|name| !cert.dns_names.contains(*name))
    {
        return Some(RegenerateReason::MissingDnsName(name.clone()));
    }

    requested
        .ip_addresses
        .iter()
        .find(|ip| !cert.ip_addresses.contains(&ip.to_canonical()))
        .map(|ip| RegenerateReason::MissingIpAddress(*ip))
}
