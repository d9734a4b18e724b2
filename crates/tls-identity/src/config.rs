//! File configuration for the identity subsystem.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::cert_store::Validity;
use crate::request::{
    IdentityRequest, DEFAULT_COMMON_NAME, DEFAULT_ORGANIZATION, DEFAULT_ORGANIZATIONAL_UNIT,
};

/// Identity settings, usually read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Where `server.crt` / `server.key` live (default: `certs`).
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,

    /// Subject common name (default: `localhost`).
    #[serde(default = "default_common_name")]
    pub common_name: String,

    #[serde(default = "default_organization")]
    pub organization: String,

    #[serde(default = "default_organizational_unit")]
    pub organizational_unit: String,

    /// Extra DNS SANs.
    #[serde(default)]
    pub dns_names: Vec<String>,

    /// Extra IP SANs (default: `127.0.0.1`).
    #[serde(default = "default_ip_addresses")]
    pub ip_addresses: Vec<IpAddr>,

    /// Lifetime of new certificates in days.
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,

    /// How far `not_before` is backdated, in minutes.
    #[serde(default = "default_backdate_minutes")]
    pub backdate_minutes: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cert_dir: default_cert_dir(),
            common_name: default_common_name(),
            organization: default_organization(),
            organizational_unit: default_organizational_unit(),
            dns_names: Vec::new(),
            ip_addresses: default_ip_addresses(),
            validity_days: default_validity_days(),
            backdate_minutes: default_backdate_minutes(),
        }
    }
}

impl IdentityConfig {
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::IdentityError::Config(e.to_string()))
    }

    /// The request this config describes.
    pub fn request(&self) -> IdentityRequest {
        IdentityRequest::builder(&self.cert_dir)
            .common_name(&self.common_name)
            .organization(&self.organization)
            .organizational_unit(&self.organizational_unit)
            .dns_names(self.dns_names.iter().cloned())
            .ip_addresses(self.ip_addresses.iter().copied())
            .build()
    }

    pub fn validity(&self) -> Validity {
        Validity {
            backdate: time::Duration::minutes(i64::from(self.backdate_minutes)),
            lifetime: time::Duration::days(i64::from(self.validity_days)),
        }
    }
}

// Default value functions for serde.
fn default_cert_dir() -> PathBuf {
    PathBuf::from("certs")
}

fn default_common_name() -> String {
    String::from(DEFAULT_COMMON_NAME)
}

fn default_organization() -> String {
    String::from(DEFAULT_ORGANIZATION)
}

fn default_organizational_unit() -> String {
    String::from(DEFAULT_ORGANIZATIONAL_UNIT)
}

fn default_ip_addresses() -> Vec<IpAddr> {
    vec![IpAddr::from([127, 0, 0, 1])]
}

const fn default_validity_days() -> u32 {
    365
}

const fn default_backdate_minutes() -> u32 {
    10
}
