//! The caller's desired certificate shape.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Common name used when the caller does not set one.
pub const DEFAULT_COMMON_NAME: &str = "localhost";
/// Subject organization.
pub const DEFAULT_ORGANIZATION: &str = "Spraints";
/// Subject organizational unit.
pub const DEFAULT_ORGANIZATIONAL_UNIT: &str = "Exp";

/// An identity the caller wants served from `directory`.
///
/// DNS names and IP addresses keep their insertion order and may contain
/// duplicates; the policy treats them as sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRequest {
    /// Directory holding `server.crt` / `server.key`
    pub directory: PathBuf,
    /// Subject common name
    pub common_name: String,
    /// Subject organization
    pub organization: String,
    /// Subject organizational unit
    pub organizational_unit: String,
    /// DNS-name SANs
    pub dns_names: Vec<String>,
    /// IP-address SANs
    pub ip_addresses: Vec<IpAddr>,
}

impl IdentityRequest {
    /// Start building a request for `directory`.
    pub fn builder(directory: impl AsRef<Path>) -> IdentityRequestBuilder {
        IdentityRequestBuilder::new(directory)
    }

    /// Path of the certificate file inside the request directory.
    pub fn cert_path(&self) -> PathBuf {
        crate::cert_path(&self.directory)
    }

    /// Path of the key file inside the request directory.
    pub fn key_path(&self) -> PathBuf {
        crate::key_path(&self.directory)
    }
}

/// Accumulates SANs in order; nothing is shared outside the builder.
#[derive(Debug, Clone)]
pub struct IdentityRequestBuilder {
    request: IdentityRequest,
}

impl IdentityRequestBuilder {
    fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            request: IdentityRequest {
                directory: directory.as_ref().to_path_buf(),
                common_name: DEFAULT_COMMON_NAME.to_string(),
                organization: DEFAULT_ORGANIZATION.to_string(),
                organizational_unit: DEFAULT_ORGANIZATIONAL_UNIT.to_string(),
                dns_names: Vec::new(),
                ip_addresses: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn common_name(mut self, name: impl Into<String>) -> Self {
        self.request.common_name = name.into();
        self
    }

    #[must_use]
    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.request.organization = org.into();
        self
    }

    #[must_use]
    pub fn organizational_unit(mut self, unit: impl Into<String>) -> Self {
        self.request.organizational_unit = unit.into();
        self
    }

    /// Append one DNS SAN.
    #[must_use]
    pub fn dns_name(mut self, name: impl Into<String>) -> Self {
        self.request.dns_names.push(name.into());
        self
    }

    /// Append several DNS SANs, keeping their order.
    #[must_use]
    pub fn dns_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.dns_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Append one IP SAN.
    #[must_use]
    pub fn ip_address(mut self, ip: IpAddr) -> Self {
        self.request.ip_addresses.push(ip);
        self
    }

    /// Append several IP SANs, keeping their order.
    #[must_use]
    pub fn ip_addresses<I>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        self.request.ip_addresses.extend(ips);
        self
    }

    pub fn build(self) -> IdentityRequest {
        self.request
    }
}
