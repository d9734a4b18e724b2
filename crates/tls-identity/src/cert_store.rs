//! Self-signed certificate generation, persistence and loading.
//!
//! Loading never fails hard. Whatever is on disk either parses as exactly
//! one well-formed `CERTIFICATE` block, or it is reported as
//! [`CertificateState::Invalid`] so the caller regenerates.

use chrono::{DateTime, TimeZone, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, Ia5String, IsCa,
    KeyUsagePurpose, SanType, SerialNumber,
};
use ring::rand::{SecureRandom, SystemRandom};
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use x509_parser::extensions::GeneralName;

use crate::error::IdentityError;
use crate::hash::fingerprint;
use crate::key_store::KeyMaterial;
use crate::persist::{write_atomic, CERT_FILE_MODE};
use crate::request::IdentityRequest;
use crate::Result;

/// PEM label of the certificate block.
pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Validity window applied to new certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    /// How far `not_before` is pushed into the past (clock skew)
    pub backdate: time::Duration,
    /// How far `not_after` lies after issuance
    pub lifetime: time::Duration,
}

impl Default for Validity {
    fn default() -> Self {
        Self {
            backdate: time::Duration::minutes(10),
            lifetime: time::Duration::days(365),
        }
    }
}

/// A freshly issued certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    pem: String,
    der: Vec<u8>,
    serial: u64,
}

impl Certificate {
    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub const fn serial(&self) -> u64 {
        self.serial
    }
}

/// What was found in a certificate file.
#[derive(Debug, Clone)]
pub enum CertificateState {
    /// Exactly one parseable certificate.
    Valid(LoadedCertificate),
    /// Anything else; treated as absent.
    Invalid(InvalidCertificate),
}

impl CertificateState {
    pub const fn as_valid(&self) -> Option<&LoadedCertificate> {
        match self {
            Self::Valid(cert) => Some(cert),
            Self::Invalid(_) => None,
        }
    }
}

/// Why a certificate file was not usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidCertificate {
    #[error("certificate file not found")]
    Missing,

    #[error("certificate file unreadable: {0}")]
    Unreadable(String),

    #[error("no PEM block: {0}")]
    NotPem(String),

    #[error("unexpected PEM block type {0:?}")]
    WrongBlockType(String),

    #[error("{0} trailing bytes after certificate block")]
    TrailingData(usize),

    #[error("malformed certificate: {0}")]
    Malformed(String),
}

/// The parts of an on-disk certificate the policy and reports care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedCertificate {
    /// DER encoding
    pub der: Vec<u8>,
    /// Subject distinguished name (human-readable)
    pub subject: String,
    /// Serial number (hex)
    pub serial: String,
    /// DNS-name SANs, in certificate order
    pub dns_names: Vec<String>,
    /// IP SANs, canonicalised
    pub ip_addresses: Vec<IpAddr>,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
    /// Subject public key bit string
    pub public_key: Vec<u8>,
    /// SHA-256 of the DER (hex)
    pub fingerprint: String,
}

impl LoadedCertificate {
    /// True once `not_after` has passed. Informational only: the reuse
    /// policy does not look at it.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.not_after
    }

    /// True if `key` is the key this certificate was issued for.
    pub fn matches_key(&self, key: &KeyMaterial) -> bool {
        self.public_key == key.public_key_raw()
    }
}

/// Issues, writes and reads the identity's certificate.
#[derive(Debug, Clone, Copy, Default)]
pub struct CertStore {
    validity: Validity,
}

impl CertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a non-default validity window for new certificates.
    #[must_use]
    pub const fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    pub const fn validity(&self) -> Validity {
        self.validity
    }

    /// Build the server-auth template for `identity` and self-sign it.
    pub fn generate(&self, key: &KeyMaterial, identity: &IdentityRequest) -> Result<Certificate> {
        let serial = random_serial()?;

        let mut params = CertificateParams::default();
        params.serial_number = Some(SerialNumber::from(serial));

        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, identity.organization.as_str());
        dn.push(
            DnType::OrganizationalUnitName,
            identity.organizational_unit.as_str(),
        );
        dn.push(DnType::CommonName, identity.common_name.as_str());
        params.distinguished_name = dn;

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now.checked_sub(self.validity.backdate).ok_or_else(|| {
            IdentityError::InvalidValidity(format!(
                "backdate of {} days reaches before year -9999",
                self.validity.backdate.whole_days()
            ))
        })?;
        params.not_after = now.checked_add(self.validity.lifetime).ok_or_else(|| {
            IdentityError::InvalidValidity(format!(
                "lifetime of {} days reaches past year 9999",
                self.validity.lifetime.whole_days()
            ))
        })?;

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        for name in &identity.dns_names {
            let ia5 = Ia5String::try_from(name.clone()).map_err(|e| {
                IdentityError::InvalidDnsName {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            params.subject_alt_names.push(SanType::DnsName(ia5));
        }
        for ip in &identity.ip_addresses {
            params.subject_alt_names.push(SanType::IpAddress(*ip));
        }

        let cert = params
            .self_signed(key.key_pair())
            .map_err(|e| IdentityError::Signing(e.to_string()))?;

        debug!(
            serial,
            common_name = %identity.common_name,
            dns_names = identity.dns_names.len(),
            ip_addresses = identity.ip_addresses.len(),
            "issued self-signed certificate"
        );

        Ok(Certificate {
            pem: cert.pem(),
            der: cert.der().to_vec(),
            serial,
        })
    }

    /// Write `cert` to `path` as PEM, world-readable and read-only.
    pub fn persist(&self, path: &Path, cert: &Certificate) -> Result<()> {
        write_atomic(path, cert.pem.as_bytes(), CERT_FILE_MODE)
    }

    /// Read `path` and classify its contents.
    pub fn load(&self, path: &Path) -> CertificateState {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CertificateState::Invalid(InvalidCertificate::Missing)
            }
            Err(e) => return CertificateState::Invalid(InvalidCertificate::Unreadable(e.to_string())),
        };

        match parse_certificate_pem(&content) {
            Ok(cert) => {
                debug!(path = %path.display(), fingerprint = %cert.fingerprint, "loaded certificate");
                CertificateState::Valid(cert)
            }
            Err(reason) => {
                debug!(path = %path.display(), %reason, "certificate file not usable");
                CertificateState::Invalid(reason)
            }
        }
    }
}

/// Parse a PEM file that must hold exactly one certificate and nothing after it.
pub fn parse_certificate_pem(
    content: &[u8],
) -> std::result::Result<LoadedCertificate, InvalidCertificate> {
    let (rest, pem) = x509_parser::pem::parse_x509_pem(content)
        .map_err(|e| InvalidCertificate::NotPem(e.to_string()))?;

    if pem.label != CERTIFICATE_LABEL {
        return Err(InvalidCertificate::WrongBlockType(pem.label));
    }
    if !rest.is_empty() {
        return Err(InvalidCertificate::TrailingData(rest.len()));
    }

    parse_certificate_der(&pem.contents)
}

/// Parse a DER certificate, rejecting trailing bytes.
pub fn parse_certificate_der(
    der: &[u8],
) -> std::result::Result<LoadedCertificate, InvalidCertificate> {
    let (rest, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| InvalidCertificate::Malformed(e.to_string()))?;
    if !rest.is_empty() {
        return Err(InvalidCertificate::TrailingData(rest.len()));
    }

    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();
    let san = cert
        .subject_alternative_name()
        .map_err(|e| InvalidCertificate::Malformed(e.to_string()))?;
    if let Some(san) = san {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push((*dns).to_string()),
                GeneralName::IPAddress(bytes) => match ip_from_bytes(bytes) {
                    Some(ip) => ip_addresses.push(ip),
                    None => {
                        return Err(InvalidCertificate::Malformed(format!(
                            "IP SAN with {} bytes",
                            bytes.len()
                        )))
                    }
                },
                _ => {}
            }
        }
    }

    Ok(LoadedCertificate {
        der: der.to_vec(),
        subject: cert.subject().to_string(),
        serial: cert.raw_serial_as_string(),
        dns_names,
        ip_addresses,
        not_before: asn1_to_utc(cert.validity().not_before),
        not_after: asn1_to_utc(cert.validity().not_after),
        public_key: cert.public_key().subject_public_key.data.to_vec(),
        fingerprint: fingerprint(der),
    })
}

/// Draw a serial uniformly from `[0, 2^63)`.
fn random_serial() -> Result<u64> {
    let mut buf = [0u8; 8];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| IdentityError::SerialGeneration("system random source failed".into()))?;
    Ok(u64::from_be_bytes(buf) >> 1)
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    let ip = match bytes.len() {
        4 => IpAddr::from(<[u8; 4]>::try_from(bytes).ok()?),
        16 => IpAddr::from(<[u8; 16]>::try_from(bytes).ok()?),
        _ => return None,
    };
    Some(ip.to_canonical())
}

fn asn1_to_utc(t: x509_parser::time::ASN1Time) -> DateTime<Utc> {
    Utc.timestamp_opt(t.timestamp(), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_store::KeyStore;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use tempfile::TempDir;

    fn request() -> IdentityRequest {
        IdentityRequest::builder("unused")
            .dns_name("extra.local")
            .ip_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .ip_address(IpAddr::V6(Ipv6Addr::LOCALHOST))
            .build()
    }

    fn issue(store: &CertStore) -> (KeyMaterial, Certificate) {
        let key = KeyStore.generate().unwrap();
        let cert = store.generate(&key, &request()).unwrap();
        (key, cert)
    }

    #[test]
    fn test_generate_template() {
        let (key, cert) = issue(&CertStore::new());
        assert!(cert.serial() < 1 << 63);

        let parsed = parse_certificate_der(cert.der()).unwrap();
        assert_eq!(parsed.dns_names, vec!["extra.local"]);
        assert_eq!(
            parsed.ip_addresses,
            vec![
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(Ipv6Addr::LOCALHOST)
            ]
        );
        assert!(parsed.subject.contains("CN=localhost"));
        assert!(parsed.subject.contains("O=Spraints"));
        assert!(parsed.subject.contains("OU=Exp"));
        assert!(parsed.matches_key(&key));
        assert!(!parsed.is_expired());

        let now = Utc::now();
        assert!(parsed.not_before < now - chrono::Duration::minutes(9));
        assert!(parsed.not_after > now + chrono::Duration::days(364));
    }

    #[test]
    fn test_generate_usages() {
        let (_, cert) = issue(&CertStore::new());
        let (_, x509) = x509_parser::parse_x509_certificate(cert.der()).unwrap();

        let ku = x509.key_usage().unwrap().unwrap();
        assert!(ku.value.digital_signature());
        assert!(!ku.value.key_cert_sign());

        let eku = x509.extended_key_usage().unwrap().unwrap();
        assert!(eku.value.server_auth);
        assert_eq!(x509.subject().to_string(), x509.issuer().to_string());
    }

    #[test]
    fn test_generate_rejects_non_ascii_dns_name() {
        let key = KeyStore.generate().unwrap();
        let req = IdentityRequest::builder("unused").dns_name("bücher.local").build();

        let err = CertStore::new().generate(&key, &req).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidDnsName { .. }));
    }

    #[test]
    fn test_persist_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.crt");
        let store = CertStore::new();
        let (key, cert) = issue(&store);

        store.persist(&path, &cert).unwrap();
        let state = store.load(&path);
        let loaded = state.as_valid().expect("certificate should load");
        assert_eq!(loaded.der, cert.der());
        assert!(loaded.matches_key(&key));
    }

    #[test]
    fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        let state = CertStore::new().load(&dir.path().join("server.crt"));
        assert!(matches!(
            state,
            CertificateState::Invalid(InvalidCertificate::Missing)
        ));
    }

    #[test]
    fn test_load_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.crt");
        std::fs::write(&path, b"").unwrap();

        assert!(matches!(
            CertStore::new().load(&path),
            CertificateState::Invalid(InvalidCertificate::NotPem(_))
        ));
    }

    #[test]
    fn test_trailing_garbage_is_invalid() {
        let (_, cert) = issue(&CertStore::new());
        let mut content = cert.pem().as_bytes().to_vec();
        content.extend_from_slice(b"garbage");

        assert_eq!(
            parse_certificate_pem(&content).unwrap_err(),
            InvalidCertificate::TrailingData(7)
        );
    }

    #[test]
    fn test_two_blocks_are_invalid() {
        let store = CertStore::new();
        let (_, first) = issue(&store);
        let (_, second) = issue(&store);
        let content = format!("{}{}", first.pem(), second.pem());

        assert!(matches!(
            parse_certificate_pem(content.as_bytes()),
            Err(InvalidCertificate::TrailingData(_))
        ));
    }

    #[test]
    fn test_wrong_block_type_is_invalid() {
        let key = KeyStore.generate().unwrap();
        assert_eq!(
            parse_certificate_pem(key.to_pem().as_bytes()).unwrap_err(),
            InvalidCertificate::WrongBlockType("PRIVATE KEY".into())
        );
    }

    #[test]
    fn test_bad_der_is_invalid() {
        let content = "-----BEGIN CERTIFICATE-----\naGVsbG8gd29ybGQ=\n-----END CERTIFICATE-----\n";
        assert!(matches!(
            parse_certificate_pem(content.as_bytes()),
            Err(InvalidCertificate::Malformed(_))
        ));
    }

    #[test]
    fn test_ipv4_mapped_is_canonicalised() {
        let mapped = Ipv4Addr::LOCALHOST.to_ipv6_mapped().octets();
        assert_eq!(
            ip_from_bytes(&mapped),
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
        );
        assert_eq!(ip_from_bytes(&[1, 2, 3]), None);
    }

    #[test]
    fn test_custom_validity_can_produce_expired_cert() {
        let store = CertStore::new().with_validity(Validity {
            backdate: time::Duration::days(2),
            lifetime: time::Duration::days(-1),
        });
        let (_, cert) = issue(&store);

        let parsed = parse_certificate_der(cert.der()).unwrap();
        assert!(parsed.is_expired());
    }

    #[test]
    fn test_lifetime_past_year_9999_is_an_error() {
        let store = CertStore::new().with_validity(Validity {
            backdate: time::Duration::minutes(10),
            lifetime: time::Duration::days(4_000_000),
        });
        let key = KeyStore.generate().unwrap();

        let err = store.generate(&key, &request()).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidValidity(_)));
        assert!(err.to_string().contains("4000000 days"));
    }

    #[test]
    fn test_backdate_out_of_range_is_an_error() {
        let store = CertStore::new().with_validity(Validity {
            backdate: time::Duration::days(4_000_000),
            lifetime: time::Duration::days(1),
        });
        let key = KeyStore.generate().unwrap();

        assert!(matches!(
            store.generate(&key, &request()),
            Err(IdentityError::InvalidValidity(_))
        ));
    }
}
