//! # tls-identity
//!
//! Self-signed TLS identity lifecycle for local HTTP/2 test servers.
//!
//! A directory holds one certificate/key pair. On startup the caller asks
//! for an identity (common name, DNS SANs, IP SANs); the pair on disk is
//! reused when it already covers every requested SAN, and replaced as a
//! whole otherwise.
//!
//! ## Components
//!
//! ```text
//! IdentityManager::ensure(request)
//!   ├── KeyStore::load        key present?
//!   ├── CertStore::load       exactly one CERTIFICATE block, no trailing bytes?
//!   ├── policy::decide        requested SANs ⊆ certificate SANs?
//!   │     └── Reuse  -> return paths untouched
//!   └── Regenerate
//!         ├── KeyStore::generate + CertStore::generate (in memory)
//!         └── KeyStore::persist + CertStore::persist (write, then rename)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::net::{IpAddr, Ipv4Addr};
//! use tls_identity::{IdentityManager, IdentityRequest};
//!
//! let request = IdentityRequest::builder("certs")
//!     .ip_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
//!     .dns_name("extra.local")
//!     .build();
//! let identity = IdentityManager::new().ensure(&request)?;
//! println!("{} {}", identity.cert_path.display(), identity.key_path.display());
//! # Ok::<(), tls_identity::IdentityError>(())
//! ```

pub mod cert_store;
pub mod config;
pub mod error;
pub mod hash;
pub mod key_store;
pub mod manager;
pub mod persist;
pub mod policy;
pub mod request;

use std::path::{Path, PathBuf};

pub use cert_store::{
    CertStore, Certificate, CertificateState, InvalidCertificate, LoadedCertificate, Validity,
};
pub use config::IdentityConfig;
pub use error::IdentityError;
pub use key_store::{KeyMaterial, KeyStore};
pub use manager::{EnsuredIdentity, IdentityManager, IdentityStatus};
pub use policy::{decide, Decision, RegenerateReason};
pub use request::{IdentityRequest, IdentityRequestBuilder};

/// Result type for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Certificate file name inside an identity directory.
pub const CERT_FILE_NAME: &str = "server.crt";
/// Key file name inside an identity directory.
pub const KEY_FILE_NAME: &str = "server.key";

/// `<dir>/server.crt`
pub fn cert_path(dir: &Path) -> PathBuf {
    dir.join(CERT_FILE_NAME)
}

/// `<dir>/server.key`
pub fn key_path(dir: &Path) -> PathBuf {
    dir.join(KEY_FILE_NAME)
}
