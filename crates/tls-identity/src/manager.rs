//! Identity orchestration: load, decide, regenerate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info, warn};

use crate::cert_store::{parse_certificate_der, CertStore, CertificateState, LoadedCertificate};
use crate::error::IdentityError;
use crate::key_store::KeyStore;
use crate::policy::{decide, Decision, RegenerateReason};
use crate::request::IdentityRequest;
use crate::Result;

/// Paths handed to the TLS server, plus what happened to get them.
#[derive(Debug, Clone)]
pub struct EnsuredIdentity {
    /// `server.crt`
    pub cert_path: PathBuf,
    /// `server.key`
    pub key_path: PathBuf,
    /// Whether the files were reused or rewritten
    pub decision: Decision,
    /// The certificate now on disk
    pub certificate: LoadedCertificate,
}

/// Read-only view of an identity directory.
#[derive(Debug, Clone)]
pub struct IdentityStatus {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Why the key could not be loaded, if it could not
    pub key_error: Option<String>,
    pub certificate: CertificateState,
    /// `Some` only when both key and certificate loaded
    pub key_matches: Option<bool>,
}

impl IdentityStatus {
    pub const fn key_present(&self) -> bool {
        self.key_error.is_none()
    }
}

/// One lock per canonical identity directory, shared by every manager in
/// the process. Entries are never removed.
static DIR_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

/// Keeps a certificate/key pair in a directory matching what callers ask for.
///
/// `ensure` and `force_regenerate` on the same directory are serialised
/// across all managers in the process, but not across processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityManager {
    keys: KeyStore,
    certs: CertStore,
}

impl IdentityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager issuing certificates with `certs`' settings.
    pub fn with_cert_store(certs: CertStore) -> Self {
        Self {
            certs,
            ..Self::default()
        }
    }

    /// Reuse the pair in `requested.directory` if it covers the request,
    /// otherwise replace both files.
    pub fn ensure(&self, requested: &IdentityRequest) -> Result<EnsuredIdentity> {
        let dir = prepare_dir(&requested.directory)?;
        let lock = dir_lock(&dir);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let key_path = requested.key_path();
        let cert_path = requested.cert_path();

        let key_present = match self.keys.load(&key_path) {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "no usable key on disk");
                false
            }
        };
        let state = self.certs.load(&cert_path);
        let decision = decide(&state, key_present, requested);

        match state {
            CertificateState::Valid(certificate) if decision.is_reuse() => {
                if certificate.is_expired() {
                    warn!(
                        path = %cert_path.display(),
                        not_after = %certificate.not_after,
                        "reusing expired certificate"
                    );
                }
                info!(
                    dir = %requested.directory.display(),
                    fingerprint = %certificate.fingerprint,
                    "reusing existing TLS identity"
                );
                Ok(EnsuredIdentity {
                    cert_path,
                    key_path,
                    decision,
                    certificate,
                })
            }
            _ => self.regenerate(requested, decision),
        }
    }

    /// Replace both files regardless of what is on disk.
    pub fn force_regenerate(&self, requested: &IdentityRequest) -> Result<EnsuredIdentity> {
        let dir = prepare_dir(&requested.directory)?;
        let lock = dir_lock(&dir);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.regenerate(requested, Decision::Regenerate(RegenerateReason::Forced))
    }

    /// Report on `dir` without changing anything.
    pub fn inspect(&self, dir: &Path) -> IdentityStatus {
        let key_path = crate::key_path(dir);
        let cert_path = crate::cert_path(dir);

        let key = self.keys.load(&key_path);
        let certificate = self.certs.load(&cert_path);
        let key_matches = match (&key, certificate.as_valid()) {
            (Ok(key), Some(cert)) => Some(cert.matches_key(key)),
            _ => None,
        };

        IdentityStatus {
            cert_path,
            key_path,
            key_error: key.err().map(|e| e.to_string()),
            certificate,
            key_matches,
        }
    }

    // Caller holds the directory lock.
    fn regenerate(&self, requested: &IdentityRequest, decision: Decision) -> Result<EnsuredIdentity> {
        if let Some(reason) = decision.reason() {
            info!(dir = %requested.directory.display(), %reason, "generating new TLS identity");
        }

        // Nothing touches disk until both halves exist in memory.
        let key = self.keys.generate()?;
        let cert = self.certs.generate(&key, requested)?;
        let certificate = parse_certificate_der(cert.der())
            .map_err(|e| IdentityError::Signing(format!("issued certificate does not parse: {e}")))?;

        let key_path = requested.key_path();
        let cert_path = requested.cert_path();
        self.keys.persist(&key_path, &key)?;
        self.certs.persist(&cert_path, &cert)?;

        info!(
            cert = %cert_path.display(),
            key = %key_path.display(),
            fingerprint = %certificate.fingerprint,
            not_after = %certificate.not_after,
            "wrote TLS identity"
        );

        Ok(EnsuredIdentity {
            cert_path,
            key_path,
            decision,
            certificate,
        })
    }

}

fn dir_lock(dir: &Path) -> Arc<Mutex<()>> {
    let mut locks = DIR_LOCKS
        .get_or_init(Mutex::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(dir.to_path_buf()).or_default())
}

/// Create `dir` if needed and return the key used for locking it.
fn prepare_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| IdentityError::io(dir, e))?;
    Ok(std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::TempDir;

    fn localhost_request(dir: &Path) -> IdentityRequest {
        IdentityRequest::builder(dir)
            .ip_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .build()
    }

    #[test]
    fn test_ensure_creates_nested_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a").join("certs");
        let manager = IdentityManager::new();

        let identity = manager.ensure(&localhost_request(&dir)).unwrap();
        assert!(identity.cert_path.exists());
        assert!(identity.key_path.exists());
        assert_eq!(
            identity.decision,
            Decision::Regenerate(RegenerateReason::KeyMissing)
        );
    }

    #[test]
    fn test_ensure_existing_dir_is_fine() {
        let tmp = TempDir::new().unwrap();
        let manager = IdentityManager::new();
        manager.ensure(&localhost_request(tmp.path())).unwrap();
        assert!(manager
            .ensure(&localhost_request(tmp.path()))
            .unwrap()
            .decision
            .is_reuse());
    }

    #[test]
    fn test_force_regenerate_replaces_valid_pair() {
        let tmp = TempDir::new().unwrap();
        let manager = IdentityManager::new();
        let first = manager.ensure(&localhost_request(tmp.path())).unwrap();

        let forced = manager.force_regenerate(&localhost_request(tmp.path())).unwrap();
        assert_eq!(
            forced.decision,
            Decision::Regenerate(RegenerateReason::Forced)
        );
        assert_ne!(forced.certificate.fingerprint, first.certificate.fingerprint);
    }

    #[test]
    fn test_inspect_reports_pairing() {
        let tmp = TempDir::new().unwrap();
        let manager = IdentityManager::new();

        let empty = manager.inspect(tmp.path());
        assert!(!empty.key_present());
        assert!(empty.certificate.as_valid().is_none());
        assert_eq!(empty.key_matches, None);

        manager.ensure(&localhost_request(tmp.path())).unwrap();
        let status = manager.inspect(tmp.path());
        assert!(status.key_present());
        assert_eq!(status.key_matches, Some(true));
    }

    #[test]
    fn test_inspect_detects_mismatched_key() {
        let tmp = TempDir::new().unwrap();
        let manager = IdentityManager::new();
        let identity = manager.ensure(&localhost_request(tmp.path())).unwrap();

        let other = KeyStore.generate().unwrap();
        KeyStore.persist(&identity.key_path, &other).unwrap();

        assert_eq!(manager.inspect(tmp.path()).key_matches, Some(false));
    }

    #[test]
    fn test_dir_lock_is_shared_per_directory() {
        let tmp = TempDir::new().unwrap();
        let a = prepare_dir(&tmp.path().join("a")).unwrap();
        let b = prepare_dir(&tmp.path().join("b")).unwrap();

        assert!(Arc::ptr_eq(&dir_lock(&a), &dir_lock(&a)));
        assert!(!Arc::ptr_eq(&dir_lock(&a), &dir_lock(&b)));
    }

    #[test]
    fn test_separate_managers_serialise_on_one_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(move || {
                    IdentityManager::new()
                        .force_regenerate(&localhost_request(dir))
                        .unwrap();
                });
            }
        });

        assert_eq!(IdentityManager::new().inspect(dir).key_matches, Some(true));
    }

    #[test]
    fn test_unwritable_dir_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let err = IdentityManager::new()
            .ensure(&localhost_request(&file))
            .unwrap_err();
        assert!(matches!(err, IdentityError::Io { .. }));
    }
}
