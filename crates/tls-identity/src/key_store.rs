//! Private key generation, persistence and loading.

use rcgen::{KeyPair, PKCS_ECDSA_P256_SHA256};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::IdentityError;
use crate::persist::{write_atomic, KEY_FILE_MODE};
use crate::Result;

/// An ECDSA P-256 key pair.
pub struct KeyMaterial {
    key_pair: KeyPair,
}

impl KeyMaterial {
    /// The underlying rcgen key pair, used for signing.
    pub const fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Uncompressed public point, comparable with a certificate's
    /// subject public key bit string.
    pub fn public_key_raw(&self) -> &[u8] {
        self.key_pair.public_key_raw()
    }

    /// PKCS#8 PEM (`PRIVATE KEY`).
    pub fn to_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("public_key", &hex::encode(self.public_key_raw()))
            .finish_non_exhaustive()
    }
}

/// Creates, writes and reads the identity's private key.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyStore;

impl KeyStore {
    /// Generate a fresh key pair from the system CSPRNG.
    pub fn generate(&self) -> Result<KeyMaterial> {
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .map_err(|e| IdentityError::KeyGeneration(e.to_string()))?;
        Ok(KeyMaterial { key_pair })
    }

    /// Write `key` to `path` as PEM, owner read-only. Any previous file is
    /// replaced.
    pub fn persist(&self, path: &Path, key: &KeyMaterial) -> Result<()> {
        write_atomic(path, key.to_pem().as_bytes(), KEY_FILE_MODE)
    }

    /// Read and decode a key file.
    pub fn load(&self, path: &Path) -> Result<KeyMaterial> {
        let pem = std::fs::read_to_string(path).map_err(|e| IdentityError::key_parse(path, e))?;
        let key_pair = KeyPair::from_pem(&pem).map_err(|e| IdentityError::key_parse(path, e))?;
        debug!(path = %path.display(), "loaded private key");
        Ok(KeyMaterial { key_pair })
    }
}
