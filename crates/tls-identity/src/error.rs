//! Error types for identity generation and persistence.
//!
//! Problems while *reading* an existing certificate are not errors: they are
//! reported as [`crate::InvalidCertificate`] and lead to regeneration.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort an identity operation.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The key pair could not be generated (randomness or curve failure).
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// A key file was missing, unreadable, or not a private key encoding.
    #[error("failed to load private key from {path}: {reason}")]
    KeyParse {
        /// Key file that was read
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The random serial number could not be drawn.
    #[error("failed to generate random serial number: {0}")]
    SerialGeneration(String),

    /// The validity window does not fit in a certificate's time range.
    #[error("invalid validity window: {0}")]
    InvalidValidity(String),

    /// Self-signing the certificate failed.
    #[error("certificate signing failed: {0}")]
    Signing(String),

    /// A requested DNS name cannot be encoded as an IA5 string.
    #[error("invalid DNS name {name:?}: {reason}")]
    InvalidDnsName {
        /// The offending name
        name: String,
        /// Encoder message
        reason: String,
    },

    /// Filesystem failure (read, write, rename, permissions, mkdir).
    #[error("io error on {path}: {source}")]
    Io {
        /// Path being operated on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is invalid.
    #[error("config error: {0}")]
    Config(String),
}

impl IdentityError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn key_parse(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::KeyParse {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
