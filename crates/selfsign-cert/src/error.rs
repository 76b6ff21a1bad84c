//! Issuance errors

use std::path::PathBuf;
use thiserror::Error;

use crate::key::Algorithm;

/// Errors returned by a [`crate::CertificateIssuer`]
///
/// Every variant is terminal for the call that produced it; nothing is retried.
#[derive(Debug, Error)]
pub enum IssuerError {
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid key size {key_size} for {algorithm}")]
    InvalidKeySize { algorithm: Algorithm, key_size: u32 },

    #[error("Invalid common name {common_name:?}: {reason}")]
    InvalidCommonName {
        common_name: String,
        reason: &'static str,
    },

    #[error("Invalid admin email {0:?}: must be an ASCII address")]
    InvalidAdminEmail(String),

    #[error("Certificate already exists for {common_name} at {}", path.display())]
    CertificateExists { common_name: String, path: PathBuf },

    #[error("Private key already exists for {common_name} at {}", path.display())]
    KeyExists { common_name: String, path: PathBuf },

    #[error("Could not create certificate directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Certificate path {} exists and is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Random source failure: {0}")]
    Entropy(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Certificate signing failed: {0}")]
    Signing(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("Invalid validity window: {0}")]
    InvalidValidity(String),

    #[error("{0} is not supported by this issuer")]
    NotSupported(&'static str),
}

impl IssuerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<der::Error> for IssuerError {
    fn from(err: der::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}
