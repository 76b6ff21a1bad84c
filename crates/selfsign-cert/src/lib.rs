//! Self-signed certificate issuance
//!
//! Generates an RSA or ECDSA key pair, builds and self-signs an X.509 server
//! certificate for one common name, and stores both as PEM files in a
//! certificate directory without ever overwriting existing material.

pub mod error;
pub mod key;
pub mod self_signed;
pub mod storage;
pub mod template;

pub use error::IssuerError;
pub use key::{Algorithm, EcdsaCurve, KeySpec, PrivateKey};
pub use self_signed::{validate_common_name, SelfSignedIssuer};
pub use storage::{ArtifactPaths, CertificateStore};
pub use template::CertificateTemplate;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default certificate lifetime
pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

/// Request to issue a certificate for one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Subject CN, sole DNS SAN, and the stem of both file names
    pub common_name: String,
    /// Sole email address in the certificate
    pub admin_email: String,
    pub algorithm: Algorithm,
    /// RSA modulus bits, or ECDSA curve selector (224, 256, 384, 521)
    pub key_size: u32,
}

/// Absolute paths of a freshly written certificate and key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewRequest {
    pub common_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewResponse {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeRequest {
    pub common_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub common_name: String,
}

/// Certificate lifecycle operations
pub trait CertificateIssuer {
    /// Issue a new key and certificate; never overwrites existing files
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, IssuerError>;

    fn renew(&self, request: &RenewRequest) -> Result<RenewResponse, IssuerError>;

    fn revoke(&self, request: &RevokeRequest) -> Result<RevokeResponse, IssuerError>;
}

/// Issuer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// Directory receiving `<CN>.pem` and `<CN>-key.pem`
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,

    /// Certificate lifetime in days; zero or negative is not rejected
    #[serde(default = "default_validity_days")]
    pub validity_days: i64,
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("./certs")
}

fn default_validity_days() -> i64 {
    DEFAULT_VALIDITY_DAYS
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            cert_dir: default_cert_dir(),
            validity_days: default_validity_days(),
        }
    }
}

impl IssuerConfig {
    pub fn validity(&self) -> chrono::Duration {
        chrono::Duration::days(self.validity_days)
    }
}
