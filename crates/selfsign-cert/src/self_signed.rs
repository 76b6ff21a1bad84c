//! Self-signed certificate generation
//!
//! Issues a single self-signed server certificate per common name, signed by
//! its own freshly generated key. There is no CA key involved.
//!
//! # Example
//! ```no_run
//! use selfsign_cert::{Algorithm, CertificateIssuer, GenerateRequest, SelfSignedIssuer};
//!
//! let issuer = SelfSignedIssuer::new("./certs", chrono::Duration::days(365));
//! let response = issuer
//!     .generate(&GenerateRequest {
//!         common_name: "svc.internal".to_string(),
//!         admin_email: "ops@example.com".to_string(),
//!         algorithm: Algorithm::Ecdsa,
//!         key_size: 256,
//!     })
//!     .unwrap();
//! println!("{}", response.cert_path.display());
//! ```

use chrono::Duration;
use der::pem::LineEnding;
use der::Encode;
use std::path::{is_separator, Path};
use tracing::{debug, error, info};

use crate::key::{KeySpec, PrivateKey};
use crate::storage::{ArtifactPaths, CertificateStore};
use crate::template::CertificateTemplate;
use crate::{
    CertificateIssuer, GenerateRequest, GenerateResponse, IssuerConfig, IssuerError,
    RenewRequest, RenewResponse, RevokeRequest, RevokeResponse,
};

/// PEM label of the certificate file
pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Issuer writing self-signed certificates into a single directory
#[derive(Debug, Clone)]
pub struct SelfSignedIssuer {
    store: CertificateStore,
    validity: Duration,
}

impl SelfSignedIssuer {
    pub fn new(cert_dir: impl AsRef<Path>, validity: Duration) -> Self {
        Self {
            store: CertificateStore::new(cert_dir),
            validity,
        }
    }

    pub fn from_config(config: &IssuerConfig) -> Self {
        Self::new(&config.cert_dir, config.validity())
    }

    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    fn issue(&self, request: &GenerateRequest) -> Result<GenerateResponse, IssuerError> {
        let common_name = request.common_name.as_str();

        let spec = KeySpec::resolve(request.algorithm, request.key_size)?;
        validate_common_name(common_name)?;
        if !request.admin_email.is_ascii() {
            return Err(IssuerError::InvalidAdminEmail(request.admin_email.clone()));
        }

        let dir = self.store.ensure_dir()?;
        let paths = ArtifactPaths::new(&dir, common_name);
        debug!("Cert path: {}", paths.cert.display());
        debug!("Key path: {}", paths.key.display());
        self.store.check_absent(common_name, &paths)?;

        debug!(
            "Generating {} key ({:?}) for {}",
            spec.algorithm(),
            spec,
            common_name
        );
        let key = PrivateKey::generate(spec)?;

        let template = CertificateTemplate::new(common_name, &request.admin_email, self.validity)?;
        debug!(
            "Signing certificate valid from {} to {}",
            template.not_before, template.not_after
        );
        let certificate = template.self_sign(&key)?;

        let cert_pem =
            der::pem::encode_string(CERTIFICATE_LABEL, LineEnding::LF, &certificate.to_der()?)
                .map_err(|e| IssuerError::Encoding(format!("{} PEM: {}", CERTIFICATE_LABEL, e)))?;
        let key_pem = key.to_pem()?;

        // No rollback: a failed key write leaves the certificate behind, and
        // the next attempt for this name stops at the existence check.
        self.store
            .write_certificate(common_name, &paths.cert, &cert_pem)?;
        self.store
            .write_private_key(common_name, &paths.key, &key_pem)?;

        info!(
            "Issued self-signed {} certificate for {} at {}",
            key.algorithm(),
            common_name,
            paths.cert.display()
        );

        Ok(GenerateResponse {
            cert_path: paths.cert,
            key_path: paths.key,
        })
    }
}

impl CertificateIssuer for SelfSignedIssuer {
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, IssuerError> {
        self.issue(request).map_err(|err| {
            error!(
                "Failed to issue certificate for {}: {}",
                request.common_name, err
            );
            err
        })
    }

    fn renew(&self, request: &RenewRequest) -> Result<RenewResponse, IssuerError> {
        debug!("Renewal requested for {}", request.common_name);
        Err(IssuerError::NotSupported("renew"))
    }

    fn revoke(&self, request: &RevokeRequest) -> Result<RevokeResponse, IssuerError> {
        debug!("Revocation requested for {}", request.common_name);
        Err(IssuerError::NotSupported("revoke"))
    }
}

/// The common name becomes a file name stem, so it must stay inside the
/// certificate directory. It also becomes an IA5String DNS name.
pub fn validate_common_name(common_name: &str) -> Result<(), IssuerError> {
    let reason = if common_name.is_empty() {
        Some("must not be empty")
    } else if common_name == "." || common_name == ".." {
        Some("must not be a relative path component")
    } else if common_name.chars().any(|c| c == '\\' || is_separator(c)) {
        Some("must not contain a path separator")
    } else if common_name.contains('\0') {
        Some("must not contain NUL")
    } else if !common_name.is_ascii() {
        Some("must be ASCII")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(IssuerError::InvalidCommonName {
            common_name: common_name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
