//! Certificate storage
//!
//! Issued material lives in one flat directory: `<CN>.pem` for the
//! certificate and `<CN>-key.pem` for the private key. There is no index;
//! the directory listing is the only record of what has been issued.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::IssuerError;

/// Mode of a freshly created certificate directory
pub const DIR_MODE: u32 = 0o700;

/// Mode of a private key file
pub const KEY_FILE_MODE: u32 = 0o600;

/// Outcome of a `stat` call, with the failure kinds the issuer cares about
#[derive(Debug)]
pub enum Probe {
    Exists(Metadata),
    NotFound,
    PermissionDenied,
    Other(io::Error),
}

/// Stat `path`, following symlinks
pub fn probe(path: &Path) -> Probe {
    match fs::metadata(path) {
        Ok(metadata) => Probe::Exists(metadata),
        Err(err) => match err.kind() {
            ErrorKind::NotFound => Probe::NotFound,
            ErrorKind::PermissionDenied => Probe::PermissionDenied,
            _ => Probe::Other(err),
        },
    }
}

/// Certificate and key file locations for one common name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: &Path, common_name: &str) -> Self {
        Self {
            cert: dir.join(format!("{}.pem", common_name)),
            key: dir.join(format!("{}-key.pem", common_name)),
        }
    }
}

/// Flat directory of issued certificates and keys
#[derive(Debug, Clone)]
pub struct CertificateStore {
    dir: PathBuf,
}

impl CertificateStore {
    /// Trailing path separators are dropped; an empty path means the
    /// current directory.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir: PathBuf = dir.as_ref().components().collect();
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };

        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths_for(&self, common_name: &str) -> ArtifactPaths {
        ArtifactPaths::new(&self.dir, common_name)
    }

    /// Make sure the directory exists, creating it owner-only if missing.
    ///
    /// Returns the absolute directory path.
    pub fn ensure_dir(&self) -> Result<PathBuf, IssuerError> {
        debug!("Ensuring certificate directory {}", self.dir.display());

        match probe(&self.dir) {
            Probe::Exists(metadata) if metadata.is_dir() => {
                trace!("Certificate directory already exists");
            }
            Probe::Exists(_) => return Err(IssuerError::NotADirectory(self.dir.clone())),
            Probe::NotFound => {
                debug!("Creating certificate directory {}", self.dir.display());
                create_private_dir(&self.dir).map_err(|source| IssuerError::Directory {
                    path: self.dir.clone(),
                    source,
                })?;
            }
            Probe::PermissionDenied => {
                return Err(IssuerError::PermissionDenied(self.dir.clone()))
            }
            Probe::Other(source) => {
                return Err(IssuerError::Directory {
                    path: self.dir.clone(),
                    source,
                })
            }
        }

        fs::canonicalize(&self.dir).map_err(|source| IssuerError::Directory {
            path: self.dir.clone(),
            source,
        })
    }

    /// Fail if either artifact for `common_name` is already on disk.
    /// The certificate is checked first.
    pub fn check_absent(&self, common_name: &str, paths: &ArtifactPaths) -> Result<(), IssuerError> {
        debug!("Checking for an existing certificate at {}", paths.cert.display());
        if is_present(&paths.cert)? {
            return Err(IssuerError::CertificateExists {
                common_name: common_name.to_string(),
                path: paths.cert.clone(),
            });
        }

        debug!("Checking for an existing key at {}", paths.key.display());
        if is_present(&paths.key)? {
            return Err(IssuerError::KeyExists {
                common_name: common_name.to_string(),
                path: paths.key.clone(),
            });
        }

        Ok(())
    }

    /// Write the certificate PEM with the platform's default file mode.
    ///
    /// A failure to flush the written file is logged and otherwise ignored.
    pub fn write_certificate(
        &self,
        common_name: &str,
        path: &Path,
        pem: &str,
    ) -> Result<(), IssuerError> {
        debug!("Writing certificate to {}", path.display());

        let mut file = create_new(path, None).map_err(|err| {
            if err.kind() == ErrorKind::AlreadyExists {
                IssuerError::CertificateExists {
                    common_name: common_name.to_string(),
                    path: path.to_path_buf(),
                }
            } else {
                IssuerError::io(path, err)
            }
        })?;
        file.write_all(pem.as_bytes())
            .map_err(|err| IssuerError::io(path, err))?;

        if let Err(err) = file.sync_all() {
            warn!("Error closing certificate {}: {}", path.display(), err);
        }

        Ok(())
    }

    /// Write the private key PEM readable by the owner only.
    ///
    /// The `sync_all` flush is the checked failure point; errors from the
    /// close performed when the `File` drops are not observed.
    pub fn write_private_key(
        &self,
        common_name: &str,
        path: &Path,
        pem: &str,
    ) -> Result<(), IssuerError> {
        debug!("Writing private key to {}", path.display());

        let mut file = create_new(path, Some(KEY_FILE_MODE)).map_err(|err| {
            if err.kind() == ErrorKind::AlreadyExists {
                IssuerError::KeyExists {
                    common_name: common_name.to_string(),
                    path: path.to_path_buf(),
                }
            } else {
                IssuerError::io(path, err)
            }
        })?;
        file.write_all(pem.as_bytes())
            .map_err(|err| IssuerError::io(path, err))?;
        file.sync_all().map_err(|err| IssuerError::io(path, err))?;

        Ok(())
    }
}

/// `Ok(true)` if something is at `path`, `Ok(false)` if nothing is
fn is_present(path: &Path) -> Result<bool, IssuerError> {
    match probe(path) {
        Probe::Exists(_) => Ok(true),
        Probe::NotFound => Ok(false),
        Probe::PermissionDenied => Err(IssuerError::PermissionDenied(path.to_path_buf())),
        Probe::Other(err) => Err(IssuerError::io(path, err)),
    }
}

fn create_private_dir(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }

    match builder.create(path) {
        // lost a race with another issuer creating the same directory
        Err(err) if err.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        result => result,
    }
}

/// Open `path` for writing, failing if anything already exists there
fn create_new(path: &Path, mode: Option<u32>) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if let Some(mode) = mode {
            options.mode(mode);
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    options.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_for_common_name() {
        let store = CertificateStore::new("/var/lib/certs///");
        assert_eq!(store.dir(), Path::new("/var/lib/certs"));

        let paths = store.paths_for("svc.internal");
        assert_eq!(paths.cert, PathBuf::from("/var/lib/certs/svc.internal.pem"));
        assert_eq!(paths.key, PathBuf::from("/var/lib/certs/svc.internal-key.pem"));
    }

    #[test]
    fn test_empty_dir_is_current_dir() {
        assert_eq!(CertificateStore::new("").dir(), Path::new("."));
    }

    #[test]
    fn test_probe_not_found() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            probe(&temp_dir.path().join("missing")),
            Probe::NotFound
        ));
        assert!(matches!(probe(temp_dir.path()), Probe::Exists(_)));
    }

    #[test]
    fn test_ensure_dir_creates_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = CertificateStore::new(temp_dir.path().join("certs"));

        let created = store.ensure_dir().unwrap();
        assert!(created.is_absolute());
        assert!(created.is_dir());

        // second call accepts the existing directory
        assert_eq!(store.ensure_dir().unwrap(), created);
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = CertificateStore::new(temp_dir.path().join("certs"));
        let dir = store.ensure_dir().unwrap();

        let mode = fs::metadata(dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_ensure_dir_rejects_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("certs");
        fs::write(&path, b"not a directory").unwrap();

        let result = CertificateStore::new(&path).ensure_dir();
        assert!(matches!(result, Err(IssuerError::NotADirectory(p)) if p == path));
    }

    #[test]
    fn test_ensure_dir_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let store = CertificateStore::new(temp_dir.path().join("a").join("b"));
        assert!(matches!(
            store.ensure_dir(),
            Err(IssuerError::Directory { .. })
        ));
    }

    #[test]
    fn test_check_absent_reports_certificate_first() {
        let temp_dir = TempDir::new().unwrap();
        let store = CertificateStore::new(temp_dir.path());
        let paths = store.paths_for("svc.internal");

        assert!(store.check_absent("svc.internal", &paths).is_ok());

        fs::write(&paths.key, b"key").unwrap();
        assert!(matches!(
            store.check_absent("svc.internal", &paths),
            Err(IssuerError::KeyExists { .. })
        ));

        fs::write(&paths.cert, b"cert").unwrap();
        assert!(matches!(
            store.check_absent("svc.internal", &paths),
            Err(IssuerError::CertificateExists { .. })
        ));
    }

    #[test]
    fn test_writes_never_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let store = CertificateStore::new(temp_dir.path());
        let paths = store.paths_for("svc.internal");

        store
            .write_certificate("svc.internal", &paths.cert, "first")
            .unwrap();
        let err = store
            .write_certificate("svc.internal", &paths.cert, "second")
            .unwrap_err();
        assert!(matches!(err, IssuerError::CertificateExists { .. }));
        assert_eq!(fs::read_to_string(&paths.cert).unwrap(), "first");

        store
            .write_private_key("svc.internal", &paths.key, "first")
            .unwrap();
        let err = store
            .write_private_key("svc.internal", &paths.key, "second")
            .unwrap_err();
        assert!(matches!(err, IssuerError::KeyExists { .. }));
        assert_eq!(fs::read_to_string(&paths.key).unwrap(), "first");
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = CertificateStore::new(temp_dir.path());
        let paths = store.paths_for("svc.internal");
        store
            .write_private_key("svc.internal", &paths.key, "secret")
            .unwrap();

        let mode = fs::metadata(&paths.key).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, KEY_FILE_MODE);
    }
}
