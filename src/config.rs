//! Issuer configuration file
//!
//! An optional YAML file supplies `cert_dir` and `validity_days`; command-line
//! flags and their environment variables take precedence over it.
//!
//! ```yaml
//! cert_dir: /var/lib/selfsign/certs
//! validity_days: 90
//! ```

use anyhow::{Context, Result};
use selfsign_cert::IssuerConfig;
use std::path::{Path, PathBuf};

/// Values given on the command line
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub cert_dir: Option<PathBuf>,
    pub validity_days: Option<i64>,
}

/// Load the file if one was given, then apply overrides
pub fn resolve(path: Option<&Path>, overrides: Overrides) -> Result<IssuerConfig> {
    let mut config = match path {
        Some(path) => load(path)?,
        None => IssuerConfig::default(),
    };

    if let Some(cert_dir) = overrides.cert_dir {
        config.cert_dir = cert_dir;
    }
    if let Some(validity_days) = overrides.validity_days {
        config.validity_days = validity_days;
    }

    Ok(config)
}

pub fn load(path: &Path) -> Result<IssuerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    parse(&content).with_context(|| format!("Invalid config file: {:?}", path))
}

pub fn parse(content: &str) -> Result<IssuerConfig> {
    // An empty document means "all defaults".
    if content.trim().is_empty() {
        return Ok(IssuerConfig::default());
    }

    serde_yaml::from_str(content).context("Failed to parse YAML config")
}
