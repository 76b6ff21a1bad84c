//! selfsign CLI - Issue self-signed TLS certificates
//!
//! Writes `<CN>.pem` and `<CN>-key.pem` into the configured certificate
//! directory, refusing to overwrite anything already there.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use selfsign_cert::{
    Algorithm, CertificateIssuer, GenerateRequest, RenewRequest, RevokeRequest, SelfSignedIssuer,
};

mod config;

/// selfsign - Self-signed certificates for TLS services
#[derive(Parser, Debug)]
#[command(name = "selfsign")]
#[command(about = "Issue self-signed TLS certificates", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(long, global = true, env = "SELFSIGN_CONFIG")]
    config: Option<PathBuf>,

    /// Directory receiving certificates and keys (overrides the config file)
    #[arg(long, global = true, env = "SELFSIGN_CERT_DIR")]
    cert_dir: Option<PathBuf>,

    /// Certificate lifetime in days (overrides the config file)
    #[arg(
        long,
        global = true,
        env = "SELFSIGN_VALIDITY_DAYS",
        allow_negative_numbers = true
    )]
    validity_days: Option<i64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a private key and a self-signed certificate
    Generate {
        /// Common name; also the DNS SAN and the file name stem
        #[arg(long)]
        common_name: String,

        /// Administrator email placed in the certificate
        #[arg(long, env = "SELFSIGN_ADMIN_EMAIL")]
        admin_email: String,

        /// Key algorithm (rsa, ecdsa)
        #[arg(long, default_value = "rsa")]
        algorithm: Algorithm,

        /// RSA modulus bits, or ECDSA curve (224, 256, 384, 521)
        #[arg(long, default_value_t = 2048)]
        key_size: u32,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Renew an issued certificate
    Renew {
        #[arg(long)]
        common_name: String,
    },
    /// Revoke an issued certificate
    Revoke {
        #[arg(long)]
        common_name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let config = config::resolve(
        cli.config.as_deref(),
        config::Overrides {
            cert_dir: cli.cert_dir,
            validity_days: cli.validity_days,
        },
    )?;
    let issuer = SelfSignedIssuer::from_config(&config);
    debug!(
        "Certificate directory: {}, validity: {} days",
        issuer.store().dir().display(),
        issuer.validity().num_days()
    );

    match cli.command {
        Commands::Generate {
            common_name,
            admin_email,
            algorithm,
            key_size,
            json,
        } => {
            info!(
                "Generating {} certificate for {} (key size {})",
                algorithm, common_name, key_size
            );

            let response = issuer
                .generate(&GenerateRequest {
                    common_name: common_name.clone(),
                    admin_email,
                    algorithm,
                    key_size,
                })
                .with_context(|| format!("Failed to generate certificate for {}", common_name))?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&response)
                        .context("Failed to serialize response")?
                );
            } else {
                println!("Certificate: {}", response.cert_path.display());
                println!("Private key: {}", response.key_path.display());
            }
            Ok(())
        }
        Commands::Renew { common_name } => {
            let response = issuer
                .renew(&RenewRequest {
                    common_name: common_name.clone(),
                })
                .with_context(|| format!("Failed to renew certificate for {}", common_name))?;

            println!("Certificate: {}", response.cert_path.display());
            println!("Private key: {}", response.key_path.display());
            Ok(())
        }
        Commands::Revoke { common_name } => {
            let response = issuer
                .revoke(&RevokeRequest {
                    common_name: common_name.clone(),
                })
                .with_context(|| format!("Failed to revoke certificate for {}", common_name))?;

            println!("Revoked: {}", response.common_name);
            Ok(())
        }
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
