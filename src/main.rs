//! Forward HTTP proxy with a domain blocklist.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ proxy::Session ──▶ policy::PolicyStore
//!                                       │
//!                     ┌─────────────────┴──────────────────┐
//!                     ▼                                    ▼
//!              proxy::forward                        proxy::tunnel
//!          (origin-form rewrite,                  (200 Connection
//!           streamed response)                 Established, blind relay)
//!                     │                                    │
//!                     └──────────────▶ Origin ◀────────────┘
//!
//!     Every session ──▶ audit::AuditLog (one line per session)
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};

use forward_proxy::config::{load_config, load_config_or_default, validate_config, ConfigError, ProxyConfig};
use forward_proxy::lifecycle;
use forward_proxy::observability::logging;

/// Config file read when `--config` is not given, if it exists.
const DEFAULT_CONFIG_PATH: &str = "config/proxy.toml";

#[derive(Parser, Debug)]
#[command(name = "forward-proxy")]
#[command(about = "Forward HTTP proxy with domain blocking and CONNECT tunneling", long_about = None)]
struct Cli {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:8888.
    #[arg(short, long)]
    listen: Option<String>,

    /// Blocklist file, one hostname per line.
    #[arg(short, long)]
    blocklist: Option<PathBuf>,

    /// Audit log file.
    #[arg(short, long)]
    audit_log: Option<PathBuf>,

    /// Diagnostic log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// The config file that will be read, if any.
    fn config_source(&self) -> Option<&Path> {
        match &self.config {
            Some(path) => Some(path.as_path()),
            None => Some(Path::new(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
        }
    }

    fn load(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => load_config_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
        };

        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(blocklist) = &self.blocklist {
            config.policy.blocklist_path = Some(blocklist.clone());
        }
        if let Some(audit_log) = &self.audit_log {
            config.audit.log_path = audit_log.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_logging(&config.observability.log_level)?;

    match cli.config_source() {
        Some(path) => tracing::info!(path = ?path, "Configuration loaded"),
        None => tracing::info!("No config file, using defaults"),
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        max_connections = ?config.listener.max_connections,
        blocklist = ?config.policy.blocklist_path,
        "forward-proxy starting"
    );

    lifecycle::run(config).await?;
    Ok(())
}
