//! Relay configuration: listen address and optional TLS material

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Default listen host
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default listen port
pub const DEFAULT_PORT: u16 = 8081;

pub const ENV_HOST: &str = "PEERCALL_HOST";
pub const ENV_PORT: &str = "PEERCALL_PORT";
pub const ENV_TLS_CERT: &str = "PEERCALL_TLS_CERT";
pub const ENV_TLS_KEY: &str = "PEERCALL_TLS_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid port {0:?}")]
    InvalidPort(String),
    #[error("TLS needs both PEERCALL_TLS_CERT and PEERCALL_TLS_KEY")]
    IncompleteTls,
}

/// PEM certificate chain and PKCS#8 private key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Host or IP to bind
    pub host: String,
    /// TCP port to bind (0 = any free port)
    pub port: u16,
    /// Serve `wss://` when set, plain `ws://` otherwise
    pub tls: Option<TlsConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Apply `PEERCALL_*` overrides looked up through `lookup`
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.is_empty()) {
            self.host = host;
        }

        if let Some(port) = lookup(ENV_PORT).filter(|p| !p.is_empty()) {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }

        let cert = lookup(ENV_TLS_CERT).filter(|v| !v.is_empty());
        let key = lookup(ENV_TLS_KEY).filter(|v| !v.is_empty());
        match (cert, key) {
            (Some(cert), Some(key)) => {
                self.tls = Some(TlsConfig {
                    cert_path: PathBuf::from(cert),
                    key_path: PathBuf::from(key),
                });
            }
            (None, None) => {}
            _ => return Err(ConfigError::IncompleteTls),
        }

        Ok(self)
    }

    /// `host:port` string suitable for binding
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL scheme clients should use
    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "wss"
        } else {
            "ws"
        }
    }
}
