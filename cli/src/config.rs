// Relay settings for the peercall-relay binary
//
// Resolution order:
// 1. built-in defaults (0.0.0.0:8081, plain ws)
// 2. JSON file: --config / PEERCALL_CONFIG, else <config_dir>/peercall/relay.json
//    when it exists (~/.config/peercall/relay.json on Linux)
// 3. PEERCALL_HOST, PEERCALL_PORT, PEERCALL_TLS_CERT, PEERCALL_TLS_KEY

use anyhow::{Context, Result};
use peercall_core::relay::RelayConfig;
use std::path::{Path, PathBuf};

/// Default config file location, if the platform has a config directory
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("peercall").join("relay.json"))
}

/// Read a relay config file. Missing keys fall back to defaults.
pub fn load_file(path: &Path) -> Result<RelayConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: RelayConfig = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Resolve the effective config from an optional explicit file, the default
/// file and the environment lookup
pub fn resolve<F>(
    explicit: Option<&Path>,
    default_file: Option<PathBuf>,
    lookup: F,
) -> Result<RelayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let base = match explicit {
        // An explicit file must exist
        Some(path) => load_file(path)?,
        None => match default_file.filter(|p| p.exists()) {
            Some(path) => load_file(&path)?,
            None => RelayConfig::default(),
        },
    };

    base.with_env(lookup)
        .context("Invalid PEERCALL_* environment settings")
}

/// Effective config for this process
pub fn load(explicit: Option<&Path>) -> Result<RelayConfig> {
    resolve(explicit, default_config_file(), |key| std::env::var(key).ok())
}
