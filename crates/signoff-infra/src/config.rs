//! Configuration and data directory resolution.
//!
//! Reads `signoff.toml` from the data directory (`~/.signoff/` in
//! production) into [`GlobalConfig`]. Falls back to defaults when the file
//! is missing or malformed.

use std::path::{Path, PathBuf};

use signoff_types::config::GlobalConfig;

pub const CONFIG_FILE: &str = "signoff.toml";
pub const DATA_DIR_ENV: &str = "SIGNOFF_DATA_DIR";

/// Resolve the data directory.
///
/// Priority:
/// 1. `SIGNOFF_DATA_DIR` environment variable
/// 2. `~/.signoff`
/// 3. `.signoff` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".signoff");
    }
    PathBuf::from(".signoff")
}

/// SQLite URL for the database inside `data_dir`.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join("signoff.db").display())
}

/// Load `{data_dir}/signoff.toml`.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            GlobalConfig::default()
        }
    }
}
