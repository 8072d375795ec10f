//! Global configuration loader for bioflow.
//!
//! Reads `config.toml` from the data directory (`~/.bioflow/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use bioflow_types::config::GlobalConfig;

use crate::sqlite::pool::database_url_for;

/// Resolve the data directory.
///
/// Priority:
/// 1. `BIOFLOW_DATA_DIR` environment variable
/// 2. `~/.bioflow`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BIOFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".bioflow");
    }

    // Last resort: current directory
    PathBuf::from(".bioflow")
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - A missing file yields [`GlobalConfig::default()`].
/// - A file that cannot be read or parsed logs a warning and yields the default.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
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

/// The configured database URL, or the default file under `data_dir`.
pub fn resolve_database_url(config: &GlobalConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| database_url_for(data_dir))
}
