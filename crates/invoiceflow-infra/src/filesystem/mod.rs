//! Data directory layout for invoiceflow.
//!
//! The data directory holds `config.toml` and the review-queue database.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "INVOICEFLOW_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `INVOICEFLOW_DATA_DIR` environment variable
/// 2. `~/.invoiceflow`
/// 3. `./.invoiceflow` when no home directory is known
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".invoiceflow");
    }

    PathBuf::from(".invoiceflow")
}

/// Create the data directory if needed and return it.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<PathBuf, std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await?;
    Ok(data_dir.to_path_buf())
}

/// `{data_dir}/config.toml`.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}
