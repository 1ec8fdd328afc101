//! Application configuration types.
//!
//! `AppConfig` represents the optional `config.toml` in the data directory.
//! Every field has a default so an absent or partial file is valid.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the `invflow` binary.
///
/// Loaded from `~/.invoiceflow/config.toml` (or `$INVOICEFLOW_DATA_DIR/config.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite URL. Defaults to `sqlite://{data_dir}/invoiceflow.db?mode=rwc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Workflow document used when no `--workflow` flag is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_path: Option<String>,

    /// Base URL for review links. Overrides the workflow's `review_url_base`
    /// when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_url_base: Option<String>,

    /// Address the review API binds to.
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// Port the review API binds to.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    8000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            workflow_path: None,
            review_url_base: None,
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
        }
    }
}
