//! Application state wiring the engine to its adapters.
//!
//! AppState holds the concrete instances used by both CLI and REST API. The
//! runner is generic over store/tool traits; AppState pins it to the SQLite
//! review queue and the local tool providers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use invoiceflow_core::workflow::{WorkflowRunner, WorkflowSpec, load_workflow_file, parse_workflow_json};
use invoiceflow_infra::config::{load_app_config, resolve_database_url, resolve_review_url_base};
use invoiceflow_infra::filesystem::{ensure_data_dir, resolve_data_dir};
use invoiceflow_infra::sqlite::checkpoint::SqliteCheckpointStore;
use invoiceflow_infra::sqlite::pool::DatabasePool;
use invoiceflow_infra::tools::LocalToolInvoker;
use invoiceflow_types::config::AppConfig;

/// Workflow document used when neither `--workflow` nor `workflow_path` is set.
pub const DEFAULT_WORKFLOW_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/workflow.json"));

/// Runner pinned to the infra implementations.
pub type ConcreteRunner = WorkflowRunner<SqliteCheckpointStore, LocalToolInvoker>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<ConcreteRunner>,
    pub store: Arc<SqliteCheckpointStore>,
    pub config: Arc<AppConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize from the resolved data directory and its `config.toml`.
    pub async fn init(workflow_override: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = ensure_data_dir(&resolve_data_dir())
            .await
            .context("failed to create data directory")?;
        let config = load_app_config(&data_dir).await;
        Self::open(data_dir, config, workflow_override).await
    }

    /// Wire state for an explicit data directory and config.
    pub async fn open(
        data_dir: PathBuf,
        config: AppConfig,
        workflow_override: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let workflow_path = workflow_override
            .map(Path::to_path_buf)
            .or_else(|| config.workflow_path.as_ref().map(PathBuf::from));
        let spec = Arc::new(load_spec(workflow_path.as_deref())?);

        let db_url = resolve_database_url(&config, &data_dir);
        let pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("failed to open database {db_url}"))?;

        let review_url_base = resolve_review_url_base(&config, &spec.globals().review_url_base);
        let store = Arc::new(SqliteCheckpointStore::new(pool, review_url_base));

        let runner = WorkflowRunner::new(spec, store.clone(), Arc::new(LocalToolInvoker::new()))
            .context("failed to compile workflow graphs")?;

        let workflow_label = workflow_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<builtin>".to_string());
        tracing::debug!(
            data_dir = %data_dir.display(),
            workflow = workflow_label.as_str(),
            "application state ready"
        );

        Ok(Self {
            runner: Arc::new(runner),
            store,
            config: Arc::new(config),
            data_dir,
        })
    }
}

/// Load a workflow file, or the built-in invoice workflow when `path` is `None`.
pub fn load_spec(path: Option<&Path>) -> anyhow::Result<WorkflowSpec> {
    match path {
        Some(path) => load_workflow_file(path)
            .with_context(|| format!("failed to load workflow {}", path.display())),
        None => parse_workflow_json(DEFAULT_WORKFLOW_JSON).context("built-in workflow is invalid"),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_workflow_loads() {
        let spec = load_spec(None).unwrap();
        assert_eq!(spec.name(), Some("invoice-processing"));
    }

    #[test]
    fn missing_workflow_file_is_an_error() {
        let err = load_spec(Some(Path::new("/nonexistent/workflow.json"))).unwrap_err();
        assert!(err.to_string().contains("failed to load workflow"), "got: {err}");
    }

    #[tokio::test]
    async fn config_review_url_base_overrides_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            review_url_base: Some("https://review.example.com".to_string()),
            ..AppConfig::default()
        };
        let state = AppState::open(dir.path().to_path_buf(), config, None).await.unwrap();
        assert_eq!(state.store.review_url_base(), "https://review.example.com");
    }
}
