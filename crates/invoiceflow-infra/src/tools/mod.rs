//! Local tool providers.
//!
//! Implements `ToolInvoker` from `invoiceflow-core` with two in-process
//! provider groups, `COMMON` and `ATLAS`. Each tool is a plain function over
//! the typed `AbilityPayload`; the invoker decodes the payload, dispatches on
//! (server, tool), and returns the tool's result object.

pub mod atlas;
pub mod common;

use std::fmt;
use std::str::FromStr;

use invoiceflow_core::tool::{ToolError, ToolInvoker};
use invoiceflow_core::workflow::payload::AbilityPayload;
use serde_json::{Map, Value};

/// Signature shared by every local tool.
pub(crate) type ToolFn = fn(&AbilityPayload) -> Value;

// ---------------------------------------------------------------------------
// ToolServer
// ---------------------------------------------------------------------------

/// A local provider group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolServer {
    Common,
    Atlas,
}

impl ToolServer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "COMMON",
            Self::Atlas => "ATLAS",
        }
    }

    fn lookup(&self, tool: &str) -> Option<ToolFn> {
        match self {
            Self::Common => common::lookup(tool),
            Self::Atlas => atlas::lookup(tool),
        }
    }

    /// Whether this group offers `tool`.
    pub fn provides(&self, tool: &str) -> bool {
        self.lookup(tool).is_some()
    }
}

impl fmt::Display for ToolServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolServer {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMMON" => Ok(Self::Common),
            "ATLAS" => Ok(Self::Atlas),
            other => Err(ToolError::UnknownServer(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// LocalToolInvoker
// ---------------------------------------------------------------------------

/// In-process `ToolInvoker` over the `COMMON` and `ATLAS` groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalToolInvoker;

impl LocalToolInvoker {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous dispatch; `invoke` wraps this.
    pub fn call(&self, server: &str, tool: &str, payload: &Value) -> Result<Map<String, Value>, ToolError> {
        let group: ToolServer = server.parse()?;
        let f = group.lookup(tool).ok_or_else(|| ToolError::UnknownTool {
            server: server.to_string(),
            tool: tool.to_string(),
        })?;

        let payload: AbilityPayload =
            serde_json::from_value(payload.clone()).map_err(|e| ToolError::Failed {
                tool: tool.to_string(),
                message: format!("invalid payload: {e}"),
            })?;

        match f(&payload) {
            Value::Object(map) => Ok(map),
            other => Err(ToolError::Failed {
                tool: tool.to_string(),
                message: format!("expected an object result, got {other}"),
            }),
        }
    }
}

impl ToolInvoker for LocalToolInvoker {
    async fn invoke(
        &self,
        server: &str,
        tool: &str,
        payload: &Value,
    ) -> Result<Map<String, Value>, ToolError> {
        tracing::trace!(server, tool, "local tool call");
        self.call(server, tool, payload)
    }
}

// ---------------------------------------------------------------------------
// Raw payload helpers
// ---------------------------------------------------------------------------

/// String view of a raw payload field; numbers are stringified, blanks skipped.
pub(crate) fn raw_str(raw: &Map<String, Value>, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric view of a raw payload field; numeric strings are accepted.
pub(crate) fn raw_f64(raw: &Map<String, Value>, key: &str) -> Option<f64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use invoiceflow_core::repository::checkpoint::CheckpointStore;
    use invoiceflow_core::workflow::{Ability, ResumeError, RunContext, WorkflowRunner, parse_workflow_json};
    use invoiceflow_types::checkpoint::CheckpointStatus;
    use invoiceflow_types::state::{Decision, RunStatus};
    use serde_json::json;

    use crate::sqlite::checkpoint::SqliteCheckpointStore;
    use crate::sqlite::pool::{DatabasePool, database_url_for};

    const WORKFLOW_JSON: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/workflow.json"));

    fn invoice(force_mismatch: bool) -> Map<String, Value> {
        json!({
            "invoice_id": "INV-1001",
            "vendor": {"name": "  Acme Supplies Pvt Ltd "},
            "amount": 1000,
            "currency": "INR",
            "po_ref": "PO-7781",
            "attachments": ["invoice.pdf"],
            "force_mismatch": force_mismatch,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    async fn sqlite_runner(dir: &std::path::Path) -> WorkflowRunner<SqliteCheckpointStore, LocalToolInvoker> {
        let spec = parse_workflow_json(WORKFLOW_JSON).unwrap();
        let pool = DatabasePool::new(&database_url_for(dir)).await.unwrap();
        let store = SqliteCheckpointStore::new(pool, spec.globals().review_url_base.clone());
        WorkflowRunner::new(Arc::new(spec), Arc::new(store), Arc::new(LocalToolInvoker)).unwrap()
    }

    #[test]
    fn test_every_ability_has_a_local_tool() {
        let spec = parse_workflow_json(WORKFLOW_JSON).unwrap();
        for ability in Ability::ALL {
            let def = &spec.ability(ability.as_str()).unwrap().definition;
            let server: ToolServer = def.server.parse().unwrap();
            assert!(server.provides(&def.tool), "missing {server}.{}", def.tool);
        }
    }

    #[test]
    fn test_unknown_server_and_tool() {
        let invoker = LocalToolInvoker::new();
        let err = invoker.call("MARS", "ocr_extract", &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::UnknownServer(_)), "got: {err}");

        let err = invoker.call("COMMON", "ocr_extract", &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool { .. }), "got: {err}");
    }

    #[test]
    fn test_malformed_payload_fails() {
        let err = LocalToolInvoker
            .call("COMMON", "normalize_vendor", &json!({"line_items": "nope"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }), "got: {err}");
    }

    #[test]
    fn test_raw_helpers() {
        let raw = json!({"a": 7, "b": "", "c": " 12.5 ", "d": true});
        let raw = raw.as_object().unwrap();
        assert_eq!(raw_str(raw, "a").as_deref(), Some("7"));
        assert_eq!(raw_str(raw, "b"), None);
        assert_eq!(raw_f64(raw, "c"), Some(12.5));
        assert_eq!(raw_f64(raw, "d"), None);
    }

    #[tokio::test]
    async fn test_end_to_end_pause_accept_resume_across_processes() {
        let dir = tempfile::tempdir().unwrap();

        let first = sqlite_runner(dir.path()).await;
        let paused = first
            .start(invoice(true), &RunContext::new("e2e-1"))
            .await
            .unwrap();
        assert_eq!(paused.status, RunStatus::Paused);
        assert_eq!(paused.match_score, Some(0.60));
        assert_eq!(
            paused.vendor.as_ref().unwrap().normalized_name.as_deref(),
            Some("ACME SUPPLIES PVT LTD")
        );
        let id = paused.checkpoint_id.clone().unwrap();
        drop(first);

        // A separate process records the reviewer's decision.
        let pool = DatabasePool::new(&database_url_for(dir.path())).await.unwrap();
        let reviewer = SqliteCheckpointStore::new(pool, "http://localhost:8000");
        reviewer.set_decision(&id, Decision::Accept).await.unwrap();

        let second = sqlite_runner(dir.path()).await;
        let done = second.resume(&id, &RunContext::new("e2e-2")).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.decision, Some(Decision::Accept));
        assert!(done.erp_post_result.as_ref().unwrap().posted);
        assert_eq!(done.accounting_entries.as_ref().unwrap().entries.len(), 2);
        assert!(done.final_payload.is_some());

        let record = reviewer.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, CheckpointStatus::Decided);
    }

    #[tokio::test]
    async fn test_end_to_end_reject_needs_manual_handling() {
        let dir = tempfile::tempdir().unwrap();
        let runner = sqlite_runner(dir.path()).await;

        let paused = runner.start(invoice(true), &RunContext::new("e2e-3")).await.unwrap();
        let id = paused.checkpoint_id.clone().unwrap();
        runner.store().set_decision(&id, Decision::Reject).await.unwrap();

        let done = runner.resume(&id, &RunContext::new("e2e-4")).await.unwrap();
        assert_eq!(done.status, RunStatus::RequiresManualHandling);
        assert!(done.erp_post_result.is_none());
    }

    #[tokio::test]
    async fn test_end_to_end_clean_invoice_completes_without_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let runner = sqlite_runner(dir.path()).await;

        let done = runner.start(invoice(false), &RunContext::new("e2e-5")).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert!(done.checkpoint_id.is_none());
        assert!(done.approval_result.as_ref().unwrap().approved);
    }

    #[tokio::test]
    async fn test_free_form_line_items_survive_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = sqlite_runner(dir.path()).await;

        let mut raw = invoice(true);
        raw.insert(
            "line_items".to_string(),
            json!([
                {"sku": "A1", "quantity": 2, "unit_price": 250.0, "amount": 500.0},
                {"description": "Widget", "quantity": 2, "unit_price": 250.0, "amount": 500.0,
                 "tax_rate": 0.18, "hsn_code": "8471"}
            ]),
        );

        let paused = runner.start(raw, &RunContext::new("e2e-lines")).await.unwrap();
        assert_eq!(paused.status, RunStatus::Paused);
        assert_eq!(paused.line_items.len(), 2);
        assert_eq!(paused.line_items[0].sku.as_deref(), Some("A1"));
        assert_eq!(paused.line_items[0].description, "");
        assert_eq!(paused.line_items[1].extra["hsn_code"], json!("8471"));

        let record = runner
            .store()
            .get(paused.checkpoint_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.state.line_items[1].extra["tax_rate"], json!(0.18));
    }

    #[tokio::test]
    async fn test_resume_unknown_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let runner = sqlite_runner(dir.path()).await;
        let err = runner.resume("nope", &RunContext::new("e2e-6")).await.unwrap_err();
        assert!(matches!(err, ResumeError::Load(_)), "got: {err}");
    }
}
