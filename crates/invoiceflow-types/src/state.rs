//! Workflow run state.
//!
//! `WorkflowState` is the single value threaded through every stage of a run.
//! It is persisted verbatim when a run pauses for review and reloaded on
//! resume, so every field must survive a serde round-trip unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::invoice::{
    AccountingEntries, ApprovalResult, ErpPostResult, LineItem, ParsedInvoice,
    RetrievalArtifacts, VendorProfile,
};

// ---------------------------------------------------------------------------
// Status / decision
// ---------------------------------------------------------------------------

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    New,
    InProgress,
    Paused,
    RequiresManualHandling,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InProgress => "IN_PROGRESS",
            Self::Paused => "PAUSED",
            Self::RequiresManualHandling => "REQUIRES_MANUAL_HANDLING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the run has finished (successfully or not) and will not resume.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::RequiresManualHandling | Self::Completed | Self::Failed
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "PAUSED" => Ok(Self::Paused),
            "REQUIRES_MANUAL_HANDLING" => Ok(Self::RequiresManualHandling),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}

/// A reviewer's decision on a paused run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    /// Case-insensitive: `accept`, `ACCEPT` and `Accept` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACCEPT" => Ok(Self::Accept),
            "REJECT" => Ok(Self::Reject),
            other => Err(format!("invalid decision: '{other}' (expected ACCEPT or REJECT)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// One structured audit event appended to `WorkflowState::logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// UTC timestamp, serialized as RFC 3339.
    pub ts: DateTime<Utc>,
    /// Stage that emitted the event.
    pub stage: String,
    /// Event kind (e.g. `stage_start`, `ability_call`, `route_decision`).
    pub event: String,
    /// Human-readable message.
    pub message: String,
    /// Structured event data.
    #[serde(default)]
    pub data: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Workflow state
// ---------------------------------------------------------------------------

/// The mutable state of one invoice run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    // Identity / input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub raw_payload: Map<String, Value>,
    #[serde(default)]
    pub attachments: Vec<Value>,

    // Understanding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_invoice: Option<ParsedInvoice>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,

    // Preparation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<VendorProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_flags: Option<Map<String, Value>>,

    // Retrieval / matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalArtifacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_hitl: Option<bool>,

    // Human review
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hitl_tool_result: Option<Value>,

    // Downstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounting_entries: Option<AccountingEntries>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_result: Option<ApprovalResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erp_post_result: Option<ErpPostResult>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub notify_result: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_payload: Option<Value>,

    // Run meta
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,

    /// Append-only audit trail.
    #[serde(default)]
    pub logs: Vec<LogEvent>,
}

impl WorkflowState {
    /// Fresh state for a new run over the given invoice payload.
    ///
    /// `attachments` is lifted out of the payload when present so stages can
    /// read it without digging through the raw map.
    pub fn new(raw_payload: Map<String, Value>) -> Self {
        let attachments = raw_payload
            .get("attachments")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Self {
            raw_payload,
            attachments,
            ..Self::default()
        }
    }

    /// Append an audit event. `data` should be a JSON object; any other
    /// value is stored under a `value` key.
    pub fn log_event(
        &mut self,
        stage: &str,
        event: &str,
        message: impl Into<String>,
        data: Value,
    ) {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self.logs.push(LogEvent {
            ts: Utc::now(),
            stage: stage.to_string(),
            event: event.to_string(),
            message: message.into(),
            data,
        });
    }

    /// Most recent audit event of the given kind, if any.
    pub fn last_event(&self, event: &str) -> Option<&LogEvent> {
        self.logs.iter().rev().find(|e| e.event == event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_state() -> WorkflowState {
        let raw = json!({
            "invoice_id": "INV-1001",
            "vendor": {"name": "Acme Supplies"},
            "amount": 1000,
            "attachments": [{"filename": "inv.pdf"}]
        });
        let mut state = WorkflowState::new(raw.as_object().unwrap().clone());
        state.invoice_id = Some("INV-1001".to_string());
        state.match_score = Some(0.6);
        state.needs_hitl = Some(true);
        state.vendor = Some(VendorProfile::new("Acme Supplies"));
        state.status = RunStatus::Paused;
        state.checkpoint_id = Some("abc123".to_string());
        state.log_event("MATCH_TWO_WAY", "match_evaluated", "Match evaluated", json!({"match_score": 0.6}));
        state
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_value(RunStatus::RequiresManualHandling).unwrap(),
            json!("REQUIRES_MANUAL_HANDLING")
        );
        assert_eq!(
            serde_json::to_value(RunStatus::InProgress).unwrap(),
            json!("IN_PROGRESS")
        );
    }

    #[test]
    fn test_status_from_str_roundtrip() {
        for status in [
            RunStatus::New,
            RunStatus::InProgress,
            RunStatus::Paused,
            RunStatus::RequiresManualHandling,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("SLEEPING".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_decision_parse_is_case_insensitive() {
        assert_eq!("accept".parse::<Decision>().unwrap(), Decision::Accept);
        assert_eq!("REJECT".parse::<Decision>().unwrap(), Decision::Reject);
        let err = "maybe".parse::<Decision>().unwrap_err();
        assert!(err.contains("MAYBE"), "got: {err}");
    }

    #[test]
    fn test_new_lifts_attachments() {
        let state = sample_state();
        assert_eq!(state.attachments.len(), 1);
        assert_eq!(state.status, RunStatus::Paused);
    }

    #[test]
    fn test_state_json_roundtrip_is_structurally_equal() {
        let state = sample_state();
        let json = serde_json::to_string(&state).unwrap();
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_log_event_wraps_non_object_data() {
        let mut state = WorkflowState::default();
        state.log_event("INTAKE", "note", "scalar", json!(42));
        state.log_event("INTAKE", "note", "none", Value::Null);
        assert_eq!(state.logs[0].data["value"], json!(42));
        assert!(state.logs[1].data.is_empty());
        assert_eq!(state.last_event("note").unwrap().message, "none");
    }

    #[test]
    fn test_missing_fields_default_to_new() {
        let state: WorkflowState = serde_json::from_value(json!({})).unwrap();
        assert_eq!(state.status, RunStatus::New);
        assert!(state.logs.is_empty());
        assert!(state.decision.is_none());
    }
}
