//! Workflow document types.
//!
//! These mirror the on-disk workflow document (JSON or YAML) one-to-one:
//! the stage list, the ability table, the named tool pools, and the global
//! parameters. They are plain serde shapes with no validation; the core
//! crate turns a `WorkflowDocument` into a checked, immutable `WorkflowSpec`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::RunStatus;

// ---------------------------------------------------------------------------
// Well-known stage ids
// ---------------------------------------------------------------------------

/// Entry stage of a full run.
pub const INTAKE_STAGE: &str = "INTAKE";
/// Stage whose result decides between human review and reconciliation.
pub const MATCH_STAGE: &str = "MATCH_TWO_WAY";
/// Stage that persists the state and pauses the run.
pub const CHECKPOINT_STAGE: &str = "CHECKPOINT_HITL";
/// Entry stage of a resumed run; reloads the human decision.
pub const DECISION_STAGE: &str = "HITL_DECISION";
/// Stage reached on a good match or an accepted review.
pub const RECONCILE_STAGE: &str = "RECONCILE";
/// Final bookkeeping stage.
pub const COMPLETE_STAGE: &str = "COMPLETE";

/// Stage ids the engine attaches behavior to. All must be present in a
/// valid workflow document.
pub const REQUIRED_STAGES: [&str; 6] = [
    INTAKE_STAGE,
    MATCH_STAGE,
    CHECKPOINT_STAGE,
    DECISION_STAGE,
    RECONCILE_STAGE,
    COMPLETE_STAGE,
];

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A workflow document exactly as read from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDocument {
    /// Optional workflow name, used only for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Ordered stage list. Order is significant for display only; execution
    /// order comes from `next` edges and routers.
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
    /// Ability name -> binding to a tool provider.
    #[serde(default)]
    pub abilities: BTreeMap<String, AbilityDefinition>,
    /// Named tool pools.
    #[serde(default)]
    pub bigtool: BigtoolSection,
    /// Global parameters (threshold, HITL statuses, review URL base).
    #[serde(default)]
    pub globals: WorkflowGlobals,
}

/// One stage of the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Unique stage id. Empty when the document omits it, which validation rejects.
    #[serde(default)]
    pub id: String,
    /// Free-form description shown by the CLI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Abilities executed in declared order.
    #[serde(default)]
    pub abilities: Vec<String>,
    /// Successor stage for linear stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Terminal stages route to the end of the graph unconditionally.
    #[serde(default)]
    pub terminal: bool,
}

/// Binding of an ability name to a logical provider group and tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityDefinition {
    /// Logical provider group (e.g. `COMMON`, `ATLAS`).
    pub server: String,
    /// Tool name within the provider group.
    pub tool: String,
    /// Optional pool from which a concrete tool candidate is chosen per call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bigtool_pool: Option<String>,
}

/// The `bigtool` section: named pools of interchangeable tool candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BigtoolSection {
    #[serde(default)]
    pub pools: BTreeMap<String, Vec<ToolCandidate>>,
}

/// One candidate inside a tool pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCandidate {
    /// Candidate name, passed to the tool as `selected_tool`.
    pub name: String,
    /// Any additional attributes the document carries (cost, region, ...).
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ToolCandidate {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: serde_json::Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Globals
// ---------------------------------------------------------------------------

/// Global workflow parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGlobals {
    /// Match score below which a run pauses for human review.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    /// Statuses used by the pause/decide protocol.
    #[serde(default)]
    pub hitl: HitlGlobals,
    /// Base URL used to build review links (`{base}/review/{checkpoint_id}`).
    #[serde(default = "default_review_url_base")]
    pub review_url_base: String,
}

/// Status settings for the human-in-the-loop protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitlGlobals {
    /// Status a run takes when it pauses at the checkpoint stage.
    #[serde(default = "default_pause_status")]
    pub pause_status: RunStatus,
    /// Status a run takes when the reviewer rejects it.
    #[serde(default = "default_reject_status")]
    pub reject_status: RunStatus,
}

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;
pub const DEFAULT_REVIEW_URL_BASE: &str = "http://localhost:8000";

fn default_match_threshold() -> f64 {
    DEFAULT_MATCH_THRESHOLD
}

fn default_review_url_base() -> String {
    DEFAULT_REVIEW_URL_BASE.to_string()
}

fn default_pause_status() -> RunStatus {
    RunStatus::Paused
}

fn default_reject_status() -> RunStatus {
    RunStatus::RequiresManualHandling
}

impl Default for WorkflowGlobals {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            hitl: HitlGlobals::default(),
            review_url_base: default_review_url_base(),
        }
    }
}

impl Default for HitlGlobals {
    fn default() -> Self {
        Self {
            pause_status: default_pause_status(),
            reject_status: default_reject_status(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
