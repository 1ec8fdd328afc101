//! Human review checkpoint records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{Decision, WorkflowState};

/// Status of a review-queue record.
///
/// Distinct from `RunStatus`: it tracks whether a reviewer has acted on the
/// checkpoint, not where the run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointStatus {
    /// Waiting for a reviewer.
    Paused,
    /// A decision has been recorded.
    Decided,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paused => "PAUSED",
            Self::Decided => "DECIDED",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAUSED" => Ok(Self::Paused),
            "DECIDED" => Ok(Self::Decided),
            other => Err(format!("invalid checkpoint status: '{other}'")),
        }
    }
}

/// One entry of the human review queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Primary key; equal to `state.checkpoint_id`.
    pub checkpoint_id: String,
    pub status: CheckpointStatus,
    /// Link handed to the reviewer.
    pub review_url: String,
    /// Full snapshot of the paused run.
    pub state: WorkflowState,
    /// When the checkpoint was (last) enqueued.
    pub created_at: DateTime<Utc>,
    /// When the latest decision was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decision: Option<Decision>,
}

impl CheckpointRecord {
    /// Build the review link for a checkpoint: `{base}/review/{checkpoint_id}`.
    pub fn review_url_for(base: &str, checkpoint_id: &str) -> String {
        format!("{}/review/{}", base.trim_end_matches('/'), checkpoint_id)
    }

    /// Whether the record has been waiting longer than `hours` without a decision.
    pub fn is_stale(&self, now: DateTime<Utc>, hours: i64) -> bool {
        self.status == CheckpointStatus::Paused
            && now.signed_duration_since(self.created_at) > chrono::Duration::hours(hours)
    }
}
