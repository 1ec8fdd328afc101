//! Stage executor: runs one stage against the shared workflow state.
//!
//! Normal stages run their abilities in declared order. For each ability the
//! executor resolves its definition, selects a tool from the ability's pool,
//! projects the state into an `AbilityPayload`, invokes the tool through the
//! `ToolInvoker`, and merges the result back with the ability's merge rule.
//!
//! Four stages carry extra behavior:
//!
//! - `CHECKPOINT_HITL`: no abilities; assigns a checkpoint id, sets the pause
//!   status, and persists the full state through the `CheckpointStore`.
//! - `MATCH_TWO_WAY`: after its abilities, records `needs_hitl`.
//! - `HITL_DECISION`: after its abilities, reloads the reviewer's decision.
//! - `COMPLETE`: marks the run `COMPLETED` unless it already ended otherwise.

use std::sync::Arc;

use invoiceflow_types::error::RepositoryError;
use invoiceflow_types::state::{Decision, RunStatus, WorkflowState};
use invoiceflow_types::workflow::{
    CHECKPOINT_STAGE, COMPLETE_STAGE, DECISION_STAGE, MATCH_STAGE, StageDefinition,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::repository::checkpoint::CheckpointStore;
use crate::tool::{ToolError, ToolInvoker};

use super::context::RunContext;
use super::payload::AbilityPayload;
use super::pool::select_from_pool;
use super::spec::WorkflowSpec;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while executing a single stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    #[error("stage '{stage}': unknown ability '{ability}'")]
    UnknownAbility { stage: String, ability: String },

    #[error("stage '{stage}': tool pool '{pool}' for ability '{ability}' is empty or missing")]
    ToolPool {
        stage: String,
        ability: String,
        pool: String,
    },

    #[error("stage '{stage}': unknown tool '{server}.{tool}' for ability '{ability}'")]
    UnknownTool {
        stage: String,
        ability: String,
        server: String,
        tool: String,
    },

    #[error("stage '{stage}': ability '{ability}' failed: {source}")]
    Tool {
        stage: String,
        ability: String,
        #[source]
        source: ToolError,
    },

    #[error("stage '{stage}': ability '{ability}' returned a malformed result: {reason}")]
    MalformedResult {
        stage: String,
        ability: String,
        reason: String,
    },

    #[error("stage '{stage}' requires a checkpoint_id in state")]
    MissingCheckpoint { stage: String },

    #[error("stage '{stage}': no review record for checkpoint '{checkpoint_id}'")]
    CheckpointNotFound { stage: String, checkpoint_id: String },

    #[error("stage '{stage}': persistence error: {source}")]
    Persistence {
        stage: String,
        #[source]
        source: RepositoryError,
    },
}

impl StageError {
    /// Stage that raised the error.
    pub fn stage_id(&self) -> &str {
        match self {
            Self::UnknownStage(stage) => stage,
            Self::UnknownAbility { stage, .. }
            | Self::ToolPool { stage, .. }
            | Self::UnknownTool { stage, .. }
            | Self::Tool { stage, .. }
            | Self::MalformedResult { stage, .. }
            | Self::MissingCheckpoint { stage }
            | Self::CheckpointNotFound { stage, .. }
            | Self::Persistence { stage, .. } => stage,
        }
    }

    /// Machine-readable kind, used in audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownStage(_) => "unknown_stage",
            Self::UnknownAbility { .. } => "unknown_ability",
            Self::ToolPool { .. } => "tool_pool",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::Tool { .. } => "tool_failed",
            Self::MalformedResult { .. } => "malformed_result",
            Self::MissingCheckpoint { .. } => "missing_checkpoint",
            Self::CheckpointNotFound { .. } => "checkpoint_not_found",
            Self::Persistence { .. } => "persistence",
        }
    }
}

// ---------------------------------------------------------------------------
// StageExecutor
// ---------------------------------------------------------------------------

/// Executes individual stages.
///
/// Generic over the checkpoint store and tool invoker so the same code runs
/// against SQLite and local tools in production and in-memory fakes in tests.
pub struct StageExecutor<S: CheckpointStore, T: ToolInvoker> {
    spec: Arc<WorkflowSpec>,
    store: Arc<S>,
    tools: Arc<T>,
}

impl<S: CheckpointStore, T: ToolInvoker> StageExecutor<S, T> {
    pub fn new(spec: Arc<WorkflowSpec>, store: Arc<S>, tools: Arc<T>) -> Self {
        Self { spec, store, tools }
    }

    pub fn spec(&self) -> &WorkflowSpec {
        &self.spec
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Execute `stage_id`, mutating `state` in place.
    ///
    /// Sets `current_stage`, promotes a `NEW` run to `IN_PROGRESS`, and
    /// brackets the stage with `stage_start` / `stage_end` audit events.
    pub async fn execute(
        &self,
        stage_id: &str,
        state: &mut WorkflowState,
        ctx: &RunContext,
    ) -> Result<(), StageError> {
        let stage = self
            .spec
            .stage(stage_id)
            .ok_or_else(|| StageError::UnknownStage(stage_id.to_string()))?;

        state.current_stage = Some(stage_id.to_string());
        if state.status == RunStatus::New {
            state.status = RunStatus::InProgress;
        }
        state.log_event(
            stage_id,
            "stage_start",
            format!("Starting stage {stage_id}"),
            json!({}),
        );
        tracing::debug!(stage = stage_id, correlation_id = %ctx.correlation_id, "stage start");

        if stage_id == CHECKPOINT_STAGE {
            self.checkpoint(stage_id, state).await?;
        } else {
            self.run_abilities(stage, state, ctx).await?;

            if stage_id == MATCH_STAGE {
                self.evaluate_match(stage_id, state);
            }
            if stage_id == DECISION_STAGE {
                self.reload_decision(stage_id, state).await?;
            }
            if stage_id == COMPLETE_STAGE {
                complete(state);
            }
        }

        state.log_event(
            stage_id,
            "stage_end",
            format!("Completed stage {stage_id}"),
            json!({}),
        );
        tracing::debug!(stage = stage_id, status = %state.status, "stage end");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Abilities
    // -----------------------------------------------------------------------

    async fn run_abilities(
        &self,
        stage: &StageDefinition,
        state: &mut WorkflowState,
        ctx: &RunContext,
    ) -> Result<(), StageError> {
        let stage_id = stage.id.as_str();

        for name in &stage.abilities {
            let bound = self
                .spec
                .ability(name)
                .ok_or_else(|| StageError::UnknownAbility {
                    stage: stage_id.to_string(),
                    ability: name.clone(),
                })?;
            let server = bound.definition.server.as_str();
            let tool = bound.definition.tool.as_str();

            let selected_tool = match &bound.definition.bigtool_pool {
                Some(pool) => {
                    let pool_error = || StageError::ToolPool {
                        stage: stage_id.to_string(),
                        ability: name.clone(),
                        pool: pool.clone(),
                    };
                    let candidates = self.spec.pool(pool).ok_or_else(pool_error)?;
                    let preferred = ctx.preferred_tool(pool);
                    let selected = select_from_pool(candidates, preferred).ok_or_else(pool_error)?;
                    let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
                    state.log_event(
                        stage_id,
                        "bigtool_select",
                        format!("Selected tool '{}' from pool '{}'", selected.name, pool),
                        json!({
                            "pool": pool,
                            "selected_tool": selected.name,
                            "preferred_tool": preferred,
                            "candidates": names,
                        }),
                    );
                    tracing::debug!(
                        stage = stage_id,
                        ability = name.as_str(),
                        pool = pool.as_str(),
                        selected = selected.name.as_str(),
                        "tool selected from pool"
                    );
                    Some(selected.name.clone())
                }
                None => None,
            };

            let payload = AbilityPayload::from_state(state, selected_tool.as_deref()).to_value();

            state.log_event(
                stage_id,
                "ability_call",
                format!("Calling {server}.{tool}"),
                json!({
                    "server": server,
                    "tool": tool,
                    "ability": name,
                    "selected_tool": selected_tool,
                }),
            );
            tracing::debug!(stage = stage_id, ability = name.as_str(), server, tool, "ability call");

            let result = self
                .tools
                .invoke(server, tool, &payload)
                .await
                .map_err(|e| match e {
                    ToolError::UnknownServer(_) | ToolError::UnknownTool { .. } => {
                        StageError::UnknownTool {
                            stage: stage_id.to_string(),
                            ability: name.clone(),
                            server: server.to_string(),
                            tool: tool.to_string(),
                        }
                    }
                    other => StageError::Tool {
                        stage: stage_id.to_string(),
                        ability: name.clone(),
                        source: other,
                    },
                })?;

            let result_keys: Vec<&String> = result.keys().collect();
            state.log_event(
                stage_id,
                "ability_result",
                format!("Result received from {server}.{tool}"),
                json!({ "ability": name, "result_keys": result_keys }),
            );

            bound
                .ability
                .merge(state, result)
                .map_err(|e| StageError::MalformedResult {
                    stage: stage_id.to_string(),
                    ability: name.clone(),
                    reason: e.to_string(),
                })?;
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Special stages
    // -----------------------------------------------------------------------

    /// Persist the state for human review and pause.
    async fn checkpoint(&self, stage_id: &str, state: &mut WorkflowState) -> Result<(), StageError> {
        let checkpoint_id = state
            .checkpoint_id
            .get_or_insert_with(|| Uuid::now_v7().simple().to_string())
            .clone();
        state.status = self.spec.globals().hitl.pause_status;

        let review_url = self
            .store
            .enqueue(&checkpoint_id, state)
            .await
            .map_err(|source| StageError::Persistence {
                stage: stage_id.to_string(),
                source,
            })?;
        state.review_url = Some(review_url.clone());

        state.log_event(
            stage_id,
            "checkpoint_created",
            "Checkpoint created and state persisted for human review",
            json!({ "checkpoint_id": checkpoint_id, "review_url": review_url }),
        );
        tracing::info!(
            checkpoint_id = checkpoint_id.as_str(),
            review_url = review_url.as_str(),
            "run paused for human review"
        );
        Ok(())
    }

    fn evaluate_match(&self, stage_id: &str, state: &mut WorkflowState) {
        let threshold = self.spec.globals().match_threshold;
        let match_score = state.match_score.unwrap_or(0.0);
        let needs_hitl = match_score < threshold;
        state.needs_hitl = Some(needs_hitl);
        state.log_event(
            stage_id,
            "match_evaluated",
            "Computed needs_hitl based on match_threshold",
            json!({
                "match_score": match_score,
                "threshold": threshold,
                "needs_hitl": needs_hitl,
            }),
        );
    }

    /// Copy the reviewer's decision from the checkpoint record into state.
    ///
    /// `REJECT` and a missing decision both move the run to the configured
    /// reject status, so only an explicit `ACCEPT` can lead to `COMPLETED`.
    async fn reload_decision(&self, stage_id: &str, state: &mut WorkflowState) -> Result<(), StageError> {
        let checkpoint_id = state
            .checkpoint_id
            .clone()
            .ok_or_else(|| StageError::MissingCheckpoint {
                stage: stage_id.to_string(),
            })?;

        let record = self
            .store
            .get(&checkpoint_id)
            .await
            .map_err(|source| StageError::Persistence {
                stage: stage_id.to_string(),
                source,
            })?
            .ok_or_else(|| StageError::CheckpointNotFound {
                stage: stage_id.to_string(),
                checkpoint_id: checkpoint_id.clone(),
            })?;

        if let Some(decision) = record.decision {
            state.decision = Some(decision);
        }
        state.log_event(
            stage_id,
            "hitl_decision_loaded",
            "Loaded human decision from review queue",
            json!({ "checkpoint_id": checkpoint_id, "decision": record.decision }),
        );
        tracing::info!(
            checkpoint_id = checkpoint_id.as_str(),
            decision = ?record.decision,
            "human decision loaded"
        );

        let reject_status = self.spec.globals().hitl.reject_status;
        match state.decision {
            Some(Decision::Accept) => {}
            Some(Decision::Reject) => state.status = reject_status,
            None => {
                state.log_event(
                    stage_id,
                    "hitl_decision_missing",
                    "No decision recorded; routing to completion",
                    json!({ "checkpoint_id": checkpoint_id }),
                );
                tracing::warn!(checkpoint_id = checkpoint_id.as_str(), "resumed without a decision");
            }
        }
        Ok(())
    }
}

fn complete(state: &mut WorkflowState) {
    if !matches!(
        state.status,
        RunStatus::RequiresManualHandling | RunStatus::Failed
    ) {
        state.status = RunStatus::Completed;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
