//! Workflow runner: drives a compiled graph from its entry stage to the end.
//!
//! # Execution flow
//!
//! 1. Promote the run to `IN_PROGRESS` (`run_started` for a new run,
//!    `run_resumed` for a paused one).
//! 2. Execute the current stage through the `StageExecutor`.
//! 3. Follow the stage's edge: `End` stops, `Next` moves on, `Branch` asks
//!    the router.
//! 4. On a stage error, mark the run `FAILED`, append `stage_failed`, and
//!    return a `RunError` carrying the failed state. Nothing is persisted.
//!
//! A run that reaches the checkpoint stage in the main graph ends with status
//! `PAUSED`. Continuing it is a separate invocation of the resume graph,
//! usually after `load_checkpoint_state` in a different process.

use std::sync::Arc;

use invoiceflow_types::checkpoint::CheckpointRecord;
use invoiceflow_types::state::{RunStatus, WorkflowState};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::Instrument;

use crate::repository::checkpoint::CheckpointStore;
use crate::tool::ToolInvoker;

use super::context::RunContext;
use super::executor::{StageError, StageExecutor};
use super::graph::{CompiledGraph, Edge, GraphCompiler};
use super::spec::{ConfigError, WorkflowSpec};

/// Stage label used for audit events emitted while reloading a checkpoint.
pub const RESUME_STAGE_LABEL: &str = "RESUME";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A run aborted by a stage error.
#[derive(Debug, Error)]
#[error("run failed at stage '{stage_id}': {source}")]
pub struct RunError {
    pub stage_id: String,
    #[source]
    pub source: StageError,
    /// State at the point of failure, with `status = FAILED`.
    pub state: Box<WorkflowState>,
}

/// Failure to continue a paused run.
#[derive(Debug, Error)]
pub enum ResumeError {
    /// The checkpoint could not be loaded.
    #[error("cannot load checkpoint: {0}")]
    Load(#[source] StageError),

    /// The checkpoint is still waiting for a reviewer.
    #[error("checkpoint '{0}' has no decision yet")]
    Undecided(String),

    /// The resumed run failed.
    #[error(transparent)]
    Run(#[from] RunError),
}

// ---------------------------------------------------------------------------
// WorkflowRunner
// ---------------------------------------------------------------------------

/// Owns the stage executor and both compiled graphs.
pub struct WorkflowRunner<S: CheckpointStore, T: ToolInvoker> {
    executor: StageExecutor<S, T>,
    main: CompiledGraph,
    resume: CompiledGraph,
}

impl<S: CheckpointStore, T: ToolInvoker> WorkflowRunner<S, T> {
    /// Compile both graphs for `spec` and wire the executor.
    pub fn new(spec: Arc<WorkflowSpec>, store: Arc<S>, tools: Arc<T>) -> Result<Self, ConfigError> {
        let (main, resume) = GraphCompiler::compile_both(&spec)?;
        Ok(Self {
            executor: StageExecutor::new(spec, store, tools),
            main,
            resume,
        })
    }

    pub fn main_graph(&self) -> &CompiledGraph {
        &self.main
    }

    pub fn resume_graph(&self) -> &CompiledGraph {
        &self.resume
    }

    pub fn spec(&self) -> &WorkflowSpec {
        self.executor.spec()
    }

    pub fn store(&self) -> &S {
        self.executor.store()
    }

    /// Start a fresh run over an invoice payload on the main graph.
    pub async fn start(
        &self,
        raw_payload: Map<String, Value>,
        ctx: &RunContext,
    ) -> Result<WorkflowState, RunError> {
        self.run(&self.main, WorkflowState::new(raw_payload), ctx).await
    }

    /// Reload a decided run and continue it on the resume graph.
    ///
    /// A checkpoint nobody has decided yet is refused before any stage runs.
    pub async fn resume(
        &self,
        checkpoint_id: &str,
        ctx: &RunContext,
    ) -> Result<WorkflowState, ResumeError> {
        let record = self.load_record(checkpoint_id).await.map_err(ResumeError::Load)?;
        if record.decision.is_none() {
            tracing::warn!(checkpoint_id, "resume refused, checkpoint not decided");
            return Err(ResumeError::Undecided(checkpoint_id.to_string()));
        }
        let state = resume_state(record);
        Ok(self.run(&self.resume, state, ctx).await?)
    }

    /// Read the persisted snapshot for `checkpoint_id`, ready for the
    /// resume graph.
    pub async fn load_checkpoint_state(&self, checkpoint_id: &str) -> Result<WorkflowState, StageError> {
        self.load_record(checkpoint_id).await.map(resume_state)
    }

    async fn load_record(&self, checkpoint_id: &str) -> Result<CheckpointRecord, StageError> {
        self.executor
            .store()
            .get(checkpoint_id)
            .await
            .map_err(|source| StageError::Persistence {
                stage: RESUME_STAGE_LABEL.to_string(),
                source,
            })?
            .ok_or_else(|| StageError::CheckpointNotFound {
                stage: RESUME_STAGE_LABEL.to_string(),
                checkpoint_id: checkpoint_id.to_string(),
            })
    }

    /// Drive `graph` from its entry stage until an `End` edge.
    pub async fn run(
        &self,
        graph: &CompiledGraph,
        state: WorkflowState,
        ctx: &RunContext,
    ) -> Result<WorkflowState, RunError> {
        let span = tracing::info_span!(
            "workflow_run",
            correlation_id = %ctx.correlation_id,
            entry = graph.entry(),
            mode = %graph.mode(),
        );
        self.run_inner(graph, state, ctx).instrument(span).await
    }

    async fn run_inner(
        &self,
        graph: &CompiledGraph,
        mut state: WorkflowState,
        ctx: &RunContext,
    ) -> Result<WorkflowState, RunError> {
        let entry = graph.entry();
        match state.status {
            RunStatus::New => {
                state.status = RunStatus::InProgress;
                state.log_event(
                    entry,
                    "run_started",
                    "Workflow run started",
                    json!({ "correlation_id": ctx.correlation_id, "mode": graph.mode().to_string() }),
                );
            }
            RunStatus::Paused => {
                state.status = RunStatus::InProgress;
                state.log_event(
                    entry,
                    "run_resumed",
                    "Workflow run resumed",
                    json!({
                        "correlation_id": ctx.correlation_id,
                        "checkpoint_id": state.checkpoint_id,
                        "mode": graph.mode().to_string(),
                    }),
                );
            }
            _ => {}
        }
        tracing::info!(invoice_id = ?state.invoice_id, "run started");

        let globals = self.executor.spec().globals();
        let mut current = entry.to_string();
        loop {
            if let Err(source) = self.executor.execute(&current, &mut state, ctx).await {
                return Err(fail(current, source, state));
            }

            let next = match graph.edge(&current) {
                Some(Edge::End) => break,
                Some(Edge::Next(next)) => next.clone(),
                Some(Edge::Branch(router)) => router.route(&mut state, globals).to_string(),
                None => {
                    let source = StageError::UnknownStage(current.clone());
                    return Err(fail(current, source, state));
                }
            };
            current = next;
        }

        tracing::info!(
            status = %state.status,
            checkpoint_id = ?state.checkpoint_id,
            last_stage = current.as_str(),
            "run finished"
        );
        Ok(state)
    }
}

fn fail(stage_id: String, source: StageError, mut state: WorkflowState) -> RunError {
    state.status = RunStatus::Failed;
    state.log_event(
        &stage_id,
        "stage_failed",
        source.to_string(),
        json!({ "error_kind": source.kind() }),
    );
    tracing::error!(stage = stage_id.as_str(), error = %source, "run failed");
    RunError {
        stage_id,
        source,
        state: Box::new(state),
    }
}

/// Snapshot from a checkpoint record with its identity re-asserted.
fn resume_state(record: CheckpointRecord) -> WorkflowState {
    let mut state = record.state;
    state.checkpoint_id = Some(record.checkpoint_id.clone());
    state.review_url = Some(record.review_url);
    state.log_event(
        RESUME_STAGE_LABEL,
        "resume_loaded",
        "Loaded state from review queue for resuming workflow",
        json!({ "checkpoint_id": record.checkpoint_id, "record_status": record.status }),
    );
    tracing::info!(checkpoint_id = record.checkpoint_id.as_str(), "checkpoint state loaded for resume");
    state
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
