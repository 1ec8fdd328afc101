//! Checkpoint store trait definition.
//!
//! The review queue is the only state shared across processes: the engine
//! writes a snapshot when a run pauses and reads the decision on resume,
//! while the review surface writes the decision in between. Implementations
//! must make each operation atomic per checkpoint id.

use chrono::{DateTime, Utc};
use invoiceflow_types::checkpoint::{CheckpointRecord, CheckpointStatus};
use invoiceflow_types::error::RepositoryError;
use invoiceflow_types::state::{Decision, WorkflowState};

/// Storage for human review checkpoints.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CheckpointStore: Send + Sync {
    /// Upsert a snapshot under `checkpoint_id` and return its review URL.
    ///
    /// Always resets the record to `PAUSED` with no decision, so re-enqueueing
    /// the same id is idempotent.
    fn enqueue(
        &self,
        checkpoint_id: &str,
        state: &WorkflowState,
    ) -> impl std::future::Future<Output = Result<String, RepositoryError>> + Send;

    /// Fetch a record by id.
    fn get(
        &self,
        checkpoint_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<CheckpointRecord>, RepositoryError>> + Send;

    /// Record a reviewer decision and mark the record `DECIDED`.
    ///
    /// Fails with `RepositoryError::NotFound` when no record exists. A second
    /// call overwrites the first (last write wins) and refreshes `decided_at`.
    fn set_decision(
        &self,
        checkpoint_id: &str,
        decision: Decision,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List records newest first, optionally filtered by status and by
    /// `created_at < older_than`.
    fn list(
        &self,
        status: Option<CheckpointStatus>,
        older_than: Option<DateTime<Utc>>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<CheckpointRecord>, RepositoryError>> + Send;
}
