//! In-memory checkpoint store.
//!
//! Backed by a `DashMap`; `insert` and `get_mut` hold the shard lock for the
//! duration of each update, so operations on one checkpoint id are atomic.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use invoiceflow_types::checkpoint::{CheckpointRecord, CheckpointStatus};
use invoiceflow_types::error::RepositoryError;
use invoiceflow_types::state::{Decision, WorkflowState};
use invoiceflow_types::workflow::DEFAULT_REVIEW_URL_BASE;

use super::checkpoint::CheckpointStore;

/// Process-local `CheckpointStore`.
#[derive(Debug)]
pub struct InMemoryCheckpointStore {
    review_url_base: String,
    records: DashMap<String, CheckpointRecord>,
}

impl InMemoryCheckpointStore {
    pub fn new(review_url_base: impl Into<String>) -> Self {
        Self {
            review_url_base: review_url_base.into(),
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new(DEFAULT_REVIEW_URL_BASE)
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    async fn enqueue(
        &self,
        checkpoint_id: &str,
        state: &WorkflowState,
    ) -> Result<String, RepositoryError> {
        let review_url = CheckpointRecord::review_url_for(&self.review_url_base, checkpoint_id);
        let record = CheckpointRecord {
            checkpoint_id: checkpoint_id.to_string(),
            status: CheckpointStatus::Paused,
            review_url: review_url.clone(),
            state: state.clone(),
            created_at: Utc::now(),
            decided_at: None,
            decision: None,
        };
        self.records.insert(checkpoint_id.to_string(), record);
        tracing::debug!(checkpoint_id, "checkpoint enqueued (memory)");
        Ok(review_url)
    }

    async fn get(&self, checkpoint_id: &str) -> Result<Option<CheckpointRecord>, RepositoryError> {
        Ok(self.records.get(checkpoint_id).map(|r| r.value().clone()))
    }

    async fn set_decision(
        &self,
        checkpoint_id: &str,
        decision: Decision,
    ) -> Result<(), RepositoryError> {
        let mut record = self
            .records
            .get_mut(checkpoint_id)
            .ok_or(RepositoryError::NotFound)?;
        record.decision = Some(decision);
        record.status = CheckpointStatus::Decided;
        record.decided_at = Some(Utc::now());
        Ok(())
    }

    async fn list(
        &self,
        status: Option<CheckpointStatus>,
        older_than: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<CheckpointRecord>, RepositoryError> {
        let mut records: Vec<CheckpointRecord> = self
            .records
            .iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .filter(|r| older_than.is_none_or(|t| r.created_at < t))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit as usize);
        Ok(records)
    }
}
