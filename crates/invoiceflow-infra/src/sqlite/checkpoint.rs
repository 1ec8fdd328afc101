//! SQLite human review queue.
//!
//! Implements `CheckpointStore` from `invoiceflow-core`. The full workflow
//! state is stored as JSON text in `state_json`; status and decision are
//! stored as their uppercase wire strings.

use chrono::{DateTime, SecondsFormat, Utc};
use invoiceflow_core::repository::checkpoint::CheckpointStore;
use invoiceflow_types::checkpoint::{CheckpointRecord, CheckpointStatus};
use invoiceflow_types::error::RepositoryError;
use invoiceflow_types::state::{Decision, WorkflowState};
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `CheckpointStore`.
pub struct SqliteCheckpointStore {
    pool: DatabasePool,
    review_url_base: String,
}

impl SqliteCheckpointStore {
    /// Create a review queue that builds links from `review_url_base`.
    pub fn new(pool: DatabasePool, review_url_base: impl Into<String>) -> Self {
        Self {
            pool,
            review_url_base: review_url_base.into(),
        }
    }

    pub fn review_url_base(&self) -> &str {
        &self.review_url_base
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ReviewRow {
    checkpoint_id: String,
    status: String,
    review_url: String,
    state_json: String,
    created_at: String,
    decided_at: Option<String>,
    decision: Option<String>,
}

impl ReviewRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            checkpoint_id: row.try_get("checkpoint_id")?,
            status: row.try_get("status")?,
            review_url: row.try_get("review_url")?,
            state_json: row.try_get("state_json")?,
            created_at: row.try_get("created_at")?,
            decided_at: row.try_get("decided_at")?,
            decision: row.try_get("decision")?,
        })
    }

    fn into_record(self) -> Result<CheckpointRecord, RepositoryError> {
        let status: CheckpointStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let state: WorkflowState = serde_json::from_str(&self.state_json)
            .map_err(|e| RepositoryError::Query(format!("invalid state_json: {e}")))?;
        let decision = self
            .decision
            .map(|d| d.parse::<Decision>())
            .transpose()
            .map_err(RepositoryError::Query)?;

        Ok(CheckpointRecord {
            checkpoint_id: self.checkpoint_id,
            status,
            review_url: self.review_url,
            state,
            created_at: parse_datetime(&self.created_at)?,
            decided_at: self.decided_at.as_deref().map(parse_datetime).transpose()?,
            decision,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so string comparison matches time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// CheckpointStore implementation
// ---------------------------------------------------------------------------

impl CheckpointStore for SqliteCheckpointStore {
    async fn enqueue(
        &self,
        checkpoint_id: &str,
        state: &WorkflowState,
    ) -> Result<String, RepositoryError> {
        let review_url = CheckpointRecord::review_url_for(&self.review_url_base, checkpoint_id);
        let state_json = serde_json::to_string(state)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize state: {e}")))?;
        let now = format_datetime(&Utc::now());

        sqlx::query(
            r#"INSERT INTO human_review_queue
                   (checkpoint_id, status, review_url, state_json, created_at, decided_at, decision)
               VALUES (?, ?, ?, ?, ?, NULL, NULL)
               ON CONFLICT (checkpoint_id) DO UPDATE SET
                   status = excluded.status,
                   review_url = excluded.review_url,
                   state_json = excluded.state_json,
                   created_at = excluded.created_at,
                   decided_at = NULL,
                   decision = NULL"#,
        )
        .bind(checkpoint_id)
        .bind(CheckpointStatus::Paused.as_str())
        .bind(&review_url)
        .bind(&state_json)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tracing::debug!(checkpoint_id, bytes = state_json.len(), "checkpoint enqueued");
        Ok(review_url)
    }

    async fn get(&self, checkpoint_id: &str) -> Result<Option<CheckpointRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM human_review_queue WHERE checkpoint_id = ?")
            .bind(checkpoint_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let review_row =
                    ReviewRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(review_row.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn set_decision(
        &self,
        checkpoint_id: &str,
        decision: Decision,
    ) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());

        let result = sqlx::query(
            "UPDATE human_review_queue SET decision = ?, status = ?, decided_at = ? WHERE checkpoint_id = ?",
        )
        .bind(decision.as_str())
        .bind(CheckpointStatus::Decided.as_str())
        .bind(&now)
        .bind(checkpoint_id)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tracing::info!(checkpoint_id, decision = decision.as_str(), "review decision recorded");
        Ok(())
    }

    async fn list(
        &self,
        status: Option<CheckpointStatus>,
        older_than: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<CheckpointRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM human_review_queue
               WHERE (?1 IS NULL OR status = ?1)
                 AND (?2 IS NULL OR created_at < ?2)
               ORDER BY created_at DESC
               LIMIT ?3"#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(older_than.as_ref().map(format_datetime))
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let review_row =
                ReviewRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            records.push(review_row.into_record()?);
        }
        Ok(records)
    }
}
