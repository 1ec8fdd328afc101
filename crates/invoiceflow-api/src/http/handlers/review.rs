//! Review queue handlers for the REST API.
//!
//! Reviewers list paused checkpoints, inspect the stored snapshot, and record
//! an ACCEPT/REJECT decision. Resuming the run is a separate step
//! (`invflow resume`); these handlers only touch the review queue.

use std::time::Instant;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use invoiceflow_core::repository::DEFAULT_LIST_LIMIT;
use invoiceflow_core::repository::checkpoint::CheckpointStore;
use invoiceflow_types::checkpoint::{CheckpointRecord, CheckpointStatus};
use invoiceflow_types::state::Decision;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// Query parameters for `GET /review`.
#[derive(Debug, Default, Deserialize)]
pub struct ListReviewQuery {
    /// `paused` (default), `decided`, or `all`.
    pub status: Option<String>,
    /// Only checkpoints paused for longer than this many hours.
    pub stale_hours: Option<i64>,
    /// Maximum results (default 50).
    pub limit: Option<u32>,
}

/// Body of `POST /review/{checkpoint_id}/decision`.
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: String,
}

/// Review-queue entry without the state snapshot.
#[derive(Debug, Serialize)]
pub struct ReviewSummary {
    pub checkpoint_id: String,
    pub status: CheckpointStatus,
    pub review_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    pub decision: Option<Decision>,
    pub invoice_id: Option<String>,
    pub match_score: Option<f64>,
}

impl From<&CheckpointRecord> for ReviewSummary {
    fn from(record: &CheckpointRecord) -> Self {
        Self {
            checkpoint_id: record.checkpoint_id.clone(),
            status: record.status,
            review_url: record.review_url.clone(),
            created_at: record.created_at,
            decided_at: record.decided_at,
            decision: record.decision,
            invoice_id: record.state.invoice_id.clone(),
            match_score: record.state.match_score,
        }
    }
}

/// Result of recording a decision.
#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub checkpoint_id: String,
    pub decision: Decision,
    pub status: CheckpointStatus,
}

/// Parse a `status` filter; `all` means no filter.
pub fn parse_status_filter(raw: Option<&str>) -> Result<Option<CheckpointStatus>, String> {
    match raw {
        None => Ok(Some(CheckpointStatus::Paused)),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => s.parse().map(Some),
    }
}

/// Cutoff for `stale_hours`; negative or out-of-range values are rejected.
pub fn stale_cutoff(hours: Option<i64>, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, String> {
    match hours {
        None => Ok(None),
        Some(h) if h < 0 => Err(format!("stale_hours must be non-negative, got {h}")),
        Some(h) => Duration::try_hours(h)
            .and_then(|age| now.checked_sub_signed(age))
            .map(Some)
            .ok_or_else(|| format!("stale_hours is out of range, got {h}")),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// GET /review - List review-queue entries, newest first.
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ListReviewQuery>,
) -> Result<Json<ApiResponse<Vec<ReviewSummary>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let status = parse_status_filter(query.status.as_deref()).map_err(AppError::Validation)?;
    let older_than = stale_cutoff(query.stale_hours, Utc::now()).map_err(AppError::Validation)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    let records = state.store.list(status, older_than, limit).await?;
    let summaries: Vec<ReviewSummary> = records.iter().map(ReviewSummary::from).collect();

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(
        ApiResponse::success(summaries, request_id, elapsed).with_link("self", "/review"),
    ))
}

/// GET /review/{checkpoint_id} - Full record including the state snapshot.
pub async fn get_review(
    State(state): State<AppState>,
    Path(checkpoint_id): Path<String>,
) -> Result<Json<ApiResponse<CheckpointRecord>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let record = state
        .store
        .get(&checkpoint_id)
        .await?
        .ok_or_else(|| AppError::CheckpointNotFound(checkpoint_id.clone()))?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(
        ApiResponse::success(record, request_id, elapsed)
            .with_link("self", &format!("/review/{checkpoint_id}"))
            .with_link("decision", &format!("/review/{checkpoint_id}/decision")),
    ))
}

/// POST /review/{checkpoint_id}/decision - Record ACCEPT or REJECT.
pub async fn post_decision(
    State(state): State<AppState>,
    Path(checkpoint_id): Path<String>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<DecisionResponse>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let Json(body) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let decision: Decision = body.decision.parse().map_err(AppError::Validation)?;

    state
        .store
        .set_decision(&checkpoint_id, decision)
        .await
        .map_err(|e| match e {
            invoiceflow_types::error::RepositoryError::NotFound => {
                AppError::CheckpointNotFound(checkpoint_id.clone())
            }
            other => AppError::Repository(other),
        })?;

    tracing::info!(checkpoint_id = checkpoint_id.as_str(), %decision, "decision submitted via API");

    let elapsed = start.elapsed().as_millis() as u64;
    let data = DecisionResponse {
        checkpoint_id: checkpoint_id.clone(),
        decision,
        status: CheckpointStatus::Decided,
    };
    Ok(Json(
        ApiResponse::success(data, request_id, elapsed)
            .with_link("review", &format!("/review/{checkpoint_id}")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use invoiceflow_core::workflow::RunContext;
    use invoiceflow_types::state::RunStatus;

    use crate::state::test_support::test_state;

    async fn paused_checkpoint(state: &AppState) -> String {
        let raw = serde_json::json!({
            "invoice_id": "INV-9",
            "vendor": {"name": "Globex"},
            "amount": 500,
            "po_ref": "PO-9",
            "force_mismatch": true,
        });
        let run = state
            .runner
            .start(raw.as_object().cloned().unwrap(), &RunContext::new("api-test"))
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Paused);
        run.checkpoint_id.unwrap()
    }

    fn decision_body(decision: &str) -> Result<Json<DecisionRequest>, JsonRejection> {
        Ok(Json(DecisionRequest {
            decision: decision.to_string(),
        }))
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_list_shows_paused_checkpoint() {
        let (_dir, state) = test_state().await;
        let id = paused_checkpoint(&state).await;

        let Json(resp) = list_reviews(State(state), Query(ListReviewQuery::default()))
            .await
            .unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].checkpoint_id, id);
        assert_eq!(data[0].invoice_id.as_deref(), Some("INV-9"));
        assert_eq!(data[0].match_score, Some(0.60));
    }

    #[tokio::test]
    async fn test_get_unknown_checkpoint_is_404() {
        let (_dir, state) = test_state().await;
        let err = get_review(State(state), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(
            err.into_response().status(),
            axum::http::StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_decision_then_get_shows_decided() {
        let (_dir, state) = test_state().await;
        let id = paused_checkpoint(&state).await;

        let Json(resp) = post_decision(State(state.clone()), Path(id.clone()), decision_body("accept"))
            .await
            .unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.decision, Decision::Accept);
        assert_eq!(data.status, CheckpointStatus::Decided);

        let Json(resp) = get_review(State(state), Path(id)).await.unwrap();
        let record = resp.data.unwrap();
        assert_eq!(record.status, CheckpointStatus::Decided);
        assert_eq!(record.decision, Some(Decision::Accept));
    }

    #[tokio::test]
    async fn test_decision_rejects_unknown_value() {
        let (_dir, state) = test_state().await;
        let id = paused_checkpoint(&state).await;

        let err = post_decision(State(state), Path(id), decision_body("maybe"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn test_decision_unknown_checkpoint_is_404() {
        let (_dir, state) = test_state().await;
        let err = post_decision(State(state), Path("nope".to_string()), decision_body("REJECT"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CheckpointNotFound(_)), "got: {err:?}");
    }

    #[test]
    fn test_parse_status_filter() {
        assert_eq!(parse_status_filter(None), Ok(Some(CheckpointStatus::Paused)));
        assert_eq!(parse_status_filter(Some("ALL")), Ok(None));
        assert_eq!(parse_status_filter(Some("decided")), Ok(Some(CheckpointStatus::Decided)));
        assert!(parse_status_filter(Some("bogus")).is_err());
    }

    #[test]
    fn test_stale_cutoff() {
        let now = Utc::now();
        assert_eq!(stale_cutoff(None, now), Ok(None));
        assert_eq!(stale_cutoff(Some(2), now), Ok(Some(now - Duration::hours(2))));
        assert!(stale_cutoff(Some(-1), now).is_err());

        for huge in [3_000_000_000_000, i64::MAX] {
            let err = stale_cutoff(Some(huge), now).unwrap_err();
            assert!(err.contains("out of range"), "got: {err}");
        }
    }

    #[tokio::test]
    async fn test_list_with_huge_stale_hours_is_validation_error() {
        let (_dir, state) = test_state().await;
        let query = ListReviewQuery {
            stale_hours: Some(3_000_000_000_000),
            ..ListReviewQuery::default()
        };
        let err = list_reviews(State(state), Query(query)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "got: {err:?}");
    }
}
