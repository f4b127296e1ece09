//! Topic content API handlers
//!
//! GET /topics/:topic_id/counters, POST /topics/:topic_id/audit,
//! POST /topics/:topic_id/clear

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::counters::recompute_counters;
use crate::error::{ApiError, ApiResult};
use crate::models::{AuditReport, TopicContentCounters};
use crate::services::{clear_topic, QualityAuditor, TopicClearReport};
use crate::AppState;

/// POST /topics/:topic_id/clear response
#[derive(Debug, Serialize, Deserialize)]
pub struct ClearTopicResponse {
    #[serde(flatten)]
    pub report: TopicClearReport,
    /// Counters recomputed after the clear
    pub counters: TopicContentCounters,
}

/// GET /topics/:topic_id/counters
///
/// Recomputes from the item tables rather than reading the cached row.
pub async fn get_counters(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> ApiResult<Json<TopicContentCounters>> {
    let counters = recompute_counters(&state.db, &topic_id).await?;
    Ok(Json(counters))
}

/// POST /topics/:topic_id/audit
pub async fn audit_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> ApiResult<Json<AuditReport>> {
    let topic = state
        .topic_source
        .load_topic(&topic_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Topic not found: {}", topic_id)))?;

    let report = QualityAuditor::new(state.db.clone(), state.config.clone())
        .audit(&topic)
        .await?;

    Ok(Json(report))
}

/// POST /topics/:topic_id/clear
///
/// Per-item failures are reported in the body, not as an error status.
pub async fn clear_topic_content(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> ApiResult<Json<ClearTopicResponse>> {
    let report = clear_topic(&state.db, &state.event_bus, &topic_id).await?;
    let counters = recompute_counters(&state.db, &topic_id).await?;

    tracing::info!(
        topic_id = %topic_id,
        tests_deleted = report.tests.deleted,
        flashcards_deleted = report.flashcards.deleted,
        failures = report.failures(),
        "Topic content cleared"
    );

    Ok(Json(ClearTopicResponse { report, counters }))
}

/// Build topic routes
pub fn topic_routes() -> Router<AppState> {
    Router::new()
        .route("/topics/:topic_id/counters", get(get_counters))
        .route("/topics/:topic_id/audit", post(audit_topic))
        .route("/topics/:topic_id/clear", post(clear_topic_content))
}
