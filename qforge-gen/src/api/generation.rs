//! Generation run API handlers
//!
//! POST /topics/:topic_id/generate, GET /runs/:run_id,
//! GET /topics/:topic_id/runs, POST /runs/:run_id/cancel

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::runs;
use crate::error::{ApiError, ApiResult};
use crate::models::{GenerationMode, GenerationProgress, RunStatus};
use crate::services::RunRequest;
use crate::AppState;

const DEFAULT_RUN_LIST_LIMIT: i64 = 20;
const MAX_RUN_LIST_LIMIT: i64 = 200;

/// POST /topics/:topic_id/generate request
#[derive(Debug, Deserialize)]
pub struct StartGenerationRequest {
    pub mode: GenerationMode,
    #[serde(default)]
    pub tests_target: Option<usize>,
    #[serde(default)]
    pub flashcards_target: Option<usize>,
}

/// POST /topics/:topic_id/generate response
#[derive(Debug, Serialize, Deserialize)]
pub struct StartGenerationResponse {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
}

/// POST /runs/:run_id/cancel response
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelRunResponse {
    pub run_id: Uuid,
    pub cancel_requested: bool,
}

#[derive(Debug, Deserialize)]
pub struct RunListQuery {
    pub limit: Option<i64>,
}

/// POST /topics/:topic_id/generate
///
/// Starts a run in the background and returns 202 with its id.
pub async fn start_generation(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Json(body): Json<StartGenerationRequest>,
) -> ApiResult<(StatusCode, Json<StartGenerationResponse>)> {
    if state.topic_source.load_topic(&topic_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Topic not found: {}", topic_id)));
    }

    let request = RunRequest {
        topic_id: topic_id.clone(),
        mode: body.mode,
        tests_target: body.tests_target,
        flashcards_target: body.flashcards_target,
    };

    let progress = GenerationProgress::new(&topic_id, request.mode);
    let run_id = progress.run_id;
    let response = StartGenerationResponse {
        run_id,
        status: progress.status,
        started_at: progress.started_at,
    };

    // Persist before spawning so the run is visible to GET /runs/:run_id at once
    runs::save_run(&state.db, &progress).await?;

    let token = CancellationToken::new();
    state.cancellation_tokens.write().await.insert(run_id, token.clone());

    let task_state = state.clone();
    tokio::spawn(async move {
        let finished = task_state
            .controller
            .run_with_progress(progress, &request, token)
            .await;

        task_state.cancellation_tokens.write().await.remove(&run_id);

        if finished.status == RunStatus::Error {
            let message = finished
                .log
                .last()
                .cloned()
                .unwrap_or_else(|| "generation failed".to_string());
            *task_state.last_error.write().await = Some(format!("run {}: {}", run_id, message));
        }
    });

    tracing::info!(run_id = %run_id, topic_id = %topic_id, mode = body.mode.as_str(), "Generation run accepted");

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /runs/:run_id
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<GenerationProgress>> {
    let progress = runs::load_run(&state.db, run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run not found: {}", run_id)))?;

    Ok(Json(progress))
}

/// GET /topics/:topic_id/runs
pub async fn list_topic_runs(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Query(query): Query<RunListQuery>,
) -> ApiResult<Json<Vec<GenerationProgress>>> {
    let limit = query.limit.unwrap_or(DEFAULT_RUN_LIST_LIMIT);
    if limit < 1 {
        return Err(ApiError::BadRequest("limit must be at least 1".to_string()));
    }

    let runs = runs::list_runs_for_topic(&state.db, &topic_id, limit.min(MAX_RUN_LIST_LIMIT)).await?;
    Ok(Json(runs))
}

/// POST /runs/:run_id/cancel
///
/// The run stops at its next batch boundary and ends in the error status.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<CancelRunResponse>)> {
    if let Some(token) = state.cancellation_tokens.read().await.get(&run_id) {
        token.cancel();
        tracing::info!(run_id = %run_id, "Cancellation requested");
        return Ok((
            StatusCode::ACCEPTED,
            Json(CancelRunResponse { run_id, cancel_requested: true }),
        ));
    }

    match runs::load_run(&state.db, run_id).await? {
        None => Err(ApiError::NotFound(format!("Run not found: {}", run_id))),
        Some(progress) if progress.status.is_terminal() => Err(ApiError::Conflict(format!(
            "Run {} already {}",
            run_id,
            progress.status.as_str()
        ))),
        Some(_) => Err(ApiError::Conflict(format!(
            "Run {} is not executing in this process",
            run_id
        ))),
    }
}

/// Build generation routes
pub fn generation_routes() -> Router<AppState> {
    Router::new()
        .route("/topics/:topic_id/generate", post(start_generation))
        .route("/topics/:topic_id/runs", get(list_topic_runs))
        .route("/runs/:run_id", get(get_run))
        .route("/runs/:run_id/cancel", post(cancel_run))
}
