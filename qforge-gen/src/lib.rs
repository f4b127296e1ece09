//! qforge-gen library interface
//!
//! Idempotent, quality-gated bulk generation of tests and flashcards per
//! topic. Exposes the pipeline services and the HTTP router for the binary
//! and for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use qforge_common::events::EventBus;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::GenerationConfig;
use crate::services::{CandidateGenerator, SqliteTopicSource, TopicGenerationController, TopicSource};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Fans progress out to SSE clients
    pub event_bus: EventBus,
    pub controller: Arc<TopicGenerationController>,
    pub topic_source: Arc<dyn TopicSource>,
    /// Parameters resolved at startup
    pub config: GenerationConfig,
    /// Cancellation tokens of runs executing in this process
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last failed run message, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// State over the `topics` table as topic source
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        generator: Arc<dyn CandidateGenerator>,
        config: GenerationConfig,
    ) -> Self {
        let topic_source: Arc<dyn TopicSource> = Arc::new(SqliteTopicSource::new(db.clone()));
        Self::with_topic_source(db, event_bus, generator, topic_source, config)
    }

    pub fn with_topic_source(
        db: SqlitePool,
        event_bus: EventBus,
        generator: Arc<dyn CandidateGenerator>,
        topic_source: Arc<dyn TopicSource>,
        config: GenerationConfig,
    ) -> Self {
        let controller = TopicGenerationController::new(
            db.clone(),
            event_bus.clone(),
            generator,
            topic_source.clone(),
            config.clone(),
        );

        Self {
            db,
            event_bus,
            controller: Arc::new(controller),
            topic_source,
            config,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::generation_routes())
        .merge(api::topic_routes())
        .route("/events", get(api::event_stream))
        .route("/generation/events", get(api::generation_event_stream))
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
