//! External candidate generator
//!
//! The generator is an opaque service turning topic content into candidate
//! items. [`CandidateGenerator`] is the seam; [`HttpCandidateGenerator`] talks
//! JSON over HTTP to `{endpoint}/generate`.

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

use crate::models::{Candidate, ContentKind};

const USER_AGENT: &str = concat!("qforge-gen/", env!("CARGO_PKG_VERSION"));

/// Generator client errors
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Generator timed out after {0} ms")]
    Timeout(u64),

    #[error("Generator returned {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Generator rate limit exceeded")]
    RateLimited,

    #[error("No generator endpoint configured")]
    NotConfigured,
}

/// One generator call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub topic_id: String,
    pub topic_title: String,
    pub topic_content: String,
    pub section_hints: Vec<String>,
    pub kind: ContentKind,
    pub count: usize,
}

/// Decoded generator output
///
/// Entries that don't decode as a candidate are kept as `rejected` messages
/// so one malformed entry doesn't cost the whole batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedBatch {
    pub candidates: Vec<Candidate>,
    pub rejected: Vec<String>,
}

impl GeneratedBatch {
    pub fn len(&self) -> usize {
        self.candidates.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Candidate>> for GeneratedBatch {
    fn from(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            rejected: Vec::new(),
        }
    }
}

#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// Wait until the generator accepts another call
    ///
    /// Awaited outside the per-call timeout, so pacing never reads as a
    /// generator timeout.
    async fn wait_ready(&self) {}

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedBatch, GeneratorError>;
}

/// Stand-in used when no endpoint is configured; every call fails
pub struct UnconfiguredGenerator;

#[async_trait]
impl CandidateGenerator for UnconfiguredGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedBatch, GeneratorError> {
        Err(GeneratorError::NotConfigured)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Value>,
}

/// HTTP/JSON generator client
pub struct HttpCandidateGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpCandidateGenerator {
    /// `timeout` bounds each HTTP exchange; `requests_per_minute` paces calls
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        requests_per_minute: u32,
    ) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GeneratorError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CandidateGenerator for HttpCandidateGenerator {
    async fn wait_ready(&self) {
        self.rate_limiter.until_ready().await;
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedBatch, GeneratorError> {
        let url = format!("{}/generate", self.endpoint);
        tracing::debug!(
            url = %url,
            topic_id = %request.topic_id,
            kind = %request.kind,
            count = request.count,
            "Requesting candidates"
        );

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GeneratorError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GeneratorError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api(status.as_u16(), body));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Parse(e.to_string()))?;

        Ok(decode_candidates(body.candidates, request.kind))
    }
}

/// Decode raw entries one by one
///
/// Entries without a `kind` tag are assumed to be of the requested kind.
pub fn decode_candidates(entries: Vec<Value>, requested: ContentKind) -> GeneratedBatch {
    let default_tag = match requested {
        ContentKind::Tests => "test",
        ContentKind::Flashcards => "flashcard",
    };

    let mut batch = GeneratedBatch::default();
    for (index, mut entry) in entries.into_iter().enumerate() {
        if let Value::Object(map) = &mut entry {
            map.entry("kind")
                .or_insert_with(|| Value::String(default_tag.to_string()));
        }

        match serde_json::from_value::<Candidate>(entry) {
            Ok(candidate) => batch.candidates.push(candidate),
            Err(e) => batch.rejected.push(format!("entry {}: {}", index, e)),
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use serde_json::json;

    #[test]
    fn test_decode_keeps_good_entries() {
        let entries = vec![
            json!({ "front": "Osmosis", "back": "Diffusion of water", "tags": ["cells"] }),
            json!({ "front": 42 }),
            json!("not an object"),
        ];

        let batch = decode_candidates(entries, ContentKind::Flashcards);
        assert_eq!(batch.candidates.len(), 1);
        assert_eq!(batch.candidates[0].content_kind(), ContentKind::Flashcards);
        assert_eq!(batch.rejected.len(), 2);
        assert!(batch.rejected[0].starts_with("entry 1"));
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let generator =
            HttpCandidateGenerator::new("http://127.0.0.1:9/api/", None, Duration::from_secs(1), 30).unwrap();
        assert_eq!(generator.endpoint(), "http://127.0.0.1:9/api");
    }

    #[test]
    fn test_decode_respects_explicit_kind() {
        let entries = vec![json!({ "kind": "flashcard", "front": "Front", "back": "Back side" })];
        let batch = decode_candidates(entries, ContentKind::Tests);
        assert_eq!(batch.candidates[0].content_kind(), ContentKind::Flashcards);
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request(kind: ContentKind, count: usize) -> GenerationRequest {
        GenerationRequest {
            topic_id: "t1".to_string(),
            topic_title: "Cells".to_string(),
            topic_content: "Cells are the unit of life.".to_string(),
            section_hints: vec!["Organelles".to_string()],
            kind,
            count,
        }
    }

    #[tokio::test]
    async fn test_http_generator_round_trip() {
        let router = Router::new().route(
            "/generate",
            post(|headers: HeaderMap, Json(req): Json<GenerationRequest>| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer k3y")
                );
                let candidates: Vec<Value> = (0..req.count)
                    .map(|i| json!({ "front": format!("Front {}", i), "back": "Back side", "tags": ["t"] }))
                    .collect();
                Json(json!({ "candidates": candidates }))
            }),
        );
        let base = serve(router).await;

        let generator =
            HttpCandidateGenerator::new(format!("{}/", base), Some("k3y".to_string()), Duration::from_secs(5), 600)
                .unwrap();
        let batch = generator.generate(&request(ContentKind::Flashcards, 3)).await.unwrap();

        assert_eq!(batch.candidates.len(), 3);
        assert!(batch.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_http_generator_maps_status_errors() {
        let router = Router::new().route(
            "/generate",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
        );
        let base = serve(router).await;

        let generator = HttpCandidateGenerator::new(base, None, Duration::from_secs(5), 600).unwrap();
        match generator.generate(&request(ContentKind::Tests, 1)).await {
            Err(GeneratorError::Api(503, body)) => assert_eq!(body, "overloaded"),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_generator_fails() {
        let result = UnconfiguredGenerator.generate(&request(ContentKind::Tests, 1)).await;
        assert!(matches!(result, Err(GeneratorError::NotConfigured)));
    }
}
