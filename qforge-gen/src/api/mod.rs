//! HTTP API handlers for qforge-gen

pub mod generation;
pub mod health;
pub mod sse;
pub mod topics;

pub use generation::generation_routes;
pub use health::health_routes;
pub use sse::{event_stream, generation_event_stream};
pub use topics::topic_routes;
