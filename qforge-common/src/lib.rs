//! # qforge Common Library
//!
//! Shared code for qforge services including:
//! - Error type and result alias
//! - Configuration loading (root folder, TOML config)
//! - Database schema initialization
//! - Event types (QfEvent enum) and the EventBus
//! - SSE helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
