//! Core types for the Fedra platform.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (JobId, EventId, etc.)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for server, executor, and access transport

mod config;
mod errors;
mod ids;

pub use config::{AccessConfig, Config, ExecutorConfig, ObservabilityConfig, ServerConfig};
pub use errors::{Error, Result};
pub use ids::{ConnectorId, EventId, JobId, SubscriptionId};
