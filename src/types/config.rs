//! Configuration structures.
//!
//! Configuration is loaded from environment variables and config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global platform configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Job executor configuration.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Access transport configuration.
    #[serde(default)]
    pub access: AccessConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Access server bind address (TCP).
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7420".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Job executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of jobs allowed to run concurrently.
    pub pool_size: usize,

    /// Bounded capacity of the pending-job queue. Submissions beyond this
    /// limit fail fast instead of growing memory without bound.
    pub queue_capacity: usize,

    /// How long shutdown waits for in-flight jobs before abandoning them.
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            queue_capacity: 256,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// Access transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Maximum frame payload size in bytes.
    pub max_frame_bytes: u32,

    /// Bounded channel capacity for streaming responses (Subscribe).
    pub stream_channel_capacity: usize,

    /// Maximum concurrent TCP connections. New connections beyond this limit
    /// are rejected until a slot opens.
    pub max_connections: usize,

    /// Read timeout in seconds per frame. Connections idle beyond this
    /// duration are dropped (prevents slowloris-style resource exhaustion).
    pub read_timeout_secs: u64,

    /// Write timeout in seconds per frame. Slow consumers that cannot
    /// accept a response within this window are dropped.
    pub write_timeout_secs: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 5 * 1024 * 1024,
            stream_channel_capacity: 64,
            max_connections: 1000,
            read_timeout_secs: 30,
            write_timeout_secs: 10,
        }
    }
}
