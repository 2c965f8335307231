//! Top-level access dispatch: routes by service, delegates to handlers.

use crate::access::handlers;
use crate::platform::Platform;
use crate::types::{AccessConfig, Error, Result};
use serde_json::Value;
use tokio::sync::mpsc;

/// Result from dispatching a request.
#[allow(missing_debug_implementations)]
pub enum DispatchResponse {
    /// Single response value (most endpoints).
    Single(Value),
    /// Streaming response: server writes each value as MSG_STREAM_CHUNK,
    /// then MSG_STREAM_END when the receiver closes.
    Stream(mpsc::Receiver<Value>),
}

/// Route an access request to the appropriate service handler.
pub async fn dispatch(
    platform: &Platform,
    service: &str,
    method: &str,
    body: Value,
    config: &AccessConfig,
) -> Result<DispatchResponse> {
    match service {
        "jobs" => handlers::jobs::handle(platform, method, body).await,
        "events" => handlers::events::handle(platform, method, body, config).await,
        "directory" => handlers::directory::handle(platform, method, body).await,
        _ => Err(Error::not_found(format!("unknown service: {}", service))),
    }
}

// =============================================================================
// Shared helpers used by all handler modules
// =============================================================================

pub fn str_field(body: &Value, key: &str) -> Result<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::validation(format!("missing required field: {}", key)))
}

pub fn opt_str_field(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
