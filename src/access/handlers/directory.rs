//! Directory service handler: read-only listing of registrations.

use crate::access::dispatch::DispatchResponse;
use crate::platform::Platform;
use crate::types::{Error, Result};
use serde_json::{json, Value};

pub async fn handle(platform: &Platform, method: &str, _body: Value) -> Result<DispatchResponse> {
    match method {
        "List" => {
            let services = platform.directory().entries().await;
            Ok(DispatchResponse::Single(json!({ "services": services })))
        }

        "Count" => {
            let count = platform.directory().count().await;
            Ok(DispatchResponse::Single(json!({ "count": count })))
        }

        _ => Err(Error::not_found(format!(
            "unknown directory method: {}",
            method
        ))),
    }
}
