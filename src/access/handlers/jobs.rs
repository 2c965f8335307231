//! Jobs service handler: submit, inspect, list, abort.

use crate::access::dispatch::{str_field, DispatchResponse};
use crate::jobs::JobDefinition;
use crate::platform::Platform;
use crate::types::{Error, JobId, Result};
use serde_json::{json, Value};

pub async fn handle(platform: &Platform, method: &str, body: Value) -> Result<DispatchResponse> {
    match method {
        "Submit" => {
            let raw = body
                .get("job")
                .cloned()
                .ok_or_else(|| Error::validation("missing required field: job"))?;
            let definition: JobDefinition = serde_json::from_value(raw)?;

            let id = platform.submit(&definition).await?;
            Ok(DispatchResponse::Single(json!({ "identifier": id })))
        }

        "Get" => {
            let id = job_id(&body)?;
            let snapshot = platform
                .executor()
                .snapshot(&id)
                .await
                .ok_or_else(|| Error::not_found(format!("job {}", id)))?;
            Ok(DispatchResponse::Single(serde_json::to_value(snapshot)?))
        }

        "Status" => {
            let id = job_id(&body)?;
            let snapshot = platform
                .executor()
                .snapshot(&id)
                .await
                .ok_or_else(|| Error::not_found(format!("job {}", id)))?;
            Ok(DispatchResponse::Single(json!({
                "identifier": id,
                "status": snapshot.status,
            })))
        }

        "Result" => {
            let id = job_id(&body)?;
            let snapshot = platform
                .executor()
                .snapshot(&id)
                .await
                .ok_or_else(|| Error::not_found(format!("job {}", id)))?;
            Ok(DispatchResponse::Single(json!({
                "identifier": id,
                "status": snapshot.status,
                "result": snapshot.result,
            })))
        }

        "List" => {
            let jobs = platform.executor().list().await;
            Ok(DispatchResponse::Single(json!({ "jobs": jobs })))
        }

        "Abort" => {
            let id = job_id(&body)?;
            let aborted = platform.executor().abort(&id).await?;
            Ok(DispatchResponse::Single(json!({
                "identifier": id,
                "aborted": aborted,
            })))
        }

        _ => Err(Error::not_found(format!("unknown jobs method: {}", method))),
    }
}

fn job_id(body: &Value) -> Result<JobId> {
    let raw = str_field(body, "identifier")?;
    JobId::from_string(raw).map_err(Error::validation)
}
