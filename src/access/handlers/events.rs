//! Events service handler: publish and subscribe (streaming).

use crate::access::dispatch::{opt_str_field, str_field, DispatchResponse};
use crate::events::Event;
use crate::platform::Platform;
use crate::types::{AccessConfig, Error, Result};
use serde_json::{json, Value};
use tokio::sync::mpsc;

pub async fn handle(
    platform: &Platform,
    method: &str,
    body: Value,
    config: &AccessConfig,
) -> Result<DispatchResponse> {
    match method {
        "Publish" => {
            let event_type = str_field(&body, "type")?;
            let origin = str_field(&body, "origin")?;
            let description = body
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            let event = Event::new(event_type, origin, description);
            let identifier = event.identifier.clone();
            let delivered = platform.events().publish(event).await?;

            Ok(DispatchResponse::Single(json!({
                "identifier": identifier,
                "delivered": delivered,
            })))
        }

        "Subscribe" => {
            let origin = opt_str_field(&body, "origin");
            let event_type = opt_str_field(&body, "type");

            let (_subscription, mut event_rx) =
                platform.events().subscribe(origin, event_type).await?;

            // Bridge UnboundedReceiver<Event> → bounded mpsc::Receiver<Value>
            let (tx, rx) = mpsc::channel(config.stream_channel_capacity);
            tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    let chunk = match serde_json::to_value(&event) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to encode event");
                            continue;
                        }
                    };
                    if tx.send(chunk).await.is_err() {
                        break; // Consumer disconnected
                    }
                }
            });

            Ok(DispatchResponse::Stream(rx))
        }

        _ => Err(Error::not_found(format!(
            "unknown events method: {}",
            method
        ))),
    }
}
