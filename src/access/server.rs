//! TCP access server: accept loop and per-connection handler.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::access::codec::{
    read_frame, write_frame, MSG_ERROR, MSG_REQUEST, MSG_RESPONSE, MSG_STREAM_CHUNK, MSG_STREAM_END,
};
use crate::access::dispatch::{self, DispatchResponse};
use crate::platform::Platform;
use crate::types::AccessConfig;

/// Encode a JSON value to msgpack. Logs and returns an error on failure
/// instead of silently producing an empty vec.
fn encode_msgpack(value: &serde_json::Value) -> std::io::Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| {
        tracing::error!(error = %e, "msgpack encoding failed");
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    })
}

/// Access server exposing the platform over TCP.
#[derive(Debug)]
pub struct AccessServer {
    platform: Arc<Platform>,
    addr: SocketAddr,
    cancel: CancellationToken,
    config: AccessConfig,
}

impl AccessServer {
    pub fn new(platform: Arc<Platform>, addr: SocketAddr, config: AccessConfig) -> Self {
        Self {
            platform,
            addr,
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Run the server until cancelled or a fatal error occurs.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        let conn_semaphore = Arc::new(Semaphore::new(self.config.max_connections));
        tracing::info!(
            addr = %self.addr,
            max_connections = self.config.max_connections,
            "access server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("access server shutting down");
                    break;
                }
                accept = listener.accept() => {
                    let (stream, peer) = accept?;

                    // Acquire connection permit (backpressure when at capacity).
                    let permit = match conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                %peer,
                                max_connections = self.config.max_connections,
                                "connection rejected: at capacity"
                            );
                            drop(stream);
                            continue;
                        }
                    };

                    tracing::debug!(
                        %peer,
                        active = self.config.max_connections - conn_semaphore.available_permits(),
                        "access connection opened"
                    );
                    let platform = self.platform.clone();
                    let cancel = self.cancel.clone();
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, platform, cancel, config, permit).await {
                            tracing::warn!(%peer, error = %e, "connection error");
                        }
                        // permit is dropped here, releasing the connection slot
                    });
                }
            }
        }
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Handle a single TCP connection: read frames → dispatch → write responses.
async fn handle_connection(
    stream: tokio::net::TcpStream,
    platform: Arc<Platform>,
    cancel: CancellationToken,
    config: AccessConfig,
    _permit: OwnedSemaphorePermit, // held for connection lifetime
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let read_timeout = Duration::from_secs(config.read_timeout_secs);
    let write_timeout = Duration::from_secs(config.write_timeout_secs);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame_result = tokio::time::timeout(read_timeout, read_frame(&mut reader, config.max_frame_bytes)) => {
                let frame = match frame_result {
                    Err(_elapsed) => {
                        tracing::debug!(
                            timeout_secs = config.read_timeout_secs,
                            "read timeout, dropping connection"
                        );
                        break;
                    }
                    Ok(result) => match result? {
                        Some(f) => f,
                        None => break, // clean EOF
                    },
                };

                let (msg_type, payload_bytes) = frame;

                if msg_type != MSG_REQUEST {
                    let err_payload = serde_json::json!({
                        "id": "",
                        "ok": false,
                        "error": {
                            "code": "INVALID_ARGUMENT",
                            "message": format!("unexpected message type: 0x{:02X}", msg_type),
                        }
                    });
                    let encoded = encode_msgpack(&err_payload)?;
                    timed_write(&mut writer, MSG_ERROR, &encoded, write_timeout).await?;
                    continue;
                }

                // Decode msgpack request
                let request: serde_json::Value = match rmp_serde::from_slice(&payload_bytes) {
                    Ok(v) => v,
                    Err(e) => {
                        let err_payload = serde_json::json!({
                            "id": "",
                            "ok": false,
                            "error": {
                                "code": "INVALID_ARGUMENT",
                                "message": format!("invalid msgpack: {}", e),
                            }
                        });
                        let encoded = encode_msgpack(&err_payload)?;
                        timed_write(&mut writer, MSG_ERROR, &encoded, write_timeout).await?;
                        continue;
                    }
                };

                let request_id = request.get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let service = request.get("service")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let method = request.get("method")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let body = request.get("body")
                    .cloned()
                    .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

                let result = dispatch::dispatch(&platform, service, method, body, &config).await;

                match result {
                    Ok(DispatchResponse::Single(response_body)) => {
                        let response = serde_json::json!({
                            "id": request_id,
                            "ok": true,
                            "body": response_body,
                        });
                        let encoded = encode_msgpack(&response)?;
                        timed_write(&mut writer, MSG_RESPONSE, &encoded, write_timeout).await?;
                    }
                    Ok(DispatchResponse::Stream(mut rx)) => {
                        // Stream chunks until the sender closes or the server stops
                        loop {
                            let chunk = tokio::select! {
                                _ = cancel.cancelled() => break,
                                chunk = rx.recv() => match chunk {
                                    Some(chunk) => chunk,
                                    None => break,
                                },
                            };
                            let frame = serde_json::json!({
                                "id": request_id,
                                "body": chunk,
                            });
                            let encoded = encode_msgpack(&frame)?;
                            timed_write(&mut writer, MSG_STREAM_CHUNK, &encoded, write_timeout).await?;
                        }
                        // End-of-stream sentinel
                        let end = serde_json::json!({ "id": request_id });
                        let encoded = encode_msgpack(&end)?;
                        timed_write(&mut writer, MSG_STREAM_END, &encoded, write_timeout).await?;
                    }
                    Err(e) => {
                        let response = serde_json::json!({
                            "id": request_id,
                            "ok": false,
                            "error": {
                                "code": e.to_wire_code(),
                                "message": e.to_string(),
                            }
                        });
                        let encoded = encode_msgpack(&response)?;
                        timed_write(&mut writer, MSG_ERROR, &encoded, write_timeout).await?;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Write a frame with a timeout. Returns an error if the write takes too long
/// (prevents slow consumers from holding connections indefinitely).
async fn timed_write<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
    timeout: Duration,
) -> std::io::Result<()> {
    tokio::time::timeout(timeout, write_frame(writer, msg_type, payload))
        .await
        .map_err(|_| {
            tracing::warn!(timeout_secs = timeout.as_secs(), "write timeout, dropping connection");
            std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")
        })?
}
