//! Access protocol integration tests: codec, dispatch, platform round-trips.

use async_trait::async_trait;
use fedra_core::access::codec::{
    write_frame, MSG_ERROR, MSG_REQUEST, MSG_RESPONSE, MSG_STREAM_CHUNK,
};
use fedra_core::access::AccessServer;
use fedra_core::jobs::{Job, JobContext, JobDefinition, JobFactory};
use fedra_core::platform::Platform;
use fedra_core::{Config, Reply};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

// =============================================================================
// Test jobs and factory
// =============================================================================

/// Echoes its payload back as the success payload.
struct EchoJob {
    name: String,
    payload: serde_json::Value,
}

#[async_trait]
impl Job for EchoJob {
    fn job_type(&self) -> &str {
        "test.echo"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn payload(&self) -> serde_json::Value {
        self.payload.clone()
    }

    async fn run(&self, _ctx: &JobContext) -> fedra_core::Result<Reply> {
        Ok(Reply::success_with(json!({ "echo": self.payload })))
    }
}

/// Holds a worker slot long enough for queue-level assertions.
struct SlowJob;

#[async_trait]
impl Job for SlowJob {
    fn job_type(&self) -> &str {
        "test.slow"
    }

    fn name(&self) -> &str {
        "slow"
    }

    fn payload(&self) -> serde_json::Value {
        json!({})
    }

    async fn run(&self, _ctx: &JobContext) -> fedra_core::Result<Reply> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        Ok(Reply::success())
    }
}

struct TestFactory;

impl JobFactory for TestFactory {
    fn handles(&self, job_type: &str) -> bool {
        matches!(job_type, "test.echo" | "test.slow")
    }

    fn deserialize(&self, definition: &JobDefinition) -> fedra_core::Result<Box<dyn Job>> {
        match definition.job_type.as_str() {
            "test.slow" => Ok(Box::new(SlowJob)),
            _ => Ok(Box::new(EchoJob {
                name: definition.name.clone(),
                payload: definition.payload.clone(),
            })),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Helper: spin up an AccessServer on a random port with a single-worker
/// executor, return (addr, platform, server_task).
async fn start_test_server() -> (
    std::net::SocketAddr,
    Arc<Platform>,
    tokio::task::JoinHandle<()>,
) {
    let mut config = Config::default();
    config.executor.pool_size = 1;
    config.executor.queue_capacity = 16;

    let platform = Arc::new(Platform::new(config.clone()));
    platform.install_builtins().await.unwrap();
    platform.factories().register(Arc::new(TestFactory)).await;

    // Bind temporarily to get a free port, then drop immediately
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let server_platform = platform.clone();
    let access_config = config.access.clone();
    let handle = tokio::spawn(async move {
        let server = AccessServer::new(server_platform, addr, access_config);
        let _ = server.serve().await;
    });

    // Give the server a moment to bind
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    (addr, platform, handle)
}

/// Helper: send a request frame, receive and decode the response.
async fn round_trip(
    stream: &mut TcpStream,
    service: &str,
    method: &str,
    body: serde_json::Value,
) -> (u8, serde_json::Value) {
    let request = serde_json::json!({
        "id": "test-1",
        "service": service,
        "method": method,
        "body": body,
    });

    let payload = rmp_serde::to_vec_named(&request).unwrap();
    write_frame(stream, MSG_REQUEST, &payload).await.unwrap();

    read_response_frame(stream).await
}

/// Helper: read one frame off the wire and decode its msgpack payload.
async fn read_response_frame(stream: &mut TcpStream) -> (u8, serde_json::Value) {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let frame_len = u32::from_be_bytes(len_buf) as usize;
    let mut frame_data = vec![0u8; frame_len];
    stream.read_exact(&mut frame_data).await.unwrap();

    let msg_type = frame_data[0];
    let payload: serde_json::Value = rmp_serde::from_slice(&frame_data[1..]).unwrap();
    (msg_type, payload)
}

/// Helper: submit a job definition, return its identifier.
async fn submit_job(stream: &mut TcpStream, definition: serde_json::Value) -> String {
    let (msg_type, response) = round_trip(
        stream,
        "jobs",
        "Submit",
        serde_json::json!({ "job": definition }),
    )
    .await;
    assert_eq!(msg_type, MSG_RESPONSE);
    assert_eq!(response.get("ok").unwrap().as_bool().unwrap(), true);
    response
        .get("body")
        .unwrap()
        .get("identifier")
        .unwrap()
        .as_str()
        .unwrap()
        .to_string()
}

/// Helper: poll jobs.Result until the job reaches Completed.
async fn await_job_result(stream: &mut TcpStream, id: &str) -> serde_json::Value {
    for _ in 0..100 {
        let (msg_type, response) = round_trip(
            stream,
            "jobs",
            "Result",
            serde_json::json!({ "identifier": id }),
        )
        .await;
        assert_eq!(msg_type, MSG_RESPONSE);
        let body = response.get("body").unwrap();
        if body.get("status").unwrap().as_str().unwrap() == "completed" {
            return body.clone();
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("job {} did not complete in time", id);
}

// =============================================================================
// Jobs service tests
// =============================================================================

#[tokio::test]
async fn test_submit_job_round_trip() {
    let (addr, _platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let id = submit_job(
        &mut stream,
        json!({
            "name": "echo-1",
            "type": "test.echo",
            "payload": {"value": 42},
        }),
    )
    .await;
    assert!(!id.is_empty());

    let body = await_job_result(&mut stream, &id).await;
    let result = body.get("result").unwrap();
    assert_eq!(result.get("kind").unwrap().as_str().unwrap(), "success");
    assert_eq!(
        result.get("payload").unwrap().get("echo").unwrap(),
        &json!({"value": 42}),
    );
}

#[tokio::test]
async fn test_unknown_service_returns_error() {
    let (addr, _platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) =
        round_trip(&mut stream, "nonexistent", "Foo", serde_json::json!({})).await;

    assert_eq!(msg_type, MSG_ERROR);
    assert_eq!(response.get("ok").unwrap().as_bool().unwrap(), false);
    let error = response.get("error").unwrap();
    assert_eq!(error.get("code").unwrap().as_str().unwrap(), "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_job_type_returns_error() {
    let (addr, _platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) = round_trip(
        &mut stream,
        "jobs",
        "Submit",
        json!({
            "job": {
                "name": "mystery",
                "type": "test.unregistered",
            },
        }),
    )
    .await;

    assert_eq!(msg_type, MSG_ERROR);
    let error = response.get("error").unwrap();
    assert_eq!(
        error.get("code").unwrap().as_str().unwrap(),
        "UNKNOWN_JOB_TYPE"
    );
    let msg = error.get("message").unwrap().as_str().unwrap();
    assert!(
        msg.contains("test.unregistered"),
        "error should mention the type tag: {}",
        msg
    );
}

#[tokio::test]
async fn test_get_and_status_round_trip() {
    let (addr, _platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let id = submit_job(
        &mut stream,
        json!({
            "name": "echo-status",
            "type": "test.echo",
            "payload": {},
        }),
    )
    .await;

    // Get returns the full snapshot
    let (msg_type, response) = round_trip(
        &mut stream,
        "jobs",
        "Get",
        json!({ "identifier": id }),
    )
    .await;
    assert_eq!(msg_type, MSG_RESPONSE);
    let body = response.get("body").unwrap();
    assert_eq!(body.get("identifier").unwrap().as_str().unwrap(), id);
    assert_eq!(body.get("name").unwrap().as_str().unwrap(), "echo-status");
    assert_eq!(body.get("type").unwrap().as_str().unwrap(), "test.echo");

    // Status returns identifier plus lifecycle state
    let (msg_type, response) = round_trip(
        &mut stream,
        "jobs",
        "Status",
        json!({ "identifier": id }),
    )
    .await;
    assert_eq!(msg_type, MSG_RESPONSE);
    let body = response.get("body").unwrap();
    let status = body.get("status").unwrap().as_str().unwrap();
    assert!(
        matches!(status, "scheduled" | "running" | "completed"),
        "unexpected status: {}",
        status
    );
}

#[tokio::test]
async fn test_get_missing_job_not_found() {
    let (addr, _platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) = round_trip(
        &mut stream,
        "jobs",
        "Get",
        json!({ "identifier": "00000000-0000-0000-0000-000000000000" }),
    )
    .await;

    assert_eq!(msg_type, MSG_ERROR);
    let error = response.get("error").unwrap();
    assert_eq!(error.get("code").unwrap().as_str().unwrap(), "NOT_FOUND");
}

#[tokio::test]
async fn test_list_jobs() {
    let (addr, _platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let first = submit_job(
        &mut stream,
        json!({"name": "list-a", "type": "test.echo", "payload": {}}),
    )
    .await;
    let second = submit_job(
        &mut stream,
        json!({"name": "list-b", "type": "test.echo", "payload": {}}),
    )
    .await;

    let (msg_type, response) = round_trip(&mut stream, "jobs", "List", json!({})).await;
    assert_eq!(msg_type, MSG_RESPONSE);
    let jobs = response
        .get("body")
        .unwrap()
        .get("jobs")
        .unwrap()
        .as_array()
        .unwrap();
    assert_eq!(jobs.len(), 2);

    let ids: Vec<&str> = jobs
        .iter()
        .map(|j| j.get("identifier").unwrap().as_str().unwrap())
        .collect();
    assert!(ids.contains(&first.as_str()));
    assert!(ids.contains(&second.as_str()));
}

#[tokio::test]
async fn test_abort_queued_job() {
    let (addr, _platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // First job occupies the single worker slot; second stays queued
    let _running = submit_job(
        &mut stream,
        json!({"name": "slow-1", "type": "test.slow"}),
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let queued = submit_job(
        &mut stream,
        json!({"name": "slow-2", "type": "test.slow"}),
    )
    .await;

    let (msg_type, response) = round_trip(
        &mut stream,
        "jobs",
        "Abort",
        json!({ "identifier": queued }),
    )
    .await;
    assert_eq!(msg_type, MSG_RESPONSE);
    let body = response.get("body").unwrap();
    assert_eq!(body.get("aborted").unwrap().as_bool().unwrap(), true);

    // The aborted job is terminal with a failure reply
    let body = await_job_result(&mut stream, &queued).await;
    let result = body.get("result").unwrap();
    assert_eq!(result.get("kind").unwrap().as_str().unwrap(), "failure");
}

// =============================================================================
// Events service tests
// =============================================================================

#[tokio::test]
async fn test_events_publish_round_trip() {
    let (addr, _platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) = round_trip(
        &mut stream,
        "events",
        "Publish",
        json!({
            "type": "test.event",
            "origin": "integration-test",
            "description": "hello",
        }),
    )
    .await;

    assert_eq!(msg_type, MSG_RESPONSE);
    assert_eq!(response.get("ok").unwrap().as_bool().unwrap(), true);
    let body = response.get("body").unwrap();
    assert!(!body.get("identifier").unwrap().as_str().unwrap().is_empty());
    // No subscribers registered yet
    assert_eq!(body.get("delivered").unwrap().as_u64().unwrap(), 0);
}

#[tokio::test]
async fn test_events_publish_requires_type() {
    let (addr, _platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (msg_type, response) = round_trip(
        &mut stream,
        "events",
        "Publish",
        json!({ "origin": "integration-test" }),
    )
    .await;

    assert_eq!(msg_type, MSG_ERROR);
    let error = response.get("error").unwrap();
    assert_eq!(
        error.get("code").unwrap().as_str().unwrap(),
        "INVALID_ARGUMENT"
    );
}

#[tokio::test]
async fn test_events_subscribe_stream() {
    let (addr, _platform, _handle) = start_test_server().await;

    // Connection 1: subscribe to a filtered event type
    let mut sub_stream = TcpStream::connect(addr).await.unwrap();
    let sub_request = serde_json::json!({
        "id": "sub-1",
        "service": "events",
        "method": "Subscribe",
        "body": { "type": "test.stream" },
    });
    let payload = rmp_serde::to_vec_named(&sub_request).unwrap();
    write_frame(&mut sub_stream, MSG_REQUEST, &payload)
        .await
        .unwrap();

    // Give subscription time to register
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Connection 2: publish matching and non-matching events
    let mut pub_stream = TcpStream::connect(addr).await.unwrap();
    let (msg_type, _) = round_trip(
        &mut pub_stream,
        "events",
        "Publish",
        json!({"type": "test.noise", "origin": "stream-test"}),
    )
    .await;
    assert_eq!(msg_type, MSG_RESPONSE);

    for i in 0..3 {
        let (msg_type, response) = round_trip(
            &mut pub_stream,
            "events",
            "Publish",
            json!({
                "type": "test.stream",
                "origin": "stream-test",
                "description": format!("seq {}", i),
            }),
        )
        .await;
        assert_eq!(msg_type, MSG_RESPONSE);
        let body = response.get("body").unwrap();
        assert_eq!(body.get("delivered").unwrap().as_u64().unwrap(), 1);
    }

    // Read stream chunks from the subscriber connection; the non-matching
    // event must not appear
    for i in 0..3 {
        let (msg_type, chunk) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            read_response_frame(&mut sub_stream),
        )
        .await
        .expect("Timed out waiting for stream chunk");

        assert_eq!(msg_type, MSG_STREAM_CHUNK);
        assert_eq!(chunk.get("id").unwrap().as_str().unwrap(), "sub-1");
        let body = chunk.get("body").unwrap();
        assert_eq!(body.get("type").unwrap().as_str().unwrap(), "test.stream");
        assert_eq!(
            body.get("origin").unwrap().as_str().unwrap(),
            "stream-test"
        );
        assert_eq!(
            body.get("description").unwrap().as_str().unwrap(),
            format!("seq {}", i)
        );
    }

    drop(sub_stream);
}

#[tokio::test]
async fn test_job_lifecycle_events_on_the_wire() {
    let (addr, _platform, _handle) = start_test_server().await;

    // Subscribe to completion events before submitting
    let mut sub_stream = TcpStream::connect(addr).await.unwrap();
    let sub_request = serde_json::json!({
        "id": "sub-lifecycle",
        "service": "events",
        "method": "Subscribe",
        "body": { "type": "job.completed" },
    });
    let payload = rmp_serde::to_vec_named(&sub_request).unwrap();
    write_frame(&mut sub_stream, MSG_REQUEST, &payload)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let mut job_stream = TcpStream::connect(addr).await.unwrap();
    let id = submit_job(
        &mut job_stream,
        json!({"name": "observed", "type": "test.echo", "payload": {}}),
    )
    .await;

    let (msg_type, chunk) = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        read_response_frame(&mut sub_stream),
    )
    .await
    .expect("Timed out waiting for completion event");

    assert_eq!(msg_type, MSG_STREAM_CHUNK);
    let body = chunk.get("body").unwrap();
    assert_eq!(
        body.get("type").unwrap().as_str().unwrap(),
        "job.completed"
    );
    assert_eq!(body.get("origin").unwrap().as_str().unwrap(), "executor");
    let description = body.get("description").unwrap().as_str().unwrap();
    assert!(
        description.contains(&id),
        "description should mention the job id: {}",
        description
    );
}

// =============================================================================
// Directory service tests
// =============================================================================

/// Minimal service handle for directory registration.
#[derive(Debug, Clone)]
struct ProbeHandle;

#[tokio::test]
async fn test_directory_list_and_count() {
    let (addr, platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Core services (events, factories, executor) self-register at startup
    let (msg_type, response) = round_trip(&mut stream, "directory", "Count", json!({})).await;
    assert_eq!(msg_type, MSG_RESPONSE);
    assert_eq!(
        response
            .get("body")
            .unwrap()
            .get("count")
            .unwrap()
            .as_u64()
            .unwrap(),
        3
    );

    platform
        .directory()
        .register_with_metadata(
            ProbeHandle,
            [("role".to_string(), json!("probe"))].into_iter().collect(),
        )
        .await;

    let (msg_type, response) = round_trip(&mut stream, "directory", "List", json!({})).await;
    assert_eq!(msg_type, MSG_RESPONSE);
    let services = response
        .get("body")
        .unwrap()
        .get("services")
        .unwrap()
        .as_array()
        .unwrap();
    assert_eq!(services.len(), 4);
    let entry = services
        .iter()
        .find(|e| {
            e.get("type_name")
                .unwrap()
                .as_str()
                .unwrap()
                .contains("ProbeHandle")
        })
        .expect("probe registration should be listed");
    assert_eq!(
        entry.get("metadata").unwrap().get("role").unwrap(),
        &json!("probe")
    );

    let (msg_type, response) = round_trip(&mut stream, "directory", "Count", json!({})).await;
    assert_eq!(msg_type, MSG_RESPONSE);
    assert_eq!(
        response
            .get("body")
            .unwrap()
            .get("count")
            .unwrap()
            .as_u64()
            .unwrap(),
        4
    );
}

// =============================================================================
// Protocol-level tests
// =============================================================================

#[tokio::test]
async fn test_non_request_frame_rejected() {
    let (addr, _platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // A stream-chunk frame is not a valid client message
    let payload = rmp_serde::to_vec_named(&json!({"id": "x"})).unwrap();
    write_frame(&mut stream, MSG_STREAM_CHUNK, &payload)
        .await
        .unwrap();

    let (msg_type, response) = read_response_frame(&mut stream).await;
    assert_eq!(msg_type, MSG_ERROR);
    let error = response.get("error").unwrap();
    assert_eq!(
        error.get("code").unwrap().as_str().unwrap(),
        "INVALID_ARGUMENT"
    );
}

#[tokio::test]
async fn test_invalid_msgpack_payload_rejected() {
    let (addr, _platform, _handle) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    write_frame(&mut stream, MSG_REQUEST, &[0xC1, 0xC1, 0xC1])
        .await
        .unwrap();

    let (msg_type, response) = read_response_frame(&mut stream).await;
    assert_eq!(msg_type, MSG_ERROR);
    let error = response.get("error").unwrap();
    assert_eq!(
        error.get("code").unwrap().as_str().unwrap(),
        "INVALID_ARGUMENT"
    );
}
