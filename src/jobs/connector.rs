//! Connector jobs - artifact pull/push through registered connectors.
//!
//! A [`Connector`] is the platform's door to one federated peer. Connectors
//! register themselves in the service directory as `Arc<dyn Connector>` with
//! an `"id"` metadata entry; the jobs here look them up by that id at run
//! time, so a job definition stays valid across connector restarts.

use super::factory::JobFactory;
use super::{Job, JobContext, JobDefinition};
use crate::events::Event;
use crate::reply::Reply;
use crate::types::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Type tag of [`PullArtifactJob`].
pub const PULL_JOB_TYPE: &str = "connector.pull";
/// Type tag of [`PushArtifactJob`].
pub const PUSH_JOB_TYPE: &str = "connector.push";

/// Origin stamped on events published by connector jobs.
const EVENT_ORIGIN: &str = "connector";

// =============================================================================
// Connector Trait
// =============================================================================

/// Exchange of artifacts with one federated peer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable identifier, matched against job payloads.
    fn identifier(&self) -> &str;

    /// Human-readable name for logs and listings.
    fn name(&self) -> &str;

    /// Fetch an artifact from the peer. `Ok(None)` means the peer answered
    /// but has no such artifact.
    async fn pull(&self, artifact: &str) -> Result<Option<Value>>;

    /// Send an artifact to the peer.
    async fn push(&self, artifact: &str, content: &Value) -> Result<()>;
}

/// Resolve a connector by its `"id"` metadata entry.
async fn resolve_connector(ctx: &JobContext, connector_id: &str) -> Option<Arc<dyn Connector>> {
    ctx.directory
        .resolve_where::<Arc<dyn Connector>>("id", &json!(connector_id))
        .await
}

// =============================================================================
// Pull
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PullArtifactParams {
    connector_id: String,
    artifact: String,
}

/// Pull one artifact from a federated peer.
///
/// Outcomes: `Success` with the artifact content, `ServiceUnavailable` when
/// no connector with the given id is registered, `NotFound` when the peer
/// has no such artifact, `Failure` when the transfer itself fails.
#[derive(Debug)]
pub struct PullArtifactJob {
    name: String,
    params: PullArtifactParams,
}

impl PullArtifactJob {
    pub fn new(connector_id: impl Into<String>, artifact: impl Into<String>) -> Self {
        let params = PullArtifactParams {
            connector_id: connector_id.into(),
            artifact: artifact.into(),
        };
        Self {
            name: format!("pull {} via {}", params.artifact, params.connector_id),
            params,
        }
    }
}

#[async_trait]
impl Job for PullArtifactJob {
    fn job_type(&self) -> &str {
        PULL_JOB_TYPE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn payload(&self) -> Value {
        json!({
            "connector_id": self.params.connector_id,
            "artifact": self.params.artifact,
        })
    }

    async fn run(&self, ctx: &JobContext) -> Result<Reply> {
        let Some(connector) = resolve_connector(ctx, &self.params.connector_id).await else {
            tracing::warn!(connector = %self.params.connector_id, "connector not registered");
            return Ok(Reply::ServiceUnavailable);
        };

        match connector.pull(&self.params.artifact).await {
            Ok(Some(content)) => {
                ctx.events
                    .publish(Event::new(
                        "connector.pulled",
                        EVENT_ORIGIN,
                        format!(
                            "artifact {} pulled via {}",
                            self.params.artifact, self.params.connector_id
                        ),
                    ))
                    .await?;
                Ok(Reply::success_with(content))
            }
            Ok(None) => Ok(Reply::NotFound),
            Err(e) => {
                tracing::warn!(
                    connector = %self.params.connector_id,
                    artifact = %self.params.artifact,
                    error = %e,
                    "pull failed"
                );
                Ok(Reply::failure(e.to_string()))
            }
        }
    }
}

// =============================================================================
// Push
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PushArtifactParams {
    connector_id: String,
    artifact: String,
    content: Value,
}

/// Push one artifact to a federated peer.
#[derive(Debug)]
pub struct PushArtifactJob {
    name: String,
    params: PushArtifactParams,
}

impl PushArtifactJob {
    pub fn new(
        connector_id: impl Into<String>,
        artifact: impl Into<String>,
        content: Value,
    ) -> Self {
        let params = PushArtifactParams {
            connector_id: connector_id.into(),
            artifact: artifact.into(),
            content,
        };
        Self {
            name: format!("push {} via {}", params.artifact, params.connector_id),
            params,
        }
    }
}

#[async_trait]
impl Job for PushArtifactJob {
    fn job_type(&self) -> &str {
        PUSH_JOB_TYPE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn payload(&self) -> Value {
        json!({
            "connector_id": self.params.connector_id,
            "artifact": self.params.artifact,
            "content": self.params.content,
        })
    }

    async fn run(&self, ctx: &JobContext) -> Result<Reply> {
        let Some(connector) = resolve_connector(ctx, &self.params.connector_id).await else {
            tracing::warn!(connector = %self.params.connector_id, "connector not registered");
            return Ok(Reply::ServiceUnavailable);
        };

        match connector
            .push(&self.params.artifact, &self.params.content)
            .await
        {
            Ok(()) => {
                ctx.events
                    .publish(Event::new(
                        "connector.pushed",
                        EVENT_ORIGIN,
                        format!(
                            "artifact {} pushed via {}",
                            self.params.artifact, self.params.connector_id
                        ),
                    ))
                    .await?;
                Ok(Reply::success())
            }
            Err(e) => {
                tracing::warn!(
                    connector = %self.params.connector_id,
                    artifact = %self.params.artifact,
                    error = %e,
                    "push failed"
                );
                Ok(Reply::failure(e.to_string()))
            }
        }
    }
}

// =============================================================================
// Factory
// =============================================================================

struct ConnectorJobFactory;

impl JobFactory for ConnectorJobFactory {
    fn handles(&self, job_type: &str) -> bool {
        job_type == PULL_JOB_TYPE || job_type == PUSH_JOB_TYPE
    }

    fn deserialize(&self, definition: &JobDefinition) -> Result<Box<dyn Job>> {
        match definition.job_type.as_str() {
            PULL_JOB_TYPE => {
                let params: PullArtifactParams =
                    serde_json::from_value(definition.payload.clone())?;
                Ok(Box::new(PullArtifactJob {
                    name: definition.name.clone(),
                    params,
                }))
            }
            PUSH_JOB_TYPE => {
                let params: PushArtifactParams =
                    serde_json::from_value(definition.payload.clone())?;
                Ok(Box::new(PushArtifactJob {
                    name: definition.name.clone(),
                    params,
                }))
            }
            other => Err(Error::unknown_job_type(other)),
        }
    }
}

/// Factory for the built-in connector job types.
pub fn connector_job_factory() -> Arc<dyn JobFactory> {
    Arc::new(ConnectorJobFactory)
}
