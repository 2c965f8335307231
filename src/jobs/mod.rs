//! Jobs - typed, serializable units of work.
//!
//! A [`Job`] describes one piece of work: it knows its type tag, carries a
//! serializable payload, and runs asynchronously against a [`JobContext`].
//! Everything else lives around it:
//!   - [`factory`]: turns wire-level [`JobDefinition`]s back into jobs
//!   - [`executor`]: schedules and runs jobs on a bounded worker pool
//!   - [`connector`]: built-in jobs for artifact pull/push through connectors
//!
//! Job state is owned by the executor, not the job itself. A job object is
//! immutable work description; status and result live in the executor's
//! records and are observed through [`JobSnapshot`]s.

use crate::events::EventBus;
use crate::platform::ServiceDirectory;
use crate::reply::Reply;
use crate::types::{JobId, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub mod connector;
pub mod executor;
pub mod factory;

pub use connector::{Connector, PullArtifactJob, PushArtifactJob};
pub use executor::JobExecutor;
pub use factory::{JobFactory, JobFactoryRegistry};

// =============================================================================
// Job Trait
// =============================================================================

/// A unit of work the platform can schedule and run.
///
/// Implementations are immutable descriptions: `run` takes `&self` and all
/// collaborators arrive through the [`JobContext`]. The same job value may be
/// serialized, shipped across the access transport, and rebuilt by a
/// [`factory::JobFactory`] on the other side.
#[async_trait]
pub trait Job: Send + Sync {
    /// Type tag used by factories to route deserialization,
    /// e.g. `"connector.pull"`.
    fn job_type(&self) -> &str;

    /// Human-readable name for logs and listings.
    fn name(&self) -> &str;

    /// Serializable payload describing the work.
    fn payload(&self) -> Value;

    /// Perform the work. Expected failures are encoded in the [`Reply`];
    /// an `Err` means infrastructure broke before the work could finish.
    async fn run(&self, ctx: &JobContext) -> Result<Reply>;
}

impl fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("type", &self.job_type())
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Collaborators handed to every running job.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub directory: Arc<ServiceDirectory>,
    pub events: Arc<EventBus>,
}

impl JobContext {
    pub fn new(directory: Arc<ServiceDirectory>, events: Arc<EventBus>) -> Self {
        Self { directory, events }
    }
}

// =============================================================================
// Job Status
// =============================================================================

/// Lifecycle state of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, not yet accepted by the executor.
    Unscheduled,
    /// Accepted and queued, waiting for a worker slot.
    Scheduled,
    /// A worker is executing it right now.
    Running,
    /// Finished. A result is available.
    Completed,
}

impl JobStatus {
    /// Validate a state transition.
    ///
    /// `Scheduled -> Completed` is the abort path: a queued job cancelled
    /// before any worker picked it up.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Unscheduled, JobStatus::Scheduled)
                | (JobStatus::Scheduled, JobStatus::Running)
                | (JobStatus::Scheduled, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Completed)
        )
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// Serialized form of a job as it travels over the access transport.
///
/// The identifier is optional on the way in: the executor assigns a fresh
/// [`JobId`] at submission and ignores any client-supplied one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<JobId>,

    pub name: String,

    #[serde(rename = "type")]
    pub job_type: String,

    #[serde(default)]
    pub payload: Value,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>, job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            identifier: None,
            name: name.into(),
            job_type: job_type.into(),
            payload,
        }
    }
}

/// Point-in-time view of a submitted job, as reported by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub identifier: JobId,

    pub name: String,

    #[serde(rename = "type")]
    pub job_type: String,

    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Reply>,

    pub submitted_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
