//! Platform assembly - one wired instance of the federation core.
//!
//! [`Platform`] owns the four collaborating services (service directory,
//! event bus, job factory registry, job executor) and hands out shared
//! handles to them. Nothing here is global: embedders may run several
//! platforms side by side, each with its own configuration.

pub mod directory;

pub use directory::{DirectoryEntry, RegistrationId, ServiceDirectory};

use crate::events::{Event, EventBus};
use crate::jobs::connector::connector_job_factory;
use crate::jobs::{JobContext, JobDefinition, JobExecutor, JobFactoryRegistry};
use crate::types::{Config, JobId, Result};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A fully wired platform core.
pub struct Platform {
    config: Config,
    directory: Arc<ServiceDirectory>,
    events: Arc<EventBus>,
    factories: Arc<JobFactoryRegistry>,
    executor: Arc<JobExecutor>,
}

impl Platform {
    /// Wire up a platform from configuration. The executor's dispatcher
    /// starts immediately, so this must run inside a Tokio runtime.
    pub fn new(config: Config) -> Self {
        let directory = Arc::new(ServiceDirectory::new());
        let events = Arc::new(EventBus::new());
        let factories = Arc::new(JobFactoryRegistry::new());
        let ctx = JobContext::new(directory.clone(), events.clone());
        let executor = Arc::new(JobExecutor::new(&config.executor, ctx));

        Self {
            config,
            directory,
            events,
            factories,
            executor,
        }
    }

    /// Register the factories for the built-in job types, self-register the
    /// core services in the directory, and announce readiness on the bus.
    pub async fn install_builtins(&self) -> Result<()> {
        self.factories.register(connector_job_factory()).await;

        self.directory
            .register_with_metadata(self.events.clone(), service_meta("events"))
            .await;
        self.directory
            .register_with_metadata(self.factories.clone(), service_meta("job-factories"))
            .await;
        self.directory
            .register_with_metadata(self.executor.clone(), service_meta("job-executor"))
            .await;

        self.events
            .publish(Event::new(
                "platform.started",
                "platform",
                "core services registered",
            ))
            .await?;
        tracing::info!("platform core services registered");
        Ok(())
    }

    /// Rebuild a job from its wire definition and schedule it.
    pub async fn submit(&self, definition: &JobDefinition) -> Result<JobId> {
        let job = self.factories.create(definition).await?;
        self.executor.schedule(Arc::from(job)).await
    }

    /// Stop the executor, draining in-flight jobs.
    pub async fn shutdown(&self) -> Result<()> {
        self.executor.shutdown().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn directory(&self) -> &Arc<ServiceDirectory> {
        &self.directory
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn factories(&self) -> &Arc<JobFactoryRegistry> {
        &self.factories
    }

    pub fn executor(&self) -> &Arc<JobExecutor> {
        &self.executor
    }
}

fn service_meta(name: &str) -> HashMap<String, serde_json::Value> {
    HashMap::from([("service".to_string(), json!(name))])
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
