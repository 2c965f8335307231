//! Job factories - rebuilding typed jobs from wire definitions.
//!
//! A [`JobFactory`] claims one or more type tags and knows how to turn a
//! [`JobDefinition`] with such a tag back into a concrete [`Job`]. The
//! [`JobFactoryRegistry`] keeps factories in registration order and asks
//! them in that order, so earlier registrations win ties.
//!
//! The set of factories is open: plugins register new ones at runtime and
//! unregister them on unload.

use super::{Job, JobDefinition};
use crate::types::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Builds jobs of one or more type tags from their serialized definitions.
pub trait JobFactory: Send + Sync {
    /// Whether this factory can rebuild jobs with the given type tag.
    fn handles(&self, job_type: &str) -> bool;

    /// Rebuild a job from its definition.
    ///
    /// Called only when [`Self::handles`] returned true for the
    /// definition's type tag.
    fn deserialize(&self, definition: &JobDefinition) -> Result<Box<dyn Job>>;
}

/// Ordered registry of job factories.
pub struct JobFactoryRegistry {
    factories: RwLock<Vec<Arc<dyn JobFactory>>>,
}

impl JobFactoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(Vec::new()),
        }
    }

    /// Add a factory. Registration order determines precedence.
    pub async fn register(&self, factory: Arc<dyn JobFactory>) {
        let mut factories = self.factories.write().await;
        factories.push(factory);
        tracing::debug!(total = factories.len(), "job factory registered");
    }

    /// Remove a previously registered factory (matched by identity).
    /// Returns true if the factory was present.
    pub async fn unregister(&self, factory: &Arc<dyn JobFactory>) -> bool {
        let mut factories = self.factories.write().await;
        let before = factories.len();
        factories.retain(|f| !Arc::ptr_eq(f, factory));
        factories.len() != before
    }

    /// Number of registered factories.
    pub async fn count(&self) -> usize {
        self.factories.read().await.len()
    }

    /// Rebuild a job from its definition.
    ///
    /// Factories are consulted in registration order. The first one that
    /// handles the tag *and* deserializes successfully wins; if every
    /// handling factory fails, the last failure is returned. If no factory
    /// handles the tag at all, the type is unknown.
    pub async fn create(&self, definition: &JobDefinition) -> Result<Box<dyn Job>> {
        let factories = self.factories.read().await;

        let mut last_err: Option<Error> = None;
        for factory in factories.iter() {
            if !factory.handles(&definition.job_type) {
                continue;
            }
            match factory.deserialize(definition) {
                Ok(job) => return Ok(job),
                Err(e) => {
                    tracing::debug!(
                        job_type = %definition.job_type,
                        error = %e,
                        "factory declined definition"
                    );
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Err(Error::unknown_job_type(&definition.job_type)),
        }
    }
}

impl Default for JobFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JobFactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobFactoryRegistry").finish_non_exhaustive()
    }
}
