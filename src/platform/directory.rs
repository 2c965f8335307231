//! Service directory - typed service registration and discovery.
//!
//! Features:
//!   - Registration of any cloneable handle type, keyed by its Rust type
//!   - Metadata attached per registration, queryable at resolve time
//!   - One-shot wait-for: get notified when a type is first registered
//!
//! The directory stores *handles* (cheaply cloneable values such as
//! `Arc<dyn Trait>` or channel senders), not the services themselves.
//! Resolving hands out a clone; the registrant keeps ownership.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};

// =============================================================================
// Registration Types
// =============================================================================

/// Receipt returned by registration, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegistrationId(u64);

/// Snapshot of a single registration, for listing and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub registration: RegistrationId,
    /// Rust type name of the registered handle.
    pub type_name: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

struct Registration {
    id: RegistrationId,
    type_name: &'static str,
    handle: Box<dyn Any + Send + Sync>,
    metadata: HashMap<String, Value>,
}

/// Parked `wait_for` caller. Invoked with the newly registered handle.
type Waiter = Box<dyn FnOnce(&(dyn Any + Send + Sync)) + Send + Sync>;

#[derive(Default)]
struct DirectoryInner {
    entries: HashMap<TypeId, Vec<Registration>>,
    waiters: HashMap<TypeId, Vec<Waiter>>,
    next_id: u64,
}

// =============================================================================
// Service Directory
// =============================================================================

/// ServiceDirectory manages typed service registration and discovery.
pub struct ServiceDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
}

impl ServiceDirectory {
    /// Create a new, empty directory.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(DirectoryInner::default())),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a service handle without metadata.
    pub async fn register<S>(&self, service: S) -> RegistrationId
    where
        S: Clone + Send + Sync + 'static,
    {
        self.register_with_metadata(service, HashMap::new()).await
    }

    /// Register a service handle with metadata.
    ///
    /// Multiple registrations of the same type coexist; [`Self::resolve`]
    /// returns the earliest one still registered. Any parked `wait_for`
    /// callers for this type are completed with a clone of the handle.
    pub async fn register_with_metadata<S>(
        &self,
        service: S,
        metadata: HashMap<String, Value>,
    ) -> RegistrationId
    where
        S: Clone + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<S>();
        let type_name = std::any::type_name::<S>();

        let (id, fired) = {
            let mut inner = self.inner.write().await;
            inner.next_id += 1;
            let id = RegistrationId(inner.next_id);

            inner.entries.entry(type_id).or_default().push(Registration {
                id,
                type_name,
                handle: Box::new(service.clone()),
                metadata,
            });

            let fired = inner.waiters.remove(&type_id).unwrap_or_default();
            (id, fired)
        };

        // Waiters run after the lock is released so they may call back into
        // the directory without deadlocking.
        for waiter in fired {
            waiter(&service);
        }

        tracing::debug!(%type_name, registration = ?id, "service registered");
        id
    }

    /// Remove a registration by its receipt.
    /// Returns true if something was removed.
    pub async fn unregister(&self, id: RegistrationId) -> bool {
        let mut inner = self.inner.write().await;
        let mut removed = false;
        inner.entries.retain(|_, regs| {
            let before = regs.len();
            regs.retain(|r| r.id != id);
            removed |= regs.len() != before;
            !regs.is_empty()
        });
        removed
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Resolve the earliest registered handle of type `S`.
    pub async fn resolve<S>(&self) -> Option<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(&TypeId::of::<S>())
            .and_then(|regs| regs.first())
            .and_then(|reg| reg.handle.downcast_ref::<S>())
            .cloned()
    }

    /// Resolve the handle of type `S` whose metadata entry `key` equals `value`.
    pub async fn resolve_where<S>(&self, key: &str, value: &Value) -> Option<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(&TypeId::of::<S>())
            .and_then(|regs| regs.iter().find(|r| r.metadata.get(key) == Some(value)))
            .and_then(|reg| reg.handle.downcast_ref::<S>())
            .cloned()
    }

    /// All registered handles of type `S`, in registration order.
    pub async fn components<S>(&self) -> Vec<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(&TypeId::of::<S>())
            .map(|regs| {
                regs.iter()
                    .filter_map(|reg| reg.handle.downcast_ref::<S>().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Wait until a handle of type `S` is registered.
    ///
    /// If one is already present the returned channel completes immediately
    /// with a clone. Otherwise the channel completes on the next registration
    /// of `S`. Each call waits for exactly one delivery.
    pub async fn wait_for<S>(&self) -> oneshot::Receiver<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let mut inner = self.inner.write().await;
        let existing = inner
            .entries
            .get(&TypeId::of::<S>())
            .and_then(|regs| regs.first())
            .and_then(|reg| reg.handle.downcast_ref::<S>())
            .cloned();

        match existing {
            Some(service) => {
                drop(inner);
                // Receiver may already be gone; that is the caller's choice.
                let _ = tx.send(service);
            }
            None => {
                inner
                    .waiters
                    .entry(TypeId::of::<S>())
                    .or_default()
                    .push(Box::new(move |any| {
                        if let Some(service) = any.downcast_ref::<S>() {
                            let _ = tx.send(service.clone());
                        }
                    }));
            }
        }

        rx
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Snapshot of every registration, across all types.
    pub async fn entries(&self) -> Vec<DirectoryEntry> {
        let inner = self.inner.read().await;
        let mut out: Vec<DirectoryEntry> = inner
            .entries
            .values()
            .flat_map(|regs| {
                regs.iter().map(|reg| DirectoryEntry {
                    registration: reg.id,
                    type_name: reg.type_name.to_string(),
                    metadata: reg.metadata.clone(),
                })
            })
            .collect();
        out.sort_by_key(|e| e.registration);
        out
    }

    /// Total number of registrations.
    pub async fn count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.entries.values().map(|regs| regs.len()).sum()
    }
}

impl Default for ServiceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDirectory").finish_non_exhaustive()
    }
}
