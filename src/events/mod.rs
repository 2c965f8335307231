//! Event service for platform-wide pub/sub.
//!
//! Components publish [`Event`]s describing things that happened; interested
//! parties subscribe with optional filters and receive matching events on a
//! private channel. Delivery guarantees:
//!   - Fan-out: every matching subscriber gets its own copy
//!   - Per-subscriber FIFO: events arrive in publish order
//!   - Non-blocking publish: a slow or dead subscriber never stalls the bus
//!
//! Subscribers that drop their receiver are pruned on the next publish.

use crate::types::{EventId, Result, SubscriptionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

// =============================================================================
// Event
// =============================================================================

/// A platform event: something that happened, described for anyone listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier assigned at creation.
    pub identifier: EventId,

    /// Human-readable description of what happened.
    pub description: String,

    /// Event category, e.g. `"job.completed"` or `"connector.sync"`.
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event was created.
    pub timestamp: DateTime<Utc>,

    /// Which component published the event.
    pub origin: String,
}

impl Event {
    /// Create an event stamped with a fresh identifier and the current time.
    pub fn new(
        event_type: impl Into<String>,
        origin: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            identifier: EventId::new(),
            description: description.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            origin: origin.into(),
        }
    }
}

// =============================================================================
// Subscriber Management
// =============================================================================

/// Registered subscriber entry holding the delivery channel.
#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    /// Only deliver events from this origin (`None` matches any origin).
    origin: Option<String>,
    /// Only deliver events of this type (`None` matches any type).
    event_type: Option<String>,
    tx: mpsc::UnboundedSender<Event>,
}

impl Subscriber {
    fn matches(&self, event: &Event) -> bool {
        let origin_ok = match self.origin.as_deref() {
            Some(origin) => origin == event.origin,
            None => true,
        };
        let type_ok = match self.event_type.as_deref() {
            Some(event_type) => event_type == event.event_type,
            None => true,
        };
        origin_ok && type_ok
    }
}

/// Subscription receipt for managing subscriptions.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub origin: Option<String>,
    pub event_type: Option<String>,
}

// =============================================================================
// EventBus - In-Memory Event Service
// =============================================================================

/// In-memory event bus with filtered fan-out.
#[derive(Debug)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,

    /// Statistics
    stats: Arc<RwLock<BusStats>>,
}

/// Statistics about bus usage.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BusStats {
    pub events_published: u64,
    pub active_subscriptions: usize,
}

impl EventBus {
    /// Create a new EventBus instance.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(RwLock::new(BusStats::default())),
        }
    }

    /// Publish an event to all subscribers whose filters match.
    ///
    /// Returns the number of subscribers the event was delivered to.
    /// Subscribers whose receiving end has been dropped are removed.
    pub async fn publish(&self, event: Event) -> Result<usize> {
        let mut delivered = 0;
        let mut dead: Vec<SubscriptionId> = Vec::new();

        let mut remaining;
        {
            let subscribers = self.subscribers.read().await;
            for subscriber in subscribers.iter() {
                if !subscriber.matches(&event) {
                    continue;
                }
                // If the channel is closed the subscriber has disconnected.
                if subscriber.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(subscriber.id.clone());
                }
            }
            remaining = subscribers.len();
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            subscribers.retain(|s| !dead.contains(&s.id));
            remaining = subscribers.len();
        }

        let mut stats = self.stats.write().await;
        stats.events_published += 1;
        stats.active_subscriptions = remaining;

        tracing::debug!(
            event_type = %event.event_type,
            origin = %event.origin,
            delivered,
            "published event"
        );

        Ok(delivered)
    }

    /// Subscribe with optional origin and type filters (`None` = match all).
    ///
    /// Returns (subscription receipt, receiver channel) for receiving events.
    pub async fn subscribe(
        &self,
        origin: Option<String>,
        event_type: Option<String>,
    ) -> Result<(Subscription, mpsc::UnboundedReceiver<Event>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriptionId::new();

        let mut subscribers = self.subscribers.write().await;
        subscribers.push(Subscriber {
            id: id.clone(),
            origin: origin.clone(),
            event_type: event_type.clone(),
            tx,
        });

        let mut stats = self.stats.write().await;
        stats.active_subscriptions = subscribers.len();

        tracing::debug!(
            subscription = %id,
            ?origin,
            ?event_type,
            "subscriber registered"
        );

        Ok((
            Subscription {
                id,
                origin,
                event_type,
            },
            rx,
        ))
    }

    /// Remove a subscription. Delivery to its channel stops immediately.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|s| s.id != subscription.id);

        let mut stats = self.stats.write().await;
        stats.active_subscriptions = subscribers.len();

        tracing::debug!(subscription = %subscription.id, "unsubscribed");

        Ok(())
    }

    /// Get current bus statistics.
    pub async fn stats(&self) -> BusStats {
        self.stats.read().await.clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
