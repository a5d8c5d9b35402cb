//! Subscription types for live build status updates.

use crate::types::{Sequence, UpdateEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a broker and the sessions it creates.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Max pending events per session before events are dropped.
    /// Default: 256
    pub queue_capacity: usize,

    /// Max live subscriptions before `subscribe` fails.
    /// Default: 10_000
    pub max_subscriptions: usize,

    /// Max undelivered liveness signals; extra signals are discarded.
    /// Default: 1024
    pub signal_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_subscriptions: 10_000,
            signal_capacity: 1024,
        }
    }
}

impl BrokerConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = max;
        self
    }

    pub fn with_signal_capacity(mut self, capacity: usize) -> Self {
        self.signal_capacity = capacity;
        self
    }
}

/// Per-subscription predicate over events.
#[derive(Clone, Default)]
pub enum SubscriptionFilter {
    /// Every event on the topic.
    #[default]
    All,
    /// Only events whose grouping id equals this (e.g. one code change).
    Grouping(String),
    /// Only these entity types.
    EntityTypes(Vec<String>),
    /// Arbitrary predicate.
    Predicate(Arc<dyn Fn(&UpdateEvent) -> bool + Send + Sync>),
}

impl SubscriptionFilter {
    /// Filter from a closure.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&UpdateEvent) -> bool + Send + Sync + 'static,
    {
        SubscriptionFilter::Predicate(Arc::new(f))
    }

    pub fn grouping(id: impl Into<String>) -> Self {
        SubscriptionFilter::Grouping(id.into())
    }

    pub fn matches(&self, event: &UpdateEvent) -> bool {
        match self {
            SubscriptionFilter::All => true,
            SubscriptionFilter::Grouping(id) => event.grouping_id.as_deref() == Some(id.as_str()),
            SubscriptionFilter::EntityTypes(types) => {
                types.iter().any(|t| t == event.entity_type.as_str())
            }
            SubscriptionFilter::Predicate(f) => f(event),
        }
    }
}

impl fmt::Debug for SubscriptionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionFilter::All => write!(f, "All"),
            SubscriptionFilter::Grouping(id) => write!(f, "Grouping({})", id),
            SubscriptionFilter::EntityTypes(types) => write!(f, "EntityTypes({:?})", types),
            SubscriptionFilter::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Unique identifier for a subscription (and its session).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// Consumer went away (handle dropped).
    Disconnected,
    /// Broker was dropped.
    Shutdown,
}

/// Out-of-band notifications for a liveness layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionSignal {
    /// The session lost an event; its client should resynchronize.
    Degraded {
        id: SubscriptionId,
        topic: String,
        dropped: u64,
    },
    /// The session was terminated and its subscription released.
    Closed {
        id: SubscriptionId,
        reason: CloseReason,
    },
}

/// Outcome of offering one event to one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Offer {
    /// Appended to the queue.
    Enqueued,
    /// Replaced a pending event for the same entity in place.
    Coalesced,
    /// Queue full; event lost for this session.
    Dropped { newly_degraded: bool },
    /// Scope or filter rejected the event.
    Filtered,
    /// Session already terminated.
    Closed,
}

/// What a single publish did across all sessions of a topic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub topic: String,
    pub sequence: Sequence,
    pub delivered: usize,
    pub coalesced: usize,
    pub dropped: usize,
    pub filtered: usize,
}
