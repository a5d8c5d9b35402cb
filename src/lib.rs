//! # Build Stream
//!
//! Real-time distribution of build and job status to connected clients.
//!
//! ## Core Concepts
//!
//! - **Event source**: turns persistence mutations into update events that
//!   carry the entity's full snapshot
//! - **Broker**: topic table, per-topic sequencing, non-blocking fan-out
//! - **Sessions**: bounded per-client queues that coalesce updates to the
//!   same entity and flag the session degraded when they must drop
//! - **Reconciler**: client-side merge of events into ordered collections
//!
//! ## Example
//!
//! ```ignore
//! use buildstream::{EventSource, SubscriptionBroker, SubscriptionFilter, Topic};
//!
//! let broker = Arc::new(SubscriptionBroker::new());
//! let source = EventSource::new(Arc::clone(&broker));
//!
//! // A client watching the builds of one change
//! let handle = broker.subscribe(
//!     Topic::scoped("changes", "c-1", "builds"),
//!     SubscriptionFilter::All,
//! )?;
//!
//! // The persistence layer reports a mutation
//! source.record(&build, ChangeKind::Updated);
//!
//! // Client side
//! let mut reconciler = Reconciler::new();
//! reconciler.register(Build::entity_type(), EntityCollection::from_snapshot(snapshot));
//! while let Ok(event) = handle.recv() {
//!     reconciler.apply(&event);
//! }
//! ```

pub mod error;
pub mod models;
pub mod reconcile;
pub mod source;
pub mod subscriptions;
pub mod topic;
pub mod types;

// Re-exports
pub use error::{Result, StreamError};
pub use models::{Build, BuildResult, Job, Status, StreamEntity};
pub use reconcile::{EntityCollection, Merge, Reconciler};
pub use source::EventSource;
pub use subscriptions::{
    BrokerConfig, CloseReason, PublishReport, SessionSignal, SubscriptionBroker,
    SubscriptionFilter, SubscriptionHandle, SubscriptionId,
};
pub use topic::{Scope, Topic, TopicRoute};
pub use types::*;
