//! Subscription system for live build status updates.
//!
//! This module fans update events out to connected clients:
//! - A broker holds the topic table and assigns per-topic sequences
//! - Each subscriber gets a session with a bounded outbound queue
//! - Pending events for the same entity are coalesced in place
//! - When coalescing cannot make room the event is dropped for that
//!   session only, and the session is flagged degraded
//!
//! # Example
//!
//! ```ignore
//! let broker = SubscriptionBroker::new();
//!
//! // Builds of one code change
//! let handle = broker.subscribe(
//!     Topic::scoped("changes", &change_id, "builds"),
//!     SubscriptionFilter::All,
//! )?;
//!
//! for event in handle.iter() {
//!     transport.send(encode_event(&event, WireFormat::Json)?)?;
//! }
//! ```

mod broker;
mod session;
mod types;

pub use broker::SubscriptionBroker;
pub use session::SubscriptionHandle;
pub use types::{
    BrokerConfig, CloseReason, PublishReport, SessionSignal, SubscriptionFilter,
    SubscriptionId,
};
