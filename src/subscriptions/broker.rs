//! Subscription broker: topic table and non-blocking fan-out.

use crate::error::{Result, StreamError};
use crate::topic::Topic;
use crate::types::{Sequence, UpdateEvent};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::session::{SubscriberSession, SubscriptionHandle};
use super::types::{
    BrokerConfig, CloseReason, Offer, PublishReport, SessionSignal, SubscriptionFilter,
    SubscriptionId,
};

/// Live sessions by global topic.
#[derive(Default)]
struct SubscriptionTable {
    by_topic: HashMap<String, Vec<Arc<SubscriberSession>>>,
    topic_of: HashMap<SubscriptionId, String>,
}

impl SubscriptionTable {
    fn remove(&mut self, id: SubscriptionId) -> Option<Arc<SubscriberSession>> {
        let base = self.topic_of.remove(&id)?;
        let sessions = self.by_topic.get_mut(&base)?;
        let pos = sessions.iter().position(|s| s.id == id)?;
        let session = sessions.remove(pos);
        if sessions.is_empty() {
            self.by_topic.remove(&base);
        }
        Some(session)
    }

    /// Remove every session whose consumer has gone away.
    fn remove_closed(&mut self) -> Vec<Arc<SubscriberSession>> {
        let closed: Vec<SubscriptionId> = self
            .by_topic
            .values()
            .flatten()
            .filter(|s| s.is_closed())
            .map(|s| s.id)
            .collect();
        closed.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}

/// Fans published events out to every matching session.
///
/// The table lock is held only to register, remove, or snapshot sessions.
/// Publishes on the same topic are serialized by a per-topic sequencer so
/// every session sees that topic's events in one order; enqueueing never
/// waits on a consumer.
pub struct SubscriptionBroker {
    config: BrokerConfig,
    table: RwLock<SubscriptionTable>,
    sequencers: Mutex<HashMap<String, Arc<Mutex<Sequence>>>>,
    next_id: AtomicU64,
    signal_tx: Sender<SessionSignal>,
    signal_rx: Receiver<SessionSignal>,
}

impl SubscriptionBroker {
    /// Create a broker with default configuration.
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    pub fn with_config(config: BrokerConfig) -> Self {
        let (signal_tx, signal_rx) = bounded(config.signal_capacity.max(1));
        Self {
            config,
            table: RwLock::new(SubscriptionTable::default()),
            sequencers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            signal_tx,
            signal_rx,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Register interest in a topic.
    ///
    /// Disconnected sessions are released before the limit is enforced.
    /// Fails with `ResourceExhausted` when the subscription limit is reached;
    /// nothing is registered in that case.
    pub fn subscribe(
        &self,
        topic: impl Into<Topic>,
        filter: SubscriptionFilter,
    ) -> Result<SubscriptionHandle> {
        let topic = topic.into();
        let route = topic.route();

        let limit = self.config.max_subscriptions;
        let mut table = self.table.write();
        let mut released = Vec::new();
        if table.topic_of.len() >= limit {
            released = table.remove_closed();
        }
        if table.topic_of.len() >= limit {
            drop(table);
            self.announce_released(released);
            warn!(topic = %topic, limit, "Subscription limit reached");
            return Err(StreamError::ResourceExhausted { limit });
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let session = Arc::new(SubscriberSession::new(
            id,
            topic.clone(),
            route.scope,
            filter,
            self.config.queue_capacity,
        ));

        table.topic_of.insert(id, route.base.clone());
        table
            .by_topic
            .entry(route.base)
            .or_default()
            .push(Arc::clone(&session));
        drop(table);
        self.announce_released(released);

        debug!(id = %id, topic = %topic, "Subscribed");
        Ok(SubscriptionHandle { id, session })
    }

    /// Unsubscribe and discard anything still queued. Unknown ids are ignored.
    ///
    /// No event is enqueued for the session after this returns.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self.table.write().remove(id);
        if let Some(session) = removed {
            session.close(CloseReason::Unsubscribed);
            self.signal(SessionSignal::Closed {
                id,
                reason: CloseReason::Unsubscribed,
            });
            debug!(id = %id, topic = %session.topic, "Unsubscribed");
        }
    }

    /// Publish an event to every live session on its topic.
    ///
    /// Assigns the topic's next sequence and returns once the event has been
    /// offered to each session's queue.
    pub fn publish(&self, mut event: UpdateEvent) -> PublishReport {
        let sequencer = self.sequencer(&event.topic);
        let mut sequence = sequencer.lock();
        *sequence = sequence.next();
        event.sequence = *sequence;

        let sessions: Vec<Arc<SubscriberSession>> = self
            .table
            .read()
            .by_topic
            .get(&event.topic)
            .cloned()
            .unwrap_or_default();

        let mut report = PublishReport {
            topic: event.topic.clone(),
            sequence: event.sequence,
            ..Default::default()
        };
        let mut closed = Vec::new();

        for session in &sessions {
            match session.offer(&event) {
                Offer::Enqueued => report.delivered += 1,
                Offer::Coalesced => report.coalesced += 1,
                Offer::Filtered => report.filtered += 1,
                Offer::Closed => closed.push(session.id),
                Offer::Dropped { newly_degraded } => {
                    report.dropped += 1;
                    if newly_degraded {
                        warn!(
                            id = %session.id,
                            topic = %session.topic,
                            entity = %event.entity_id,
                            "Session queue full, dropping event"
                        );
                        self.signal(SessionSignal::Degraded {
                            id: session.id,
                            topic: session.topic.to_string(),
                            dropped: session.dropped_count(),
                        });
                    }
                }
            }
        }
        drop(sequence);

        if !closed.is_empty() {
            self.release(closed);
        }

        trace!(
            topic = %report.topic,
            sequence = report.sequence.0,
            delivered = report.delivered,
            coalesced = report.coalesced,
            dropped = report.dropped,
            "Published"
        );
        report
    }

    /// Release every session whose consumer has gone away.
    pub fn reap_disconnected(&self) -> usize {
        let released = self.table.write().remove_closed();
        let count = released.len();
        self.announce_released(released);
        count
    }

    /// Receiver for liveness signals (degraded and closed sessions).
    pub fn signals(&self) -> Receiver<SessionSignal> {
        self.signal_rx.clone()
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.table.read().topic_of.len()
    }

    /// Last sequence assigned on a global topic.
    pub fn sequence(&self, topic: &str) -> Sequence {
        self.sequencers
            .lock()
            .get(topic)
            .map(|s| *s.lock())
            .unwrap_or_default()
    }

    fn sequencer(&self, topic: &str) -> Arc<Mutex<Sequence>> {
        let mut sequencers = self.sequencers.lock();
        Arc::clone(sequencers.entry(topic.to_string()).or_default())
    }

    /// Remove closed sessions from the table.
    fn release(&self, ids: Vec<SubscriptionId>) {
        let removed: Vec<Arc<SubscriberSession>> = {
            let mut table = self.table.write();
            ids.into_iter().filter_map(|id| table.remove(id)).collect()
        };
        self.announce_released(removed);
    }

    fn announce_released(&self, sessions: Vec<Arc<SubscriberSession>>) {
        for session in sessions {
            let reason = session.close_reason().unwrap_or(CloseReason::Disconnected);
            debug!(id = %session.id, topic = %session.topic, ?reason, "Released session");
            self.signal(SessionSignal::Closed {
                id: session.id,
                reason,
            });
        }
    }

    fn signal(&self, signal: SessionSignal) {
        if self.signal_tx.try_send(signal).is_err() {
            trace!("Signal channel full, discarding signal");
        }
    }
}

impl Default for SubscriptionBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SubscriptionBroker {
    fn drop(&mut self) {
        let table = self.table.get_mut();
        for session in table.by_topic.values().flatten() {
            session.close(CloseReason::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeKind, EntityId, EntityType};
    use serde_json::json;
    use std::time::Duration;

    fn build_event(id: &str, change: &str, status: &str) -> UpdateEvent {
        UpdateEvent {
            topic: "builds".to_string(),
            entity_type: EntityType::new("build"),
            entity_id: EntityId::from(id),
            grouping_id: Some(change.to_string()),
            change: ChangeKind::Updated,
            payload: json!({"id": id, "change_id": change, "status": status}),
            sequence: Sequence(0),
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let broker = SubscriptionBroker::new();

        let handle = broker.subscribe("builds", SubscriptionFilter::All).unwrap();
        assert_eq!(broker.subscription_count(), 1);

        broker.unsubscribe(handle.id);
        assert_eq!(broker.subscription_count(), 0);
        assert_eq!(handle.close_reason(), Some(CloseReason::Unsubscribed));

        // Second unsubscribe is a no-op
        broker.unsubscribe(handle.id);
        assert_eq!(broker.subscription_count(), 0);
    }

    #[test]
    fn test_publish_assigns_sequence_per_topic() {
        let broker = SubscriptionBroker::new();

        let r1 = broker.publish(build_event("b-1", "c-1", "queued"));
        let r2 = broker.publish(build_event("b-2", "c-1", "queued"));
        assert_eq!(r1.sequence, Sequence(1));
        assert_eq!(r2.sequence, Sequence(2));
        assert_eq!(broker.sequence("builds"), Sequence(2));
        assert_eq!(broker.sequence("jobs"), Sequence(0));
    }

    #[test]
    fn test_broadcast_to_matching() {
        let broker = SubscriptionBroker::new();
        let handle = broker
            .subscribe(Topic::scoped("changes", "c-1", "builds"), SubscriptionFilter::All)
            .unwrap();

        let report = broker.publish(build_event("b-1", "c-1", "queued"));
        assert_eq!(report.delivered, 1);

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event.entity_id, EntityId::from("b-1"));
        assert_eq!(event.sequence, Sequence(1));
    }

    #[test]
    fn test_broadcast_filters_non_matching() {
        let broker = SubscriptionBroker::new();
        let handle = broker
            .subscribe(Topic::scoped("changes", "c-1", "builds"), SubscriptionFilter::All)
            .unwrap();

        let report = broker.publish(build_event("b-2", "c-2", "queued"));
        assert_eq!(report.filtered, 1);
        assert_eq!(report.delivered, 0);

        let result = handle.recv_timeout(Duration::from_millis(50));
        assert!(matches!(result, Err(StreamError::Timeout)));
    }

    #[test]
    fn test_limit_is_resource_exhausted() {
        let broker =
            SubscriptionBroker::with_config(BrokerConfig::default().with_max_subscriptions(1));
        assert_eq!(broker.config().max_subscriptions, 1);
        let _first = broker.subscribe("builds", SubscriptionFilter::All).unwrap();

        let result = broker.subscribe("builds", SubscriptionFilter::All);
        assert!(matches!(
            result,
            Err(StreamError::ResourceExhausted { limit: 1 })
        ));
        assert_eq!(broker.subscription_count(), 1);
    }

    #[test]
    fn test_dropped_handle_is_reaped_on_publish() {
        let broker = SubscriptionBroker::new();
        let signals = broker.signals();
        let handle = broker.subscribe("builds", SubscriptionFilter::All).unwrap();
        let id = handle.id;
        drop(handle);

        assert_eq!(broker.subscription_count(), 1);
        broker.publish(build_event("b-1", "c-1", "queued"));
        assert_eq!(broker.subscription_count(), 0);

        let signal = signals.try_recv().unwrap();
        assert_eq!(
            signal,
            SessionSignal::Closed {
                id,
                reason: CloseReason::Disconnected
            }
        );
    }

    #[test]
    fn test_degraded_signal_emitted_once() {
        let broker =
            SubscriptionBroker::with_config(BrokerConfig::default().with_queue_capacity(1));
        let signals = broker.signals();
        let handle = broker.subscribe("builds", SubscriptionFilter::All).unwrap();

        broker.publish(build_event("b-1", "c-1", "queued"));
        broker.publish(build_event("b-2", "c-1", "queued"));
        broker.publish(build_event("b-3", "c-1", "queued"));

        assert!(handle.is_degraded());
        assert_eq!(handle.dropped_count(), 2);

        let degraded: Vec<SessionSignal> = signals.try_iter().collect();
        assert_eq!(degraded.len(), 1);
        assert!(matches!(
            &degraded[0],
            SessionSignal::Degraded { dropped: 1, .. }
        ));
    }

    #[test]
    fn test_drop_broker_wakes_consumers() {
        let broker = SubscriptionBroker::new();
        let handle = broker.subscribe("builds", SubscriptionFilter::All).unwrap();
        drop(broker);

        assert!(matches!(handle.recv(), Err(StreamError::Closed)));
        assert_eq!(handle.close_reason(), Some(CloseReason::Shutdown));
    }
}
