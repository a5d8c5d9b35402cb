//! Per-client session: a bounded, coalescing outbound queue.

use crate::error::{Result, StreamError};
use crate::topic::{Scope, Topic};
use crate::types::UpdateEvent;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::types::{CloseReason, Offer, SubscriptionFilter, SubscriptionId};

struct QueueState {
    pending: VecDeque<UpdateEvent>,
    closed: Option<CloseReason>,
}

/// Shared between the broker (producer) and the handle (consumer).
pub(crate) struct SubscriberSession {
    pub(crate) id: SubscriptionId,
    pub(crate) topic: Topic,
    scope: Scope,
    filter: SubscriptionFilter,
    capacity: usize,
    state: Mutex<QueueState>,
    ready: Condvar,
    degraded: AtomicBool,
    dropped: AtomicU64,
}

impl SubscriberSession {
    pub(crate) fn new(
        id: SubscriptionId,
        topic: Topic,
        scope: Scope,
        filter: SubscriptionFilter,
        capacity: usize,
    ) -> Self {
        Self {
            id,
            topic,
            scope,
            filter,
            capacity: capacity.max(1),
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                closed: None,
            }),
            ready: Condvar::new(),
            degraded: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Offer an event without ever blocking on the consumer.
    ///
    /// A pending event for the same entity is replaced at its position;
    /// otherwise the event is appended, or dropped if the queue is full.
    pub(crate) fn offer(&self, event: &UpdateEvent) -> Offer {
        if !self.scope.matches(event) || !self.filter.matches(event) {
            return Offer::Filtered;
        }

        let mut state = self.state.lock();
        if state.closed.is_some() {
            return Offer::Closed;
        }

        if let Some(slot) = state.pending.iter_mut().find(|p| p.same_entity(event)) {
            *slot = event.clone();
            return Offer::Coalesced;
        }

        if state.pending.len() < self.capacity {
            state.pending.push_back(event.clone());
            drop(state);
            self.ready.notify_one();
            return Offer::Enqueued;
        }

        drop(state);
        self.dropped.fetch_add(1, Ordering::Relaxed);
        let was_degraded = self.degraded.swap(true, Ordering::AcqRel);
        Offer::Dropped {
            newly_degraded: !was_degraded,
        }
    }

    /// Terminate the session, discarding anything still queued.
    /// Returns false if it was already closed.
    pub(crate) fn close(&self, reason: CloseReason) -> bool {
        let mut state = self.state.lock();
        if state.closed.is_some() {
            return false;
        }
        state.closed = Some(reason);
        state.pending.clear();
        drop(state);
        self.ready.notify_all();
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    pub(crate) fn close_reason(&self) -> Option<CloseReason> {
        self.state.lock().closed
    }

    pub(crate) fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn recv(&self) -> Result<UpdateEvent> {
        let mut state = self.state.lock();
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Ok(event);
            }
            if state.closed.is_some() {
                return Err(StreamError::Closed);
            }
            self.ready.wait(&mut state);
        }
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<UpdateEvent> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Ok(event);
            }
            if state.closed.is_some() {
                return Err(StreamError::Closed);
            }
            if self.ready.wait_until(&mut state, deadline).timed_out()
                && state.pending.is_empty()
            {
                return match state.closed {
                    Some(_) => Err(StreamError::Closed),
                    None => Err(StreamError::Timeout),
                };
            }
        }
    }

    fn try_recv(&self) -> Result<UpdateEvent> {
        let mut state = self.state.lock();
        match state.pending.pop_front() {
            Some(event) => Ok(event),
            None if state.closed.is_some() => Err(StreamError::Closed),
            None => Err(StreamError::Empty),
        }
    }

    fn drain(&self) -> Vec<UpdateEvent> {
        self.state.lock().pending.drain(..).collect()
    }

    fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// Consumer side of a subscription, owned by the transport.
///
/// Dropping the handle marks the session disconnected; the broker releases
/// the subscription on its next publish to the topic.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub(crate) session: Arc<SubscriberSession>,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &Topic {
        &self.session.topic
    }

    /// Receive the next event (blocking). Fails once the session is closed.
    pub fn recv(&self) -> Result<UpdateEvent> {
        self.session.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<UpdateEvent> {
        self.session.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<UpdateEvent> {
        self.session.recv_timeout(timeout)
    }

    /// Take everything currently pending, in delivery order.
    pub fn drain(&self) -> Vec<UpdateEvent> {
        self.session.drain()
    }

    /// Blocking iterator over events, ending when the session closes.
    pub fn iter(&self) -> impl Iterator<Item = UpdateEvent> + '_ {
        std::iter::from_fn(move || self.session.recv().ok())
    }

    /// Number of events waiting for the consumer.
    pub fn pending(&self) -> usize {
        self.session.pending()
    }

    /// True once an event was dropped for this session.
    pub fn is_degraded(&self) -> bool {
        self.session.degraded.load(Ordering::Acquire)
    }

    /// Acknowledge a resynchronization after degradation.
    pub fn clear_degraded(&self) {
        self.session.degraded.store(false, Ordering::Release);
    }

    /// Total events dropped for this session.
    pub fn dropped_count(&self) -> u64 {
        self.session.dropped_count()
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.session.close_reason()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.session.close(CloseReason::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeKind, EntityId, EntityType, Sequence};
    use serde_json::json;

    fn session(capacity: usize) -> SubscriberSession {
        SubscriberSession::new(
            SubscriptionId(1),
            Topic::global("builds"),
            Scope::All,
            SubscriptionFilter::All,
            capacity,
        )
    }

    fn event(id: &str, status: &str) -> UpdateEvent {
        UpdateEvent {
            topic: "builds".to_string(),
            entity_type: EntityType::new("build"),
            entity_id: EntityId::from(id),
            grouping_id: None,
            change: ChangeKind::Updated,
            payload: json!({"id": id, "status": status}),
            sequence: Sequence(0),
        }
    }

    #[test]
    fn test_coalesce_keeps_first_position() {
        let session = session(8);
        assert_eq!(session.offer(&event("x", "queued")), Offer::Enqueued);
        assert_eq!(session.offer(&event("y", "queued")), Offer::Enqueued);
        assert_eq!(session.offer(&event("x", "finished")), Offer::Coalesced);

        let pending = session.drain();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].entity_id, EntityId::from("x"));
        assert_eq!(pending[0].payload["status"], "finished");
        assert_eq!(pending[1].entity_id, EntityId::from("y"));
    }

    #[test]
    fn test_coalesce_when_full() {
        let session = session(2);
        session.offer(&event("a", "queued"));
        session.offer(&event("b", "queued"));

        assert_eq!(session.offer(&event("a", "in_progress")), Offer::Coalesced);
        assert!(!session.degraded.load(Ordering::Acquire));
    }

    #[test]
    fn test_drop_when_full_flags_degraded_once() {
        let session = session(1);
        session.offer(&event("a", "queued"));

        assert_eq!(
            session.offer(&event("b", "queued")),
            Offer::Dropped { newly_degraded: true }
        );
        assert_eq!(
            session.offer(&event("c", "queued")),
            Offer::Dropped { newly_degraded: false }
        );
        assert_eq!(session.dropped_count(), 2);
        assert_eq!(session.pending(), 1);
    }

    #[test]
    fn test_close_discards_pending() {
        let session = session(4);
        session.offer(&event("a", "queued"));

        assert!(session.close(CloseReason::Unsubscribed));
        assert!(!session.close(CloseReason::Disconnected));
        assert_eq!(session.pending(), 0);
        assert!(matches!(session.try_recv(), Err(StreamError::Closed)));
        assert_eq!(session.offer(&event("b", "queued")), Offer::Closed);
        assert_eq!(session.close_reason(), Some(CloseReason::Unsubscribed));
    }

    #[test]
    fn test_scope_filters_before_queueing() {
        let session = SubscriberSession::new(
            SubscriptionId(2),
            Topic::entity("builds", "b-1"),
            Scope::Entity("b-1".to_string()),
            SubscriptionFilter::All,
            4,
        );
        assert_eq!(session.offer(&event("b-2", "queued")), Offer::Filtered);
        assert_eq!(session.offer(&event("b-1", "queued")), Offer::Enqueued);
    }

    #[test]
    fn test_recv_timeout_when_idle() {
        let session = session(4);
        let result = session.recv_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(StreamError::Timeout)));
        assert!(matches!(session.try_recv(), Err(StreamError::Empty)));
    }
}
