//! Event source adapter: persistence mutations in, update events out.

use crate::models::StreamEntity;
use crate::subscriptions::{PublishReport, SubscriptionBroker};
use crate::types::{ChangeKind, Sequence, UpdateEvent};
use std::sync::Arc;

/// Turns entity mutations into events and hands them to a broker.
pub struct EventSource {
    broker: Arc<SubscriptionBroker>,
}

impl EventSource {
    pub fn new(broker: Arc<SubscriptionBroker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<SubscriptionBroker> {
        &self.broker
    }

    /// Build the event for a mutation. The payload is always the entity's
    /// full current snapshot.
    ///
    /// # Panics
    ///
    /// If the entity does not serialize to a JSON object or has an empty id.
    /// Either means the persistence layer broke its contract.
    pub fn on_mutation<E: StreamEntity>(entity: &E, change: ChangeKind) -> UpdateEvent {
        let entity_id = entity.entity_id();
        assert!(
            !entity_id.as_str().is_empty(),
            "{} mutation without an id",
            E::ENTITY_TYPE
        );

        let payload = serde_json::to_value(entity).expect("entity snapshot must serialize");
        assert!(
            payload.is_object(),
            "{} {} snapshot is not an object",
            E::ENTITY_TYPE,
            entity_id
        );

        UpdateEvent {
            topic: E::TOPIC.to_string(),
            entity_type: E::entity_type(),
            entity_id,
            grouping_id: entity.grouping_id(),
            change,
            payload,
            sequence: Sequence::default(),
        }
    }

    /// Convert a mutation and publish it.
    pub fn record<E: StreamEntity>(&self, entity: &E, change: ChangeKind) -> PublishReport {
        self.broker.publish(Self::on_mutation(entity, change))
    }
}
