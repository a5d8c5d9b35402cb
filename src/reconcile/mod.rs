//! Client-side reconciliation of delivered update events.
//!
//! A [`Reconciler`] owns one [`EntityCollection`] per registered entity type
//! and merges each delivered event into the matching collection:
//! known entities are updated without moving, unknown ones are prepended.
//! Events for unregistered types are ignored.
//!
//! `apply` must be called sequentially, in delivery order.

mod collection;

pub use collection::{EntityCollection, Merge};

use crate::types::{EntityId, EntityType, UpdateEvent};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

type MergeObserver = Box<dyn FnMut(&EntityType, Merge, &EntityCollection) + Send>;

/// Routes events to per-type collections.
#[derive(Default)]
pub struct Reconciler {
    collections: HashMap<EntityType, EntityCollection>,
    observer: Option<MergeObserver>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the collection for an entity type.
    pub fn register(&mut self, entity_type: EntityType, collection: EntityCollection) {
        self.collections.insert(entity_type, collection);
    }

    /// Called after every merge, e.g. to refresh a view.
    pub fn on_merge<F>(&mut self, observer: F)
    where
        F: FnMut(&EntityType, Merge, &EntityCollection) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    /// Merge one event. Returns `None` if no collection is registered
    /// for its entity type.
    pub fn apply(&mut self, event: &UpdateEvent) -> Option<Merge> {
        let collection = self.collections.get_mut(&event.entity_type)?;
        let merge = collection.apply(event);
        if let Some(observer) = self.observer.as_mut() {
            observer(&event.entity_type, merge, collection);
        }
        Some(merge)
    }

    /// Discard a collection and reseed it from a fresh snapshot, as required
    /// after the session was flagged degraded.
    pub fn resync<I>(&mut self, entity_type: EntityType, snapshot: I)
    where
        I: IntoIterator<Item = (EntityId, Value)>,
    {
        let collection = EntityCollection::from_snapshot(snapshot);
        debug!(entity_type = %entity_type, entries = collection.len(), "Resynchronized collection");
        self.collections.insert(entity_type, collection);
    }

    pub fn collection(&self, entity_type: &EntityType) -> Option<&EntityCollection> {
        self.collections.get(entity_type)
    }
}
