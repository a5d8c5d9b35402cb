//! Ordered, identity-keyed entity collection.

use crate::types::{EntityId, UpdateEvent};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// How an event was merged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Merge {
    /// Existing entry overwritten in place at this position.
    Updated { position: usize },
    /// Unknown entity prepended at position 0.
    Inserted,
}

/// Entities in presentation order (most recent first), at most one per id.
///
/// Positions are tracked as ordinals relative to the front so prepending
/// does not renumber the index.
#[derive(Clone, Debug, Default)]
pub struct EntityCollection {
    entries: VecDeque<(EntityId, Value)>,
    ordinals: HashMap<EntityId, i64>,
    /// Ordinal of `entries[0]`.
    front: i64,
}

impl EntityCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a fetched snapshot, keeping its order.
    /// If an id repeats, the first occurrence wins.
    pub fn from_snapshot<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (EntityId, Value)>,
    {
        let mut collection = Self::new();
        for (id, value) in entries {
            if collection.ordinals.contains_key(&id) {
                continue;
            }
            let ordinal = collection.front + collection.entries.len() as i64;
            collection.ordinals.insert(id.clone(), ordinal);
            collection.entries.push_back((id, value));
        }
        collection
    }

    /// Merge one event: update a known entity in place, otherwise prepend.
    pub fn apply(&mut self, event: &UpdateEvent) -> Merge {
        match self.position(&event.entity_id) {
            Some(position) => {
                overlay(&mut self.entries[position].1, &event.payload);
                Merge::Updated { position }
            }
            None => {
                self.front -= 1;
                self.ordinals.insert(event.entity_id.clone(), self.front);
                self.entries
                    .push_front((event.entity_id.clone(), event.payload.clone()));
                Merge::Inserted
            }
        }
    }

    pub fn position(&self, id: &EntityId) -> Option<usize> {
        self.ordinals
            .get(id)
            .map(|ordinal| (ordinal - self.front) as usize)
    }

    pub fn get(&self, id: &EntityId) -> Option<&Value> {
        self.position(id).map(|pos| &self.entries[pos].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entries.iter().map(|(id, _)| id)
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().cloned().collect()
    }
}

/// Overwrite every field present in `payload`. Non-object payloads replace.
fn overlay(target: &mut Value, payload: &Value) {
    match (target, payload) {
        (Value::Object(existing), Value::Object(fields)) => {
            for (key, value) in fields {
                existing.insert(key.clone(), value.clone());
            }
        }
        (target, payload) => *target = payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeKind, EntityType, Sequence};
    use serde_json::json;

    fn event(id: &str, payload: Value) -> UpdateEvent {
        UpdateEvent {
            topic: "builds".to_string(),
            entity_type: EntityType::new("build"),
            entity_id: EntityId::from(id),
            grouping_id: None,
            change: ChangeKind::Updated,
            payload,
            sequence: Sequence(0),
        }
    }

    #[test]
    fn test_insert_then_update_in_place() {
        let mut collection = EntityCollection::from_snapshot(vec![(
            EntityId::from("1"),
            json!({"id": 1, "status": "running"}),
        )]);

        let merge = collection.apply(&event("2", json!({"id": 2, "status": "queued"})));
        assert_eq!(merge, Merge::Inserted);
        assert_eq!(
            collection.to_vec(),
            vec![json!({"id": 2, "status": "queued"}), json!({"id": 1, "status": "running"})]
        );

        let merge = collection.apply(&event("1", json!({"id": 1, "status": "finished"})));
        assert_eq!(merge, Merge::Updated { position: 1 });
        assert_eq!(
            collection.to_vec(),
            vec![json!({"id": 2, "status": "queued"}), json!({"id": 1, "status": "finished"})]
        );
    }

    #[test]
    fn test_update_keeps_position_after_prepends() {
        let mut collection = EntityCollection::from_snapshot(vec![
            (EntityId::from("x"), json!({"n": 0})),
            (EntityId::from("y"), json!({"n": 0})),
            (EntityId::from("a"), json!({"n": 0})),
        ]);
        assert_eq!(collection.position(&EntityId::from("a")), Some(2));

        collection.apply(&event("a", json!({"n": 1})));
        collection.apply(&event("b", json!({"n": 1})));

        assert_eq!(collection.position(&EntityId::from("b")), Some(0));
        assert_eq!(collection.position(&EntityId::from("a")), Some(3));
        assert_eq!(collection.get(&EntityId::from("a")), Some(&json!({"n": 1})));
    }

    #[test]
    fn test_overlay_keeps_fields_missing_from_payload() {
        let mut collection = EntityCollection::from_snapshot(vec![(
            EntityId::from("1"),
            json!({"id": 1, "status": "running", "duration": null}),
        )]);

        collection.apply(&event("1", json!({"id": 1, "status": "finished"})));
        assert_eq!(
            collection.get(&EntityId::from("1")),
            Some(&json!({"id": 1, "status": "finished", "duration": null}))
        );
    }

    #[test]
    fn test_non_object_payload_replaces() {
        let mut collection = EntityCollection::new();
        collection.apply(&event("1", json!("pending")));
        collection.apply(&event("1", json!({"status": "done"})));
        assert_eq!(collection.to_vec(), vec![json!({"status": "done"})]);
    }

    #[test]
    fn test_snapshot_duplicates_keep_first() {
        let collection = EntityCollection::from_snapshot(vec![
            (EntityId::from("1"), json!({"v": "first"})),
            (EntityId::from("1"), json!({"v": "second"})),
        ]);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get(&EntityId::from("1")), Some(&json!({"v": "first"})));
    }
}
