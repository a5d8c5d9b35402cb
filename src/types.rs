//! Core types for the status stream.

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of an entity, unique within its entity type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}

/// Kind of entity an event carries (e.g. "build", "job").
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityType(pub String);

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        EntityType(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityType({})", self.0)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event within its topic, assigned at publish time.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl Sequence {
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// What happened to the entity in the persistence layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
}

/// A single entity change, carrying the entity's full current snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// Global topic the event was published on (e.g. "builds").
    pub topic: String,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    /// Upstream grouping (a build's change, a job's build), if any.
    pub grouping_id: Option<String>,
    pub change: ChangeKind,
    /// Full snapshot of the entity, never a diff.
    pub payload: serde_json::Value,
    /// Per-topic position. Zero until the broker publishes it.
    pub sequence: Sequence,
}

impl UpdateEvent {
    /// True if both events describe the same entity.
    pub fn same_entity(&self, other: &UpdateEvent) -> bool {
        self.entity_id == other.entity_id && self.entity_type == other.entity_type
    }
}

/// Encoding used to put events on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Json,
    MessagePack,
}

/// Encode an event for the transport.
pub fn encode_event(event: &UpdateEvent, format: WireFormat) -> Result<Vec<u8>> {
    match format {
        WireFormat::Json => Ok(serde_json::to_vec(event)?),
        WireFormat::MessagePack => Ok(rmp_serde::to_vec_named(event)?),
    }
}

/// Decode an event received from the transport.
pub fn decode_event(bytes: &[u8], format: WireFormat) -> Result<UpdateEvent> {
    match format {
        WireFormat::Json => serde_json::from_slice(bytes)
            .map_err(|e| StreamError::Deserialization(e.to_string())),
        WireFormat::MessagePack => Ok(rmp_serde::from_slice(bytes)?),
    }
}
