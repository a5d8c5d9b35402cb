//! Topic naming and routing.
//!
//! Events are always published on the global topic of their entity type
//! (`builds`, `jobs`). Narrower topics are views over a global topic:
//!
//! - `builds/{id}`: a single build (detail view)
//! - `changes/{id}/builds`: builds of one code change
//! - `builds/{id}/jobs`: jobs of one build
//!
//! Any other string, including a scoped shape with an unknown
//! parent/kind pair, is an opaque global topic.

use crate::types::UpdateEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parent/kind pairs whose grouping id is carried on the kind's events.
const SCOPED_KINDS: &[(&str, &str)] = &[("changes", "builds"), ("builds", "jobs")];

/// A named stream of update events.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Topic(name.into())
    }

    /// Global topic, e.g. `builds`.
    pub fn global(name: &str) -> Self {
        Topic(name.to_string())
    }

    /// Entities of `kind` grouped under `parent/{id}`, e.g. `changes/{id}/builds`.
    pub fn scoped(parent: &str, id: &str, kind: &str) -> Self {
        Topic(format!("{}/{}/{}", parent, id, kind))
    }

    /// A single entity of `kind`, e.g. `builds/{id}`.
    pub fn entity(kind: &str, id: &str) -> Self {
        Topic(format!("{}/{}", kind, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the global topic this one views, and the implied narrowing.
    pub fn route(&self) -> TopicRoute {
        let parts: Vec<&str> = self.0.split('/').collect();
        match parts.as_slice() {
            [kind, id] if !kind.is_empty() && !id.is_empty() => TopicRoute {
                base: kind.to_string(),
                scope: Scope::Entity(id.to_string()),
            },
            [parent, id, kind]
                if !id.is_empty() && SCOPED_KINDS.contains(&(*parent, *kind)) =>
            {
                TopicRoute {
                    base: kind.to_string(),
                    scope: Scope::Grouping(id.to_string()),
                }
            }
            _ => TopicRoute {
                base: self.0.clone(),
                scope: Scope::All,
            },
        }
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Topic(s.to_string())
    }
}

/// Where a topic's events come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicRoute {
    /// Global topic events are published on.
    pub base: String,
    pub scope: Scope,
}

/// Narrowing applied on top of a global topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Only events whose grouping id equals this.
    Grouping(String),
    /// Only events for this entity id.
    Entity(String),
}

impl Scope {
    pub fn matches(&self, event: &UpdateEvent) -> bool {
        match self {
            Scope::All => true,
            Scope::Grouping(id) => event.grouping_id.as_deref() == Some(id.as_str()),
            Scope::Entity(id) => event.entity_id.as_str() == id,
        }
    }
}
