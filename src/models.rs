//! Build and job snapshots carried by update events.

use crate::types::{EntityId, EntityType, Timestamp};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a build or job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Unknown,
    Queued,
    InProgress,
    Finished,
}

/// Outcome of a build or job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildResult {
    #[default]
    Unknown,
    Passed,
    Failed,
    Aborted,
    Skipped,
}

/// An entity whose mutations are streamed to clients.
pub trait StreamEntity: Serialize {
    /// Entity type name, e.g. "build".
    const ENTITY_TYPE: &'static str;

    /// Global topic all mutations of this type are published on.
    const TOPIC: &'static str;

    fn entity_id(&self) -> EntityId;

    /// Upstream grouping used by scoped topics.
    fn grouping_id(&self) -> Option<String> {
        None
    }

    fn entity_type() -> EntityType {
        EntityType::new(Self::ENTITY_TYPE)
    }
}

fn duration_ms(started: Option<Timestamp>, finished: Option<Timestamp>) -> Option<i64> {
    match (started, finished) {
        (Some(start), Some(finish)) => Some((finish.0 - start.0) / 1000),
        _ => None,
    }
}

/// A build of a project, optionally tied to a code change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    pub change_id: Option<String>,
    pub project_id: String,
    pub label: String,
    pub status: Status,
    pub result: BuildResult,
    pub message: Option<String>,
    pub date_created: Timestamp,
    pub date_started: Option<Timestamp>,
    pub date_finished: Option<Timestamp>,
}

impl Build {
    /// New build with unknown status and result.
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            change_id: None,
            project_id: project_id.into(),
            label: label.into(),
            status: Status::Unknown,
            result: BuildResult::Unknown,
            message: None,
            date_created: Timestamp::now(),
            date_started: None,
            date_finished: None,
        }
    }

    pub fn with_change(mut self, change_id: impl Into<String>) -> Self {
        self.change_id = Some(change_id.into());
        self
    }

    /// Milliseconds spent in progress, once both ends are known.
    pub fn duration(&self) -> Option<i64> {
        duration_ms(self.date_started, self.date_finished)
    }
}

impl StreamEntity for Build {
    const ENTITY_TYPE: &'static str = "build";
    const TOPIC: &'static str = "builds";

    fn entity_id(&self) -> EntityId {
        EntityId(self.id.clone())
    }

    fn grouping_id(&self) -> Option<String> {
        self.change_id.clone()
    }
}

/// One job of a build.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub build_id: String,
    pub label: String,
    pub status: Status,
    pub result: BuildResult,
    pub date_created: Timestamp,
    pub date_started: Option<Timestamp>,
    pub date_finished: Option<Timestamp>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        build_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            build_id: build_id.into(),
            label: label.into(),
            status: Status::Unknown,
            result: BuildResult::Unknown,
            date_created: Timestamp::now(),
            date_started: None,
            date_finished: None,
        }
    }

    pub fn duration(&self) -> Option<i64> {
        duration_ms(self.date_started, self.date_finished)
    }
}

impl StreamEntity for Job {
    const ENTITY_TYPE: &'static str = "job";
    const TOPIC: &'static str = "jobs";

    fn entity_id(&self) -> EntityId {
        EntityId(self.id.clone())
    }

    fn grouping_id(&self) -> Option<String> {
        Some(self.build_id.clone())
    }
}
