//! Events fired by the CI runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Kind of event the runtime fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Commits pushed to the repository.
    Push,
    /// A pull request was opened or updated.
    PullRequest,
    /// A build started by hand.
    Exec,
    /// The pipeline finished without raising.
    After,
    /// The pipeline raised an error.
    Error,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Push,
        EventType::PullRequest,
        EventType::Exec,
        EventType::After,
        EventType::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Push => "push",
            EventType::PullRequest => "pull_request",
            EventType::Exec => "exec",
            EventType::After => "after",
            EventType::Error => "error",
        }
    }

    /// Terminal events close a pipeline run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventType::After | EventType::Error)
    }

    /// Events that carry a commit the source-control host knows about.
    pub fn is_source_change(&self) -> bool {
        matches!(self, EventType::Push | EventType::PullRequest)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown event type: {}", s))
    }
}

/// Final status of a pipeline run, as reported in `cause.trigger`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BuildStatus {
    Success,
    Failure,
    UnhandledRejection,
    /// Any value the runtime sends that is not one of the above.
    Other(String),
}

impl BuildStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BuildStatus::Success => "success",
            BuildStatus::Failure => "failure",
            BuildStatus::UnhandledRejection => "unhandledRejection",
            BuildStatus::Other(s) => s,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success)
    }
}

impl From<String> for BuildStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "success" => BuildStatus::Success,
            "failure" => BuildStatus::Failure,
            "unhandledRejection" => BuildStatus::UnhandledRejection,
            _ => BuildStatus::Other(s),
        }
    }
}

impl From<&str> for BuildStatus {
    fn from(s: &str) -> Self {
        BuildStatus::from(s.to_string())
    }
}

impl From<BuildStatus> for String {
    fn from(status: BuildStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What led to a terminal event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cause {
    /// How the pipeline ended.
    pub trigger: BuildStatus,
    /// The event that started the pipeline.
    pub event: CauseEvent,
}

/// The originating event of a pipeline run.
///
/// Kept as a raw tag: the runtime may name event kinds this dispatcher
/// has no handler for, and those must still reach the outcome reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CauseEvent {
    #[serde(rename = "type")]
    pub kind: String,
}

impl CauseEvent {
    pub fn event_type(&self) -> Option<EventType> {
        self.kind.parse().ok()
    }

    pub fn is_source_change(&self) -> bool {
        self.event_type()
            .map(|t| t.is_source_change())
            .unwrap_or(false)
    }
}

/// An event as delivered by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Cause>,
    #[serde(default)]
    pub commit: String,
    /// Remaining runtime fields, kept so the debug dump shows the whole event.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    pub fn new(kind: EventType, commit: impl Into<String>) -> Self {
        Self {
            kind,
            cause: None,
            commit: commit.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_cause(mut self, trigger: impl Into<BuildStatus>, event_kind: &str) -> Self {
        self.cause = Some(Cause {
            trigger: trigger.into(),
            event: CauseEvent {
                kind: event_kind.to_string(),
            },
        });
        self
    }

    /// Parse and validate an event from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let event: Event =
            serde_json::from_str(json).map_err(|e| Error::MalformedEvent(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    /// Check the fields the handlers rely on.
    pub fn validate(&self) -> Result<()> {
        if self.kind.is_terminal() && self.cause.is_none() {
            return Err(Error::MalformedEvent(format!(
                "'{}' event has no cause",
                self.kind
            )));
        }
        Ok(())
    }

    /// The cause of a terminal event.
    pub fn cause(&self) -> Result<&Cause> {
        self.cause
            .as_ref()
            .ok_or_else(|| Error::MalformedEvent(format!("'{}' event has no cause", self.kind)))
    }

    /// Pretty JSON rendering used by the debug dump.
    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Internal(e.to_string()))
    }
}
