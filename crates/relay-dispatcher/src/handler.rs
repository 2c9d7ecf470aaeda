//! Event subscriptions.

use relay_core::EventType;
use std::collections::HashMap;
use std::fmt;

/// What to do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Run the unit-test job.
    FullBuild,
    /// Log the event, then run the unit-test job.
    DebugFullBuild,
    /// Report the build outcome as a commit status.
    ReportOutcome,
}

impl Handler {
    pub fn name(&self) -> &'static str {
        match self {
            Handler::FullBuild => "full-build",
            Handler::DebugFullBuild => "debug-full-build",
            Handler::ReportOutcome => "report-outcome",
        }
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mapping from event type to handler, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<EventType, Handler>,
}

impl HandlerTable {
    /// A table with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// The pipeline's subscriptions. Both terminal events share the
    /// outcome reporter so every run ends in exactly one report.
    pub fn standard() -> Self {
        Self::new()
            .on(EventType::Push, Handler::FullBuild)
            .on(EventType::Exec, Handler::DebugFullBuild)
            .on(EventType::PullRequest, Handler::FullBuild)
            .on(EventType::After, Handler::ReportOutcome)
            .on(EventType::Error, Handler::ReportOutcome)
    }

    /// Subscribe `handler` to `event`, replacing any earlier subscription.
    pub fn on(mut self, event: EventType, handler: Handler) -> Self {
        self.handlers.insert(event, handler);
        self
    }

    pub fn get(&self, event: EventType) -> Option<Handler> {
        self.handlers.get(&event).copied()
    }

    /// Subscriptions in event declaration order.
    pub fn entries(&self) -> Vec<(EventType, Handler)> {
        EventType::ALL
            .into_iter()
            .filter_map(|event| self.get(event).map(|handler| (event, handler)))
            .collect()
    }
}
