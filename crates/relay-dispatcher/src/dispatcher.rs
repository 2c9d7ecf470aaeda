//! Dispatcher - routes events to handlers and runs the resulting jobs.

use relay_config::DescriptorConfig;
use relay_core::{BuildStatus, Error, Event, Executor, JobResult, JobSpec, Project, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::handler::{Handler, HandlerTable};
use crate::jobs;
use crate::status::CommitState;

/// What handling an event did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The unit-test job ran to success.
    Built { result: JobResult },
    /// A commit status was reported.
    Reported {
        state: CommitState,
        result: JobResult,
    },
    /// The run did not come from a push or pull request; nothing to report.
    ReportSkipped {
        trigger: BuildStatus,
        cause_event: String,
    },
}

/// Works out which handler and jobs an event maps to. Runs nothing.
#[derive(Debug, Clone)]
pub struct Planner {
    config: DescriptorConfig,
    handlers: HandlerTable,
}

impl Planner {
    /// Planner with the standard subscriptions.
    pub fn new(config: DescriptorConfig) -> Self {
        Self {
            config,
            handlers: HandlerTable::standard(),
        }
    }

    /// Replace the subscription table.
    pub fn with_handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    fn handler_for(&self, event: &Event) -> Result<Handler> {
        event.validate()?;
        self.handlers
            .get(event.kind)
            .ok_or_else(|| Error::NoHandler(event.kind.to_string()))
    }

    /// Jobs an event would run.
    pub fn plan(&self, event: &Event, project: &Project) -> Result<Vec<JobSpec>> {
        match self.handler_for(event)? {
            Handler::FullBuild | Handler::DebugFullBuild => {
                Ok(vec![jobs::unit_tests(&self.config.unit_test)?])
            }
            Handler::ReportOutcome => Ok(self
                .outcome_report(event, project)?
                .map(|(_, job)| vec![job])
                .unwrap_or_default()),
        }
    }

    /// Status job for a terminal event, if its run came from a push or PR.
    fn outcome_report(
        &self,
        event: &Event,
        project: &Project,
    ) -> Result<Option<(CommitState, JobSpec)>> {
        let cause = event.cause()?;
        if !cause.event.is_source_change() {
            return Ok(None);
        }

        let state = CommitState::for_build(&cause.trigger);
        let job = jobs::status_report(&self.config.status_report, event, project, state)?;
        Ok(Some((state, job)))
    }
}

/// Routes events to handlers and runs the resulting jobs.
///
/// Holds only immutable configuration and a shared executor, so one
/// dispatcher serves every event the runtime fires.
pub struct Dispatcher {
    planner: Planner,
    executor: Arc<dyn Executor>,
}

impl Dispatcher {
    /// Dispatcher with the standard subscriptions.
    pub fn new(config: DescriptorConfig, executor: Arc<dyn Executor>) -> Self {
        Self {
            planner: Planner::new(config),
            executor,
        }
    }

    /// Replace the subscription table.
    pub fn with_handlers(mut self, handlers: HandlerTable) -> Self {
        self.planner = self.planner.with_handlers(handlers);
        self
    }

    pub fn handlers(&self) -> &HandlerTable {
        self.planner.handlers()
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Handle one event to completion.
    ///
    /// Job failures are returned to the caller; nothing is retried.
    pub async fn dispatch(&self, event: &Event, project: &Project) -> Result<DispatchOutcome> {
        let handler = self.planner.handler_for(event)?;
        info!(event = %event.kind, handler = %handler, "Dispatching event");

        match handler {
            Handler::FullBuild => self.full_build().await,
            Handler::DebugFullBuild => {
                Self::dump_event(event)?;
                self.full_build().await
            }
            Handler::ReportOutcome => self.report_outcome(event, project).await,
        }
    }

    async fn full_build(&self) -> Result<DispatchOutcome> {
        let job = jobs::unit_tests(&self.planner.config.unit_test)?;
        let result = job.run(self.executor.as_ref()).await?;
        Ok(DispatchOutcome::Built { result })
    }

    // The project is never logged: it carries the repository token.
    fn dump_event(event: &Event) -> Result<()> {
        info!("-----------------Event-----------------");
        info!("{}", event.to_pretty_json()?);
        info!("---------------------------------------");
        Ok(())
    }

    async fn report_outcome(&self, event: &Event, project: &Project) -> Result<DispatchOutcome> {
        let cause = event.cause()?;

        match self.planner.outcome_report(event, project)? {
            Some((state, job)) => {
                info!(
                    repo = %project.repo.name,
                    commit = %event.commit,
                    state = %state,
                    "Reporting commit status"
                );
                let result = job.run(self.executor.as_ref()).await?;
                Ok(DispatchOutcome::Reported { state, result })
            }
            None => {
                info!(
                    trigger = %cause.trigger,
                    cause_event = %cause.event.kind,
                    "Build finished with {} state",
                    cause.trigger
                );
                Ok(DispatchOutcome::ReportSkipped {
                    trigger: cause.trigger.clone(),
                    cause_event: cause.event.kind.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::EventType;
    use relay_executor::DryRunExecutor;
    use std::io;
    use std::sync::Mutex;

    const TOKEN: &str = "ghp_do-not-log-me-1234";

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    fn setup() -> (Dispatcher, Arc<DryRunExecutor>, Project) {
        let executor = Arc::new(DryRunExecutor::new());
        let dispatcher = Dispatcher::new(DescriptorConfig::default(), executor.clone());
        (dispatcher, executor, Project::new("org/repo", TOKEN))
    }

    fn terminal(kind: EventType, trigger: &str, cause_event: &str) -> Event {
        Event::new(kind, "abc123").with_cause(trigger, cause_event)
    }

    #[tokio::test]
    async fn test_push_and_pull_request_run_unit_tests() {
        for kind in [EventType::Push, EventType::PullRequest] {
            let (dispatcher, executor, project) = setup();
            let outcome = dispatcher
                .dispatch(&Event::new(kind, "abc123"), &project)
                .await
                .unwrap();

            assert!(matches!(outcome, DispatchOutcome::Built { .. }));
            let submitted = executor.submitted();
            assert_eq!(submitted.len(), 1, "{} should run exactly one job", kind);
            assert_eq!(submitted[0].name, jobs::UNIT_TEST_JOB);
            assert_eq!(
                submitted[0].tasks.as_ref().unwrap().steps().last().unwrap(),
                "make ci"
            );
        }
    }

    #[tokio::test]
    async fn test_exec_dumps_event_before_running() {
        let (logs, _guard) = capture_logs();
        let (dispatcher, executor, project) = setup();

        let event = Event::from_json(r#"{"type": "exec", "commit": "feedbeef", "buildID": "b-42"}"#)
            .unwrap();
        dispatcher.dispatch(&event, &project).await.unwrap();

        assert_eq!(executor.submitted().len(), 1);
        let output = logs.contents();
        let dump_at = output
            .find("-----------------Event-----------------")
            .expect("event dump header");
        let run_at = output.find("Running job").expect("job run line");
        assert!(dump_at < run_at);
        assert!(output.contains("b-42"));
        assert!(output.contains("feedbeef"));
        assert!(!output.contains(TOKEN));
    }

    #[tokio::test]
    async fn test_success_reports_success() {
        let (dispatcher, executor, project) = setup();
        let event = terminal(EventType::After, "success", "push");

        let outcome = dispatcher.dispatch(&event, &project).await.unwrap();
        assert!(matches!(
            outcome,
            DispatchOutcome::Reported {
                state: CommitState::Success,
                ..
            }
        ));

        let submitted = executor.submitted();
        assert_eq!(submitted.len(), 1);
        let job = &submitted[0];
        assert_eq!(job.name, jobs::STATUS_REPORT_JOB);
        assert_eq!(job.env_value("GH_STATE"), Some("success"));
        assert_eq!(job.env_value("GH_COMMIT"), Some("abc123"));
        assert_eq!(job.env_value("GH_REPO"), Some("org/repo"));
        assert_eq!(job.env_value("GH_CONTEXT"), Some("brigade"));
        assert_eq!(job.env_value("GH_TOKEN"), Some(TOKEN));
    }

    #[tokio::test]
    async fn test_non_success_triggers_report_failure() {
        for trigger in ["failure", "error", "unhandledRejection"] {
            for kind in [EventType::After, EventType::Error] {
                let (dispatcher, executor, project) = setup();
                let event = terminal(kind, trigger, "pull_request");

                dispatcher.dispatch(&event, &project).await.unwrap();

                let submitted = executor.submitted();
                assert_eq!(submitted.len(), 1);
                assert_eq!(submitted[0].env_value("GH_STATE"), Some("failure"));
                assert_eq!(submitted[0].env_value("GH_CONTEXT"), Some("brigade"));
            }
        }
    }

    #[tokio::test]
    async fn test_exec_cause_skips_report() {
        let (logs, _guard) = capture_logs();
        let (dispatcher, executor, project) = setup();
        let event = terminal(EventType::After, "success", "exec");

        let outcome = dispatcher.dispatch(&event, &project).await.unwrap();

        match outcome {
            DispatchOutcome::ReportSkipped {
                trigger,
                cause_event,
            } => {
                assert_eq!(trigger, BuildStatus::Success);
                assert_eq!(cause_event, "exec");
            }
            other => panic!("Expected ReportSkipped, got {:?}", other),
        }
        assert!(executor.submitted().is_empty());
        assert!(logs.contents().contains("Build finished with success state"));
    }

    #[tokio::test]
    async fn test_token_never_logged() {
        let (logs, _guard) = capture_logs();
        let (dispatcher, executor, project) = setup();

        let events = vec![
            Event::new(EventType::Push, "abc123"),
            Event::new(EventType::PullRequest, "abc123"),
            Event::new(EventType::Exec, "abc123"),
            terminal(EventType::After, "success", "push"),
            terminal(EventType::Error, "failure", "pull_request"),
            terminal(EventType::Error, "unhandledRejection", "exec"),
        ];
        for event in &events {
            dispatcher.dispatch(event, &project).await.unwrap();
        }

        let output = logs.contents();
        assert!(!output.is_empty());
        assert!(!output.contains(TOKEN));

        let with_token: Vec<_> = executor
            .submitted()
            .into_iter()
            .filter(|job| job.env.values().any(|v| v.expose() == TOKEN))
            .map(|job| job.name)
            .collect();
        assert_eq!(with_token, vec![jobs::STATUS_REPORT_JOB; 2]);
    }

    #[tokio::test]
    async fn test_unit_test_failure_propagates() {
        let executor = Arc::new(DryRunExecutor::new().failing(jobs::UNIT_TEST_JOB, 2));
        let dispatcher = Dispatcher::new(DescriptorConfig::default(), executor.clone());
        let project = Project::new("org/repo", TOKEN);

        let result = dispatcher
            .dispatch(&Event::new(EventType::Push, "abc123"), &project)
            .await;
        assert!(matches!(result, Err(Error::ExecutionFailed(_))));
        assert_eq!(executor.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_status_job_failure_propagates() {
        let executor = Arc::new(DryRunExecutor::new().failing(jobs::STATUS_REPORT_JOB, 1));
        let dispatcher = Dispatcher::new(DescriptorConfig::default(), executor);
        let project = Project::new("org/repo", TOKEN);

        let result = dispatcher
            .dispatch(&terminal(EventType::After, "success", "push"), &project)
            .await;
        assert!(matches!(result, Err(Error::ExecutionFailed(_))));
    }

    #[tokio::test]
    async fn test_malformed_terminal_event_is_rejected() {
        let (dispatcher, executor, project) = setup();

        let result = dispatcher
            .dispatch(&Event::new(EventType::After, "abc123"), &project)
            .await;
        assert!(matches!(result, Err(Error::MalformedEvent(_))));
        assert!(executor.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribed_event() {
        let executor = Arc::new(DryRunExecutor::new());
        let dispatcher = Dispatcher::new(DescriptorConfig::default(), executor)
            .with_handlers(HandlerTable::new().on(EventType::Push, Handler::FullBuild));
        let project = Project::new("org/repo", TOKEN);

        let result = dispatcher
            .dispatch(&Event::new(EventType::Exec, "abc123"), &project)
            .await;
        assert!(matches!(result, Err(Error::NoHandler(_))));
    }

    #[test]
    fn test_plan_does_not_run_jobs() {
        let (dispatcher, executor, project) = setup();

        let build = dispatcher
            .planner()
            .plan(&Event::new(EventType::Push, "abc123"), &project)
            .unwrap();
        assert_eq!(build.len(), 1);
        assert_eq!(build[0].name, jobs::UNIT_TEST_JOB);

        let report = dispatcher
            .planner()
            .plan(&terminal(EventType::Error, "error", "push"), &project)
            .unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].env_value("GH_STATE"), Some("failure"));

        let skipped = dispatcher
            .planner()
            .plan(&terminal(EventType::After, "success", "exec"), &project)
            .unwrap();
        assert!(skipped.is_empty());

        assert!(executor.submitted().is_empty());
    }

    #[test]
    fn test_planner_without_executor() {
        let planner = Planner::new(DescriptorConfig::default());
        let project = Project::new("org/repo", TOKEN);

        let jobs = planner
            .plan(&terminal(EventType::After, "success", "pull_request"), &project)
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].env_value("GH_STATE"), Some("success"));
        assert_eq!(jobs[0].env_value("GH_CONTEXT"), Some("brigade"));
    }
}
