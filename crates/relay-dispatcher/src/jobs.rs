//! Builders for the jobs the dispatcher submits.

use relay_config::{StatusReportConfig, TemplateContext, UnitTestConfig};
use relay_core::{Error, Event, JobSpec, Project, Result, TaskList};

use crate::status::CommitState;

/// Name of the job running the project's test suite.
pub const UNIT_TEST_JOB: &str = "unit-test";
/// Name of the job reporting commit status.
pub const STATUS_REPORT_JOB: &str = "set-github-build-status";
/// Context label every status report is filed under.
pub const STATUS_CONTEXT: &str = "brigade";

/// Job that moves the checkout into place and runs the CI make target.
pub fn unit_tests(config: &UnitTestConfig) -> Result<JobSpec> {
    let dest_path = config.dest_path();
    let source = config.source.trim_end_matches('/');

    let tasks = TaskList::new(vec![
        format!("mkdir -p {}", dest_path),
        format!("mv {}/* {}", source, dest_path),
        format!("cd {}", dest_path),
        format!("make {}", config.make_target),
    ])?;

    Ok(JobSpec::new(UNIT_TEST_JOB, config.image.as_str())
        .with_env("DEST_PATH", dest_path)
        .with_env("GOPATH", config.gopath.as_str())
        .with_tasks(tasks))
}

/// Job that sets `state` on the event's commit.
///
/// The notifier image reads everything from its environment and has no
/// task list. The project token only ever lands in `GH_TOKEN`.
pub fn status_report(
    config: &StatusReportConfig,
    event: &Event,
    project: &Project,
    state: CommitState,
) -> Result<JobSpec> {
    let cause = event.cause()?;
    if event.commit.trim().is_empty() {
        return Err(Error::MalformedEvent(format!(
            "'{}' event has no commit to report on",
            event.kind
        )));
    }

    let description = TemplateContext::new()
        .with("trigger", cause.trigger.as_str())
        .with("commit", event.commit.as_str())
        .with("repo", project.repo.name.as_str())
        .with("event", cause.event.kind.as_str())
        .interpolate(&config.description);

    Ok(JobSpec::new(STATUS_REPORT_JOB, config.image.as_str())
        .with_env("GH_REPO", project.repo.name.as_str())
        .with_env("GH_STATE", state.as_str())
        .with_env("GH_DESCRIPTION", description)
        .with_env("GH_CONTEXT", STATUS_CONTEXT)
        .with_env("GH_TOKEN", project.repo.token.clone())
        .with_env("GH_COMMIT", event.commit.as_str()))
}
