//! Job descriptions and the executor trait.
//!
//! Executors run jobs in isolated environments (containers, or nothing at
//! all for dry runs). A job is one container: an image, its environment and
//! an optional ordered list of shell steps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use crate::secret::Secret;
use crate::{Error, JobId, Result};

/// An environment variable value.
#[derive(Clone, PartialEq, Eq)]
pub enum EnvVar {
    Plain(String),
    /// Only revealed to the executor; printed as `[redacted]`.
    Secret(Secret),
}

impl EnvVar {
    /// The value the container receives.
    pub fn expose(&self) -> &str {
        match self {
            EnvVar::Plain(v) => v,
            EnvVar::Secret(s) => s.expose(),
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, EnvVar::Secret(_))
    }
}

impl fmt::Debug for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvVar::Plain(v) => fmt::Debug::fmt(v, f),
            EnvVar::Secret(s) => fmt::Debug::fmt(s, f),
        }
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvVar::Plain(v) => f.write_str(v),
            EnvVar::Secret(s) => fmt::Display::fmt(s, f),
        }
    }
}

impl From<String> for EnvVar {
    fn from(v: String) -> Self {
        EnvVar::Plain(v)
    }
}

impl From<&str> for EnvVar {
    fn from(v: &str) -> Self {
        EnvVar::Plain(v.to_string())
    }
}

impl From<Secret> for EnvVar {
    fn from(s: Secret) -> Self {
        EnvVar::Secret(s)
    }
}

/// A non-empty, ordered list of shell steps run in one container.
///
/// Each step only runs if the previous one succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct TaskList(Vec<String>);

impl TaskList {
    pub fn new(tasks: Vec<String>) -> Result<Self> {
        if tasks.is_empty() {
            return Err(Error::InvalidInput("task list is empty".to_string()));
        }
        Ok(Self(tasks))
    }

    pub fn steps(&self) -> &[String] {
        &self.0
    }

    /// Render the steps as a single `sh -c` script.
    pub fn script(&self) -> String {
        self.0.join(" && ")
    }
}

impl TryFrom<Vec<String>> for TaskList {
    type Error = Error;

    fn try_from(tasks: Vec<String>) -> Result<Self> {
        TaskList::new(tasks)
    }
}

/// Description of one containerized unit of work.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Unique identifier for this submission.
    pub id: JobId,
    /// Human-readable job name (e.g. `unit-test`).
    pub name: String,
    /// Container image to run.
    pub image: String,
    /// Environment variables, sorted by name.
    pub env: BTreeMap<String, EnvVar>,
    /// Shell steps; `None` runs the image's own entrypoint.
    pub tasks: Option<TaskList>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            image: image.into(),
            env: BTreeMap::new(),
            tasks: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<EnvVar>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_tasks(mut self, tasks: TaskList) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Look up an environment value as the container would see it.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(|v| v.expose())
    }

    /// Environment rendered as `KEY=value` pairs for the container runtime.
    pub fn env_pairs(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.expose()))
            .collect()
    }

    /// Submit the job and wait for it to finish.
    ///
    /// Log lines are forwarded to `tracing`. Any terminal status other than
    /// success becomes [`Error::ExecutionFailed`].
    pub async fn run(self, executor: &dyn Executor) -> Result<JobResult> {
        let name = self.name.clone();
        info!(job = %name, image = %self.image, executor = executor.name(), "Running job");

        let handle = executor.spawn(self).await?;

        match executor.logs(&handle).await {
            Ok(mut stream) => {
                while let Some(line) = stream.next().await {
                    info!(job = %name, stream = ?line.stream, "{}", line.content);
                }
            }
            Err(e) => warn!(job = %name, error = %e, "Could not stream job logs"),
        }

        let result = executor.wait(&handle).await?;
        match &result.status {
            JobStatus::Succeeded { .. } => {
                info!(job = %name, "Job succeeded");
                Ok(result)
            }
            JobStatus::Failed {
                exit_code, message, ..
            } => Err(Error::ExecutionFailed(format!(
                "job '{}' failed (exit code {:?}): {}",
                name, exit_code, message
            ))),
            other => Err(Error::ExecutionFailed(format!(
                "job '{}' ended in unexpected state {:?}",
                name, other
            ))),
        }
    }
}

impl fmt::Display for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "job {} ({})", self.name, self.image)?;
        for (key, value) in &self.env {
            writeln!(f, "  env {}={}", key, value)?;
        }
        match &self.tasks {
            Some(tasks) => {
                for (i, step) in tasks.steps().iter().enumerate() {
                    writeln!(f, "  task {}: {}", i + 1, step)?;
                }
            }
            None => writeln!(f, "  (image entrypoint)")?,
        }
        Ok(())
    }
}

/// Handle to a running or completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
    /// Executor-specific identifier (e.g. container ID).
    pub executor_id: String,
    pub executor_name: String,
}

/// Status of a job execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running {
        started_at: DateTime<Utc>,
    },
    Succeeded {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    Failed {
        started_at: Option<DateTime<Utc>>,
        finished_at: DateTime<Utc>,
        exit_code: Option<i32>,
        message: String,
    },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded { .. } | JobStatus::Failed { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded { .. })
    }
}

/// Result of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job: String,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
}

/// A line of log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum LogStream {
    Stdout,
    Stderr,
    System,
}

/// Trait for job executors.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name of this executor.
    fn name(&self) -> &'static str;

    /// Start a new job.
    async fn spawn(&self, spec: JobSpec) -> Result<JobHandle>;

    /// Stream of log lines from a job, ending when the job stops.
    async fn logs(&self, handle: &JobHandle) -> Result<BoxStream<'static, LogLine>>;

    /// Current status of a job.
    async fn status(&self, handle: &JobHandle) -> Result<JobStatus>;

    /// Wait for a job to complete.
    async fn wait(&self, handle: &JobHandle) -> Result<JobResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::Mutex;

    fn sample_spec() -> JobSpec {
        JobSpec::new("unit-test", "golang:1.9")
            .with_env("GOPATH", "/go")
            .with_env("GH_TOKEN", Secret::new("hunter2"))
            .with_tasks(TaskList::new(vec!["cd /go".to_string(), "make ci".to_string()]).unwrap())
    }

    #[test]
    fn test_empty_task_list_is_rejected() {
        assert!(matches!(TaskList::new(vec![]), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_task_script_preserves_order() {
        let tasks = TaskList::new(vec!["a".into(), "b".into(), "c".into()]).unwrap();
        assert_eq!(tasks.script(), "a && b && c");
    }

    #[test]
    fn test_secret_env_is_exposed_only_on_request() {
        let spec = sample_spec();
        assert_eq!(spec.env_value("GH_TOKEN"), Some("hunter2"));
        assert!(spec.env["GH_TOKEN"].is_secret());

        let debug = format!("{:?}", spec);
        let display = format!("{}", spec);
        assert!(!debug.contains("hunter2"));
        assert!(!display.contains("hunter2"));
        assert!(display.contains("GH_TOKEN=[redacted]"));
    }

    #[test]
    fn test_env_pairs_are_sorted() {
        let spec = sample_spec();
        assert_eq!(spec.env_pairs(), vec!["GH_TOKEN=hunter2", "GOPATH=/go"]);
    }

    #[test]
    fn test_job_status_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(
            !JobStatus::Running {
                started_at: Utc::now()
            }
            .is_terminal()
        );
        assert!(
            JobStatus::Succeeded {
                started_at: Utc::now(),
                finished_at: Utc::now(),
            }
            .is_terminal()
        );
        assert!(
            JobStatus::Failed {
                started_at: None,
                finished_at: Utc::now(),
                exit_code: Some(1),
                message: String::new(),
            }
            .is_terminal()
        );
    }

    struct ScriptedExecutor {
        exit_code: i32,
        spawned: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn spawn(&self, spec: JobSpec) -> Result<JobHandle> {
            self.spawned.lock().unwrap().push(spec.name.clone());
            Ok(JobHandle {
                id: spec.id,
                executor_id: spec.name,
                executor_name: self.name().to_string(),
            })
        }

        async fn logs(&self, _handle: &JobHandle) -> Result<BoxStream<'static, LogLine>> {
            Ok(Box::pin(stream::iter(vec![LogLine {
                timestamp: Utc::now(),
                stream: LogStream::Stdout,
                content: "ok".to_string(),
            }])))
        }

        async fn status(&self, handle: &JobHandle) -> Result<JobStatus> {
            Ok(self.wait(handle).await?.status)
        }

        async fn wait(&self, handle: &JobHandle) -> Result<JobResult> {
            let now = Utc::now();
            let status = if self.exit_code == 0 {
                JobStatus::Succeeded {
                    started_at: now,
                    finished_at: now,
                }
            } else {
                JobStatus::Failed {
                    started_at: Some(now),
                    finished_at: now,
                    exit_code: Some(self.exit_code),
                    message: "make: *** [ci] Error 1".to_string(),
                }
            };
            Ok(JobResult {
                job: handle.executor_id.clone(),
                status,
                exit_code: Some(self.exit_code),
            })
        }
    }

    #[tokio::test]
    async fn test_run_returns_result_on_success() {
        let executor = ScriptedExecutor {
            exit_code: 0,
            spawned: Mutex::new(vec![]),
        };
        let result = sample_spec().run(&executor).await.unwrap();
        assert!(result.status.is_success());
        assert_eq!(*executor.spawned.lock().unwrap(), vec!["unit-test"]);
    }

    #[tokio::test]
    async fn test_run_maps_failure_to_error() {
        let executor = ScriptedExecutor {
            exit_code: 2,
            spawned: Mutex::new(vec![]),
        };
        let err = sample_spec().run(&executor).await.unwrap_err();
        match err {
            Error::ExecutionFailed(msg) => {
                assert!(msg.contains("unit-test"));
                assert!(msg.contains("Some(2)"));
            }
            other => panic!("Expected ExecutionFailed, got {:?}", other),
        }
    }
}
