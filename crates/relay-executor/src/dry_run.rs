//! Executor that records jobs instead of running them.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream};
use relay_core::executor::*;
use relay_core::{Error, Result};
use std::sync::Mutex;
use tracing::info;

/// Records every submitted job and reports a fixed outcome.
#[derive(Default)]
pub struct DryRunExecutor {
    submitted: Mutex<Vec<JobSpec>>,
    /// Exit code reported for jobs whose name matches.
    failures: Vec<(String, i32)>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make jobs named `job` finish with `exit_code`.
    pub fn failing(mut self, job: impl Into<String>, exit_code: i32) -> Self {
        self.failures.push((job.into(), exit_code));
        self
    }

    /// Jobs submitted so far, in order.
    pub fn submitted(&self) -> Vec<JobSpec> {
        self.submitted
            .lock()
            .map(|jobs| jobs.clone())
            .unwrap_or_default()
    }

    fn exit_code_for(&self, job: &str) -> i32 {
        self.failures
            .iter()
            .find(|(name, _)| name == job)
            .map(|(_, code)| *code)
            .unwrap_or(0)
    }

    fn job_name(&self, handle: &JobHandle) -> Result<String> {
        let jobs = self
            .submitted
            .lock()
            .map_err(|_| Error::Internal("dry-run job list poisoned".to_string()))?;
        jobs.iter()
            .find(|spec| spec.id == handle.id)
            .map(|spec| spec.name.clone())
            .ok_or_else(|| Error::NotFound(format!("job {}", handle.id)))
    }
}

#[async_trait]
impl Executor for DryRunExecutor {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn spawn(&self, spec: JobSpec) -> Result<JobHandle> {
        info!(job = %spec.name, image = %spec.image, "Dry run, not starting container");
        let handle = JobHandle {
            id: spec.id,
            executor_id: format!("dry-run-{}", spec.id.short()),
            executor_name: self.name().to_string(),
        };
        self.submitted
            .lock()
            .map_err(|_| Error::Internal("dry-run job list poisoned".to_string()))?
            .push(spec);
        Ok(handle)
    }

    async fn logs(&self, _handle: &JobHandle) -> Result<BoxStream<'static, LogLine>> {
        Ok(Box::pin(stream::empty()))
    }

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let name = self.job_name(handle)?;
        let now = Utc::now();
        let status = match self.exit_code_for(&name) {
            0 => JobStatus::Succeeded {
                started_at: now,
                finished_at: now,
            },
            code => JobStatus::Failed {
                started_at: Some(now),
                finished_at: now,
                exit_code: Some(code),
                message: format!("dry run configured to fail with exit code {}", code),
            },
        };
        Ok(status)
    }

    async fn wait(&self, handle: &JobHandle) -> Result<JobResult> {
        let job = self.job_name(handle)?;
        Ok(JobResult {
            exit_code: Some(self.exit_code_for(&job)),
            status: self.status(handle).await?,
            job,
        })
    }
}
