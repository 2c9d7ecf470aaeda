//! Local Docker executor implementation.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use relay_core::executor::*;
use relay_core::{Error, JobId, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Where a host checkout is mounted, read-only, inside job containers.
pub const SOURCE_STAGING_PATH: &str = "/relay/checkout";

/// Host checkout made available to jobs that run tasks.
///
/// The host directory is never writable from the container. It is mounted
/// read-only at a staging path and copied to `container_path` before the
/// tasks start, so tasks may move or delete files freely.
#[derive(Debug, Clone)]
pub struct SourceMount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub staging_path: String,
}

impl SourceMount {
    pub fn new(host_path: PathBuf, container_path: impl Into<String>) -> Self {
        Self {
            host_path,
            container_path: container_path.into(),
            staging_path: SOURCE_STAGING_PATH.to_string(),
        }
    }

    fn bind(&self) -> String {
        format!("{}:{}:ro", self.host_path.display(), self.staging_path)
    }

    /// Shell steps that populate `container_path` from the staging mount.
    fn copy_script(&self) -> String {
        format!(
            "mkdir -p {dest} && cp -a {staging}/. {dest}",
            staging = self.staging_path.trim_end_matches('/'),
            dest = self.container_path
        )
    }
}

/// Runs jobs as containers on the local Docker daemon.
pub struct LocalDockerExecutor {
    docker: Docker,
    source: Option<SourceMount>,
}

impl LocalDockerExecutor {
    /// Connect to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self::with_client(docker))
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self {
            docker,
            source: None,
        }
    }

    /// Provide a copy of a host checkout at `container_path` to jobs with tasks.
    pub fn with_source(mut self, host_path: PathBuf, container_path: impl Into<String>) -> Self {
        self.source = Some(SourceMount::new(host_path, container_path));
        self
    }

    fn container_name(job_id: &JobId) -> String {
        format!("relay-job-{}", job_id)
    }

    /// Command for a job: its tasks as one shell script, or the image entrypoint.
    ///
    /// With a source checkout the script first copies it into place.
    fn command(spec: &JobSpec, source: Option<&SourceMount>) -> Option<Vec<String>> {
        spec.tasks.as_ref().map(|tasks| {
            let script = match source {
                Some(mount) => format!("{} && {}", mount.copy_script(), tasks.script()),
                None => tasks.script(),
            };
            vec!["sh".to_string(), "-c".to_string(), script]
        })
    }

    /// Bind mounts for a job. Jobs running their image entrypoint get none.
    fn binds(spec: &JobSpec, source: Option<&SourceMount>) -> Option<Vec<String>> {
        spec.tasks.as_ref()?;
        source.map(|mount| vec![mount.bind()])
    }

    async fn pull_image(&self, image: &str) {
        info!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = pull_stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Pull warning");
                }
            }
        }
    }

    async fn remove(&self, container_name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(container_name, Some(options))
            .await
            .map_err(|e| Error::ExecutionFailed(format!("Failed to remove container: {}", e)))
    }

    /// Remove a container, logging instead of failing.
    async fn cleanup(&self, container_name: &str) {
        if let Err(e) = self.remove(container_name).await {
            warn!(container = %container_name, error = %e, "Failed to clean up container");
        }
    }
}

fn parse_timestamp(value: Option<String>) -> Option<chrono::DateTime<Utc>> {
    value
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl Executor for LocalDockerExecutor {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn spawn(&self, spec: JobSpec) -> Result<JobHandle> {
        let container_name = Self::container_name(&spec.id);

        self.pull_image(&spec.image).await;

        let host_config = HostConfig {
            binds: Self::binds(&spec, self.source.as_ref()),
            ..Default::default()
        };

        // Secret values are exposed here and nowhere else
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Self::command(&spec, self.source.as_ref()),
            env: Some(spec.env_pairs()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.clone(),
            platform: None,
        };

        info!(container = %container_name, job = %spec.name, "Creating container");
        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| Error::ExecutionFailed(format!("Failed to create container: {}", e)))?;

        info!(container = %container_name, "Starting container");
        if let Err(e) = self
            .docker
            .start_container(&container_name, None::<StartContainerOptions<String>>)
            .await
        {
            self.cleanup(&container_name).await;
            return Err(Error::ExecutionFailed(format!(
                "Failed to start container: {}",
                e
            )));
        }

        Ok(JobHandle {
            id: spec.id,
            executor_id: container.id,
            executor_name: self.name().to_string(),
        })
    }

    async fn logs(&self, handle: &JobHandle) -> Result<BoxStream<'static, LogLine>> {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let stream = self
            .docker
            .logs(&Self::container_name(&handle.id), Some(options));

        let mapped_stream = stream.filter_map(|result| async move {
            match result {
                Ok(output) => {
                    let (stream, message) = match output {
                        LogOutput::StdErr { message } => (LogStream::Stderr, message),
                        LogOutput::StdOut { message }
                        | LogOutput::Console { message }
                        | LogOutput::StdIn { message } => (LogStream::Stdout, message),
                    };
                    Some(LogLine {
                        timestamp: Utc::now(),
                        stream,
                        content: String::from_utf8_lossy(&message).trim_end().to_string(),
                    })
                }
                Err(e) => {
                    warn!(error = %e, "Log stream error");
                    None
                }
            }
        });

        Ok(Box::pin(mapped_stream))
    }

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let inspect = self
            .docker
            .inspect_container(&Self::container_name(&handle.id), None)
            .await
            .map_err(|e| Error::NotFound(format!("Container not found: {}", e)))?;

        let state = inspect
            .state
            .ok_or_else(|| Error::Internal("No state".to_string()))?;

        let started_at = parse_timestamp(state.started_at);

        let status = if state.running.unwrap_or(false) {
            JobStatus::Running {
                started_at: started_at.unwrap_or_else(Utc::now),
            }
        } else if state.paused.unwrap_or(false) {
            JobStatus::Pending
        } else {
            let exit_code = state.exit_code.map(|c| c as i32);
            let finished_at = parse_timestamp(state.finished_at).unwrap_or_else(Utc::now);

            if exit_code == Some(0) {
                JobStatus::Succeeded {
                    started_at: started_at.unwrap_or(finished_at),
                    finished_at,
                }
            } else {
                JobStatus::Failed {
                    started_at,
                    finished_at,
                    exit_code,
                    message: state.error.unwrap_or_default(),
                }
            }
        };

        Ok(status)
    }

    async fn wait(&self, handle: &JobHandle) -> Result<JobResult> {
        let container_name = Self::container_name(&handle.id);

        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(&container_name, Some(options));

        // A non-zero exit comes back as an error from the wait stream;
        // the inspected status below carries the real exit code.
        let exit_code = match stream.next().await {
            Some(Ok(response)) => Some(response.status_code as i32),
            Some(Err(e)) => {
                debug!(error = %e, "Wait returned error");
                None
            }
            None => None,
        };

        let status = self.status(handle).await;
        self.cleanup(&container_name).await;

        let status = status?;
        let exit_code = match &status {
            JobStatus::Failed { exit_code, .. } => *exit_code,
            JobStatus::Succeeded { .. } => Some(0),
            _ => exit_code,
        };

        Ok(JobResult {
            job: container_name,
            status,
            exit_code,
        })
    }
}
