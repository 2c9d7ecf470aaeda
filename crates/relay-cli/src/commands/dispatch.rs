//! Event dispatch command.

use anyhow::{Context, Result};
use relay_core::Executor;
use relay_dispatcher::Dispatcher;
use relay_executor::{DryRunExecutor, LocalDockerExecutor};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{load_config, project, read_event};
use crate::ProjectArgs;

/// Dispatch one event and print what happened.
pub async fn run(
    config_path: Option<&str>,
    event_source: &str,
    project_args: ProjectArgs,
    source: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let event = read_event(event_source)?;
    let project = project(project_args)?;

    let executor: Arc<dyn Executor> = if dry_run {
        info!("Dry run, jobs will be recorded but not started");
        Arc::new(DryRunExecutor::new())
    } else {
        let mut docker = LocalDockerExecutor::new().context("Failed to connect to Docker")?;
        if let Some(source) = source {
            let host_path = Path::new(&source)
                .canonicalize()
                .with_context(|| format!("Failed to resolve source directory: {}", source))?;
            info!(source = %host_path.display(), "Mounting source checkout");
            docker = docker.with_source(host_path, config.unit_test.source.clone());
        }
        Arc::new(docker)
    };

    let dispatcher = Dispatcher::new(config, executor);
    let outcome = dispatcher
        .dispatch(&event, &project)
        .await
        .with_context(|| format!("Failed to handle '{}' event", event.kind))?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
