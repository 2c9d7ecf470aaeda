//! CLI command implementations.

pub mod dispatch;

use anyhow::{Context, Result};
use relay_config::DescriptorConfig;
use relay_config::descriptor::load_descriptor;
use relay_core::{Event, Project};
use relay_dispatcher::{HandlerTable, Planner};
use std::io::Read;

use crate::ProjectArgs;

/// Load the descriptor, falling back to built-in defaults when none is given.
pub fn load_config(path: Option<&str>) -> Result<DescriptorConfig> {
    match path {
        Some(path) => load_descriptor(path)
            .with_context(|| format!("Failed to load descriptor: {}", path)),
        None => Ok(DescriptorConfig::default()),
    }
}

/// Read and validate an event from a file, or stdin for `-`.
pub fn read_event(source: &str) -> Result<Event> {
    let json = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read event file: {}", source))?
    };

    Event::from_json(&json).with_context(|| format!("Invalid event: {}", source))
}

pub fn project(args: ProjectArgs) -> Result<Project> {
    let project = Project::new(args.repo, args.token);
    project.validate()?;
    Ok(project)
}

pub fn render(config_path: Option<&str>, event_source: &str, args: ProjectArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let event = read_event(event_source)?;
    let project = project(args)?;

    let jobs = Planner::new(config).plan(&event, &project)?;

    if jobs.is_empty() {
        println!("No jobs for '{}' event", event.kind);
    }
    for job in jobs {
        print!("{}", job);
    }
    Ok(())
}

pub fn validate(path: &str) -> Result<()> {
    let config = load_descriptor(path).with_context(|| format!("Invalid descriptor: {}", path))?;
    println!("Configuration is valid");
    println!("  unit-test:     {} ({})", config.unit_test.image, config.unit_test.dest_path());
    println!(
        "  status-report: {} (context {})",
        config.status_report.image,
        relay_dispatcher::jobs::STATUS_CONTEXT
    );
    Ok(())
}

pub fn handlers() {
    for (event, handler) in HandlerTable::standard().entries() {
        println!("{:<14} {}", event, handler);
    }
}
