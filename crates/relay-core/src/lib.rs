//! Core domain types and traits for the relay CI event dispatcher.
//!
//! This crate contains:
//! - Events and projects handed over by the CI runtime
//! - Job descriptions and the executor trait that runs them
//! - Secret handling that keeps tokens out of logs

pub mod error;
pub mod event;
pub mod executor;
pub mod id;
pub mod project;
pub mod secret;

pub use error::{Error, Result};
pub use event::{BuildStatus, Cause, CauseEvent, Event, EventType};
pub use executor::{EnvVar, Executor, JobResult, JobSpec, JobStatus, TaskList};
pub use id::JobId;
pub use project::{Project, RepoConfig};
pub use secret::Secret;
