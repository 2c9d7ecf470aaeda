//! Job execution backends for the relay CI event dispatcher.
//!
//! Provides executor implementations for running jobs:
//! - Local Docker
//! - Dry run (records jobs without running anything)

pub mod docker;
pub mod dry_run;

pub use docker::LocalDockerExecutor;
pub use dry_run::DryRunExecutor;
pub use relay_core::executor::{
    Executor, JobHandle, JobResult, JobSpec, JobStatus, LogLine, LogStream,
};
