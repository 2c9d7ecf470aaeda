//! Event routing, job construction and outcome reporting.
//!
//! The runtime hands each event to [`Dispatcher::dispatch`], which looks up
//! the handler registered for the event type in a [`HandlerTable`] and runs
//! it to completion:
//! - `push`, `pull_request`: run the unit-test job
//! - `exec`: dump the event, then run the unit-test job
//! - `after`, `error`: report the build outcome as a commit status

pub mod dispatcher;
pub mod handler;
pub mod jobs;
pub mod status;

pub use dispatcher::{DispatchOutcome, Dispatcher, Planner};
pub use handler::{Handler, HandlerTable};
pub use status::CommitState;
