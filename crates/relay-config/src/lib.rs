//! KDL descriptor parsing for the relay CI event dispatcher.
//!
//! This crate handles:
//! - The pipeline descriptor (relay.kdl): images, paths and labels for the
//!   unit-test and status-report jobs
//! - `${var}` interpolation in descriptor templates

pub mod descriptor;
pub mod error;
pub mod template;

pub use descriptor::{DescriptorConfig, StatusReportConfig, UnitTestConfig, parse_descriptor};
pub use error::{ConfigError, ConfigResult};
pub use template::TemplateContext;
