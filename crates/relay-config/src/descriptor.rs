//! Pipeline descriptor parsing.
//!
//! A descriptor tunes the two jobs the dispatcher builds. Every node is
//! optional; anything left out keeps the built-in default.
//!
//! ```kdl
//! unit-test {
//!     image "golang:1.9"
//!     gopath "/go"
//!     package "github.com/spotahome/kooper"
//!     source "/src"
//!     make-target "ci"
//! }
//! status-report {
//!     image "technosophos/github-notify:latest"
//!     description "Brigade build finished with ${trigger} state"
//! }
//! ```

use crate::template::referenced_variables;
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Variables a status description may reference.
pub const DESCRIPTION_VARIABLES: [&str; 4] = ["trigger", "commit", "repo", "event"];

/// Settings for the job that runs the project's test suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTestConfig {
    /// Toolchain image.
    pub image: String,
    /// GOPATH inside the container.
    pub gopath: String,
    /// Import path of the project below `$GOPATH/src`.
    pub package: String,
    /// Where the runtime places the checked-out source.
    pub source: String,
    /// Make target that runs CI.
    pub make_target: String,
}

impl UnitTestConfig {
    /// Directory the source is moved into before building.
    pub fn dest_path(&self) -> String {
        format!(
            "{}/src/{}",
            self.gopath.trim_end_matches('/'),
            self.package.trim_matches('/')
        )
    }
}

impl Default for UnitTestConfig {
    fn default() -> Self {
        Self {
            image: "golang:1.9".to_string(),
            gopath: "/go".to_string(),
            package: "github.com/spotahome/kooper".to_string(),
            source: "/src".to_string(),
            make_target: "ci".to_string(),
        }
    }
}

/// Settings for the job that reports commit status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReportConfig {
    /// Notifier image; its entrypoint performs the call.
    pub image: String,
    /// Description template.
    pub description: String,
}

impl Default for StatusReportConfig {
    fn default() -> Self {
        Self {
            image: "technosophos/github-notify:latest".to_string(),
            description: "Brigade build finished with ${trigger} state".to_string(),
        }
    }
}

/// Full descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorConfig {
    pub unit_test: UnitTestConfig,
    pub status_report: StatusReportConfig,
}

/// Parse a descriptor from KDL text.
pub fn parse_descriptor(kdl: &str) -> ConfigResult<DescriptorConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut config = DescriptorConfig::default();
    let mut seen_unit_test = false;
    let mut seen_status_report = false;

    for node in doc.nodes() {
        match node.name().value() {
            "unit-test" => {
                if seen_unit_test {
                    return Err(ConfigError::Duplicate("unit-test".to_string()));
                }
                seen_unit_test = true;
                parse_unit_test(node, &mut config.unit_test)?;
            }
            "status-report" => {
                if seen_status_report {
                    return Err(ConfigError::Duplicate("status-report".to_string()));
                }
                seen_status_report = true;
                parse_status_report(node, &mut config.status_report)?;
            }
            _ => {} // Ignore unknown nodes
        }
    }

    validate_description(&config.status_report.description)?;

    Ok(config)
}

/// Read and parse a descriptor file.
pub fn load_descriptor(path: impl AsRef<Path>) -> ConfigResult<DescriptorConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_descriptor(&content)
}

fn parse_unit_test(node: &KdlNode, config: &mut UnitTestConfig) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        let field = child.name().value();
        let target = match field {
            "image" => &mut config.image,
            "gopath" => &mut config.gopath,
            "package" => &mut config.package,
            "source" => &mut config.source,
            "make-target" | "make_target" => &mut config.make_target,
            _ => continue,
        };
        *target = required_string_arg(child, &format!("unit-test.{}", field))?;
    }

    for (field, value) in [("gopath", &config.gopath), ("source", &config.source)] {
        if !value.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: format!("unit-test.{}", field),
                message: format!("'{}' is not an absolute path", value),
            });
        }
    }

    Ok(())
}

fn parse_status_report(node: &KdlNode, config: &mut StatusReportConfig) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        let field = child.name().value();
        let target = match field {
            "image" => &mut config.image,
            "description" => &mut config.description,
            "context" => {
                return Err(ConfigError::InvalidValue {
                    field: "status-report.context".to_string(),
                    message: "the status context is always 'brigade'".to_string(),
                });
            }
            _ => continue,
        };
        *target = required_string_arg(child, &format!("status-report.{}", field))?;
    }

    Ok(())
}

fn validate_description(template: &str) -> ConfigResult<()> {
    for var in referenced_variables(template) {
        if !DESCRIPTION_VARIABLES.contains(&var.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "status-report.description".to_string(),
                message: format!(
                    "unknown variable '${{{}}}', expected one of {:?}",
                    var, DESCRIPTION_VARIABLES
                ),
            });
        }
    }
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn required_string_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    let value =
        get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(value)
}
