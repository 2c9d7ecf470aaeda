//! Variable interpolation for descriptor templates.
//!
//! Supports variables like:
//! - `${trigger}` - How the pipeline ended (e.g. `success`)
//! - `${commit}` - Commit the pipeline built
//! - `${repo}` - Repository name
//! - `${event}` - Type of the event that started the pipeline
//!
//! Unknown variables are left in place.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}")
        .expect("variable pattern is valid")
});

/// Values available to a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|s| s.as_str())
    }

    /// Replace every `${name}` the context knows about.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }
}

/// Names of all `${...}` references in a template.
pub fn referenced_variables(input: &str) -> Vec<String> {
    VAR_REGEX
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .collect()
}
