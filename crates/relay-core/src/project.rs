//! Project configuration supplied by the CI runtime.

use serde::Deserialize;

use crate::secret::Secret;
use crate::{Error, Result};

/// CI configuration for one repository.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub repo: RepoConfig,
}

/// Repository coordinates and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    /// Full repository name, e.g. `org/repo`.
    pub name: String,
    /// Token used to talk to the source-control host.
    pub token: Secret,
}

impl Project {
    pub fn new(name: impl Into<String>, token: impl Into<Secret>) -> Self {
        Self {
            repo: RepoConfig {
                name: name.into(),
                token: token.into(),
            },
        }
    }

    /// Parse a project from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self> {
        let project: Project = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("project: {}", e)))?;
        project.validate()?;
        Ok(project)
    }

    pub fn validate(&self) -> Result<()> {
        if self.repo.name.trim().is_empty() {
            return Err(Error::InvalidInput("project repo name is empty".to_string()));
        }
        Ok(())
    }
}
