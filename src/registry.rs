//! Persisted list of known projects and the revision each was last indexed at

use crate::error::{ChunkGraphError, RegistryError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Absolute, canonical project root
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Revision of the last successful analyze run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_hash: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectRegistry {
    pub projects: Vec<Project>,
}

/// Project names are 1-64 characters of ASCII letters, digits, `-`, `_` or `.`
pub fn validate_project_name(name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && name.chars().any(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidProjectName(format!(
            "'{}' (use 1-{} letters, digits, '-', '_' or '.')",
            name, MAX_NAME_LEN
        )))
    }
}

impl ProjectRegistry {
    /// Load the registry, starting empty when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ChunkGraphError> {
        if !path.exists() {
            tracing::debug!("Project registry not found at {:?}, starting empty", path);
            return Ok(Self::default());
        }

        let load_failed = |reason: String| RegistryError::LoadFailed {
            path: path.display().to_string(),
            reason,
        };
        let content = fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        let registry: ProjectRegistry =
            serde_json::from_str(&content).map_err(|e| load_failed(e.to_string()))?;

        tracing::info!("Loaded {} project(s) from registry", registry.projects.len());
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<(), ChunkGraphError> {
        let save_failed = |reason: String| RegistryError::SaveFailed {
            path: path.display().to_string(),
            reason,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        let content =
            serde_json::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;

        tracing::debug!("Saved project registry to {:?}", path);
        Ok(())
    }

    /// Register a new project. `path` must already be canonical.
    pub fn create(
        &mut self,
        name: &str,
        path: PathBuf,
        description: Option<String>,
    ) -> Result<Project, ValidationError> {
        validate_project_name(name)?;
        if self.projects.iter().any(|p| p.name == name) {
            return Err(ValidationError::DuplicateProject(name.to_string()));
        }
        if let Some(existing) = self.projects.iter().find(|p| p.path == path) {
            return Err(ValidationError::DuplicateProject(format!(
                "{} is already registered as '{}'",
                path.display(),
                existing.name
            )));
        }

        let project = Project {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            path,
            description: description.filter(|d| !d.trim().is_empty()),
            last_commit_hash: None,
            created_at: chrono::Utc::now().timestamp(),
        };
        self.projects.push(project.clone());
        Ok(project)
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Find a project by id, falling back to name
    pub fn resolve(&self, id_or_name: &str) -> Result<&Project, ValidationError> {
        self.get(id_or_name)
            .or_else(|| self.projects.iter().find(|p| p.name == id_or_name))
            .ok_or_else(|| ValidationError::ProjectNotFound(id_or_name.to_string()))
    }

    pub fn list(&self) -> &[Project] {
        &self.projects
    }

    pub fn remove(&mut self, id_or_name: &str) -> Result<Project, ValidationError> {
        let id = self.resolve(id_or_name)?.id.clone();
        let idx = self
            .projects
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ValidationError::ProjectNotFound(id_or_name.to_string()))?;
        Ok(self.projects.remove(idx))
    }

    pub fn update_last_revision(
        &mut self,
        id: &str,
        revision: Option<String>,
    ) -> Result<(), ValidationError> {
        let project = self
            .projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ValidationError::ProjectNotFound(id.to_string()))?;
        project.last_commit_hash = revision;
        Ok(())
    }
}
