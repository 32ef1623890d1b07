use super::VersionControl;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Outcome of comparing the last indexed revision with the working copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChangeStatus {
    /// No working copy, or the VCS could not answer
    NotApplicable,
    /// Never indexed at a known revision
    FirstRun { revision: String },
    Unchanged { revision: String },
    Changed {
        from: String,
        revision: String,
        changed_files: Vec<String>,
    },
}

impl ChangeStatus {
    pub fn has_changes(&self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }

    /// Changed paths for an incremental run; empty for every other status
    pub fn changed_files(&self) -> &[String] {
        match self {
            Self::Changed { changed_files, .. } => changed_files,
            _ => &[],
        }
    }

    /// Revision to record after a successful run
    pub fn revision(&self) -> Option<&str> {
        match self {
            Self::NotApplicable => None,
            Self::FirstRun { revision }
            | Self::Unchanged { revision }
            | Self::Changed { revision, .. } => Some(revision),
        }
    }
}

/// Detects what changed in a project since it was last indexed
pub struct ChangeDetector<'a> {
    vcs: &'a dyn VersionControl,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(vcs: &'a dyn VersionControl) -> Self {
        Self { vcs }
    }

    pub fn detect(&self, root: &Path, last_revision: Option<&str>) -> ChangeStatus {
        if !self.vcs.is_working_copy(root) {
            tracing::debug!("{} is not a working copy", root.display());
            return ChangeStatus::NotApplicable;
        }

        let Some(revision) = self.vcs.current_revision(root) else {
            tracing::warn!(
                "No current revision for {}, falling back to a full run",
                root.display()
            );
            return ChangeStatus::NotApplicable;
        };

        let Some(from) = last_revision.filter(|r| !r.is_empty()) else {
            return ChangeStatus::FirstRun { revision };
        };

        if from == revision {
            return ChangeStatus::Unchanged { revision };
        }

        match self.vcs.changed_paths(root, from, &revision) {
            Some(changed_files) => {
                tracing::info!(
                    "{} file(s) changed between {} and {}",
                    changed_files.len(),
                    short(from),
                    short(&revision)
                );
                ChangeStatus::Changed {
                    from: from.to_string(),
                    revision,
                    changed_files,
                }
            }
            None => {
                tracing::warn!(
                    "Could not diff {} against {}, falling back to a full run",
                    short(from),
                    short(&revision)
                );
                ChangeStatus::NotApplicable
            }
        }
    }
}

fn short(revision: &str) -> &str {
    revision.get(..8).unwrap_or(revision)
}

/// What an analyze run will do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPlan {
    Full,
    Skip,
    Incremental(Vec<String>),
}

impl RunPlan {
    pub fn decide(force_full: bool, status: &ChangeStatus) -> Self {
        if force_full {
            return Self::Full;
        }
        match status {
            ChangeStatus::NotApplicable | ChangeStatus::FirstRun { .. } => Self::Full,
            ChangeStatus::Unchanged { .. } => Self::Skip,
            ChangeStatus::Changed { changed_files, .. } => {
                Self::Incremental(changed_files.clone())
            }
        }
    }
}
