//! Version control access for incremental runs
//!
//! The [`VersionControl`] trait is the only thing the pipeline knows about the VCS.
//! Every method degrades instead of failing; callers treat `None` as "unknown".

mod change_detector;

pub use change_detector::{ChangeDetector, ChangeStatus, RunPlan};

use crate::error::VcsError;
use git2::{DiffOptions, Oid, Repository};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Revision queries against a project's working copy
pub trait VersionControl: Send + Sync {
    /// Whether `root` lies inside a working copy
    fn is_working_copy(&self, root: &Path) -> bool;

    /// Current revision id of the working copy containing `root`
    fn current_revision(&self, root: &Path) -> Option<String>;

    /// Paths changed between two revisions, relative to `root` and `/`-separated.
    ///
    /// Covers both sides of every delta. Paths outside `root` are dropped.
    /// `None` means the diff could not be computed.
    fn changed_paths(&self, root: &Path, from: &str, to: &str) -> Option<Vec<String>>;
}

/// [`VersionControl`] backed by libgit2
#[derive(Debug, Clone, Copy, Default)]
pub struct GitVersionControl;

impl GitVersionControl {
    pub fn new() -> Self {
        Self
    }

    fn open(root: &Path) -> Result<Repository, VcsError> {
        Repository::discover(root)
            .map_err(|e| VcsError::RepoNotFound(format!("{}: {}", root.display(), e)))
    }

    fn head_revision(root: &Path) -> Result<String, VcsError> {
        let repo = Self::open(root)?;
        let commit = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(|e| VcsError::InvalidRevision(format!("HEAD: {}", e)))?;
        Ok(commit.id().to_string())
    }

    fn diff_paths(root: &Path, from: &str, to: &str) -> Result<Vec<String>, VcsError> {
        let repo = Self::open(root)?;
        let workdir = repo.workdir().ok_or_else(|| {
            VcsError::RepoNotFound(format!("{} is a bare repository", root.display()))
        })?;

        let old_tree = Self::tree_for(&repo, from)?;
        let new_tree = Self::tree_for(&repo, to)?;

        let mut opts = DiffOptions::new();
        opts.include_typechange(true);
        let diff = repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))
            .map_err(|e| VcsError::DiffFailed(e.to_string()))?;

        let prefix = project_prefix(workdir, root);
        let mut paths = BTreeSet::new();
        for delta in diff.deltas() {
            for side in [delta.old_file().path(), delta.new_file().path()]
                .into_iter()
                .flatten()
            {
                if let Some(relative) = strip_project_prefix(side, prefix.as_deref()) {
                    paths.insert(relative);
                }
            }
        }

        Ok(paths.into_iter().collect())
    }

    fn tree_for<'r>(repo: &'r Repository, revision: &str) -> Result<git2::Tree<'r>, VcsError> {
        let oid = Oid::from_str(revision)
            .map_err(|e| VcsError::InvalidRevision(format!("{}: {}", revision, e)))?;
        repo.find_commit(oid)
            .and_then(|commit| commit.tree())
            .map_err(|e| VcsError::InvalidRevision(format!("{}: {}", revision, e)))
    }
}

impl VersionControl for GitVersionControl {
    fn is_working_copy(&self, root: &Path) -> bool {
        match Self::open(root) {
            Ok(repo) => !repo.is_bare(),
            Err(_) => false,
        }
    }

    fn current_revision(&self, root: &Path) -> Option<String> {
        match Self::head_revision(root) {
            Ok(revision) => Some(revision),
            Err(e) => {
                tracing::warn!("Could not read current revision: {}", e);
                None
            }
        }
    }

    fn changed_paths(&self, root: &Path, from: &str, to: &str) -> Option<Vec<String>> {
        match Self::diff_paths(root, from, to) {
            Ok(paths) => Some(paths),
            Err(e) => {
                tracing::warn!("Could not diff {}..{}: {}", from, to, e);
                None
            }
        }
    }
}

/// Project root relative to the repository workdir, `None` when they coincide.
///
/// Both sides are canonicalized so symlinked temp dirs compare equal.
fn project_prefix(workdir: &Path, root: &Path) -> Option<PathBuf> {
    let workdir = workdir.canonicalize().unwrap_or_else(|_| workdir.to_path_buf());
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    root.strip_prefix(&workdir)
        .ok()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn strip_project_prefix(repo_path: &Path, prefix: Option<&Path>) -> Option<String> {
    let relative = match prefix {
        Some(prefix) => repo_path.strip_prefix(prefix).ok()?,
        None => repo_path,
    };
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
