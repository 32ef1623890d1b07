//! File walking for full runs and changed-file loading for incremental runs

use super::file_info::FileInfo;
use super::language::SourceLanguage;
use crate::config::IndexingConfig;
use crate::error::IndexingError;
use anyhow::{Context, Result};
use ignore::gitignore::Gitignore;
use ignore::{Match, WalkBuilder};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub struct FileWalker {
    pub(crate) root: PathBuf,
    pub(crate) max_file_size: usize,
    pub(crate) extensions: Vec<String>,
    pub(crate) ignored_dirs: Vec<String>,
}

/// Outcome of loading an explicit list of project-relative paths
#[derive(Debug, Default)]
pub struct LoadedFiles {
    /// Eligible source files that exist and could be read
    pub files: Vec<FileInfo>,
    /// Paths that no longer exist on disk (deleted since the baseline)
    pub missing: Vec<String>,
    /// Paths that exist but are not eligible (extension, ignored dir, `.gitignore`, size,
    /// encoding)
    pub skipped: Vec<String>,
}

impl FileWalker {
    pub fn new(root: impl AsRef<Path>, max_file_size: usize) -> Self {
        let defaults = IndexingConfig::default();
        Self {
            root: root.as_ref().to_path_buf(),
            max_file_size,
            extensions: defaults.extensions,
            ignored_dirs: defaults.ignored_dirs,
        }
    }

    pub fn from_config(root: impl AsRef<Path>, config: &IndexingConfig) -> Self {
        Self::new(root, config.max_file_size)
            .with_extensions(config.extensions.clone())
            .with_ignored_dirs(config.ignored_dirs.clone())
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn with_ignored_dirs(mut self, ignored_dirs: Vec<String>) -> Self {
        self.ignored_dirs = ignored_dirs;
        self
    }

    /// Walk the project root and collect every eligible source file
    pub fn walk(&self) -> Result<Vec<FileInfo>> {
        self.check_root()?;

        let ignored = self.ignored_dirs.clone();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(true) // Respect .gitignore, .ignore, etc.
            .hidden(false)
            .require_git(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| ignored.iter().any(|d| d == name)))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry
                .map_err(|e| IndexingError::WalkFailed(e.to_string()))
                .context("Failed to read directory entry")?;
            let path = entry.path();

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            if let Some(file) = self.read_eligible(path) {
                files.push(file);
            }
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        tracing::info!("Found {} source files under {:?}", files.len(), self.root);
        Ok(files)
    }

    /// Load an explicit list of project-relative paths (the changed-file set)
    ///
    /// Fails without reading anything if any path escapes the project root.
    pub fn load(&self, relative_paths: &[String]) -> Result<LoadedFiles> {
        self.check_root()?;

        let resolved = relative_paths
            .iter()
            .map(|rel| self.resolve_relative(rel).map(|abs| (rel, abs)))
            .collect::<Result<Vec<_>>>()?;

        let mut loaded = LoadedFiles::default();
        for (rel, abs) in resolved {
            if !abs.exists() {
                tracing::debug!("Changed path no longer exists: {}", rel);
                loaded.missing.push(normalize_separators(rel));
                continue;
            }
            if self.in_ignored_dir(rel) || !abs.is_file() || self.is_gitignored(rel, &abs) {
                loaded.skipped.push(rel.clone());
                continue;
            }
            match self.read_eligible(&abs) {
                Some(file) => loaded.files.push(file),
                None => loaded.skipped.push(rel.clone()),
            }
        }

        tracing::info!(
            "Loaded {} changed source files ({} missing, {} skipped)",
            loaded.files.len(),
            loaded.missing.len(),
            loaded.skipped.len()
        );
        Ok(loaded)
    }

    /// Join a project-relative path onto the root, rejecting anything that escapes it
    pub fn resolve_relative(&self, relative: &str) -> Result<PathBuf> {
        let candidate = Path::new(relative);
        let escapes = candidate.is_absolute()
            || candidate.components().any(|c| {
                matches!(
                    c,
                    Component::ParentDir | Component::RootDir | Component::Prefix(_)
                )
            });
        if escapes || relative.is_empty() {
            return Err(IndexingError::PathOutsideRoot(relative.to_string()).into());
        }
        Ok(self.root.join(candidate))
    }

    /// Whether a path (by extension) is a source file this walker accepts
    pub fn language_for(&self, path: &Path) -> Option<SourceLanguage> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if !self.extensions.iter().any(|e| *e == ext) {
            return None;
        }
        SourceLanguage::from_extension(&ext)
    }

    fn check_root(&self) -> Result<()> {
        if !self.root.exists() {
            return Err(IndexingError::DirectoryNotFound(self.root.display().to_string()).into());
        }
        if !self.root.is_dir() {
            return Err(IndexingError::NotADirectory(self.root.display().to_string()).into());
        }
        Ok(())
    }

    fn in_ignored_dir(&self, relative: &str) -> bool {
        Path::new(relative).components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|name| self.ignored_dirs.iter().any(|d| d == name))
        })
    }

    /// Apply every `.gitignore` from the root down to the file's directory, deeper files
    /// overriding shallower ones, as the full walk does
    fn is_gitignored(&self, relative: &str, abs: &Path) -> bool {
        let mut ignored = false;
        let mut dir = self.root.clone();
        let mut components = relative.split('/').peekable();

        while let Some(component) = components.next() {
            let gitignore = dir.join(".gitignore");
            if gitignore.is_file() {
                let (matcher, err) = Gitignore::new(&gitignore);
                if let Some(e) = err {
                    tracing::debug!("Partial parse of {:?}: {}", gitignore, e);
                }
                match matcher.matched_path_or_any_parents(abs, false) {
                    Match::Ignore(_) => ignored = true,
                    Match::Whitelist(_) => ignored = false,
                    Match::None => {}
                }
            }
            if components.peek().is_some() {
                dir.push(component);
            }
        }
        ignored
    }

    fn read_eligible(&self, path: &Path) -> Option<FileInfo> {
        let language = self.language_for(path)?;

        if let Ok(metadata) = fs::metadata(path)
            && metadata.len() > self.max_file_size as u64
        {
            tracing::debug!("Skipping large file: {:?}", path);
            return None;
        }

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!("Skipping unreadable file {:?}: {}", path, e);
                return None;
            }
        };

        Some(FileInfo {
            path: path.to_path_buf(),
            relative_path: self.relative_path(path),
            language,
            content,
        })
    }

    pub(crate) fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        normalize_separators(&relative.to_string_lossy())
    }
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}
