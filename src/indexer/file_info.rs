//! File information structure for source files handed to the chunk builder

use super::language::SourceLanguage;
use std::path::PathBuf;

/// A source file read from disk, ready for extraction
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the project root, always with `/` separators
    pub relative_path: String,
    pub language: SourceLanguage,
    pub content: String,
}
