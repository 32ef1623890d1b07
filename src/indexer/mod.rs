//! Source walking, symbol extraction and chunk building
//!
//! Turns TypeScript/JavaScript files into symbol-level [`CodeChunk`]s carrying raw
//! dependency names. Resolution of those names happens in [`crate::graph`].

mod chunk_builder;
mod dependency_analyzer;
mod file_info;
mod file_walker;
mod language;
mod symbol_extractor;

pub use chunk_builder::ChunkBuilder;
pub use dependency_analyzer::{
    DependencyAnalyzer, DependencyStrategy, is_builtin, lexical_references, structural_references,
};
pub use file_info::FileInfo;
pub use file_walker::{FileWalker, LoadedFiles};
pub use language::SourceLanguage;
pub use symbol_extractor::{ExtractedSymbol, SymbolExtractor, SymbolSpan, is_valid_symbol_name};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification of a chunk's symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Function,
    Class,
    Type,
    Constant,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Type => "type",
            Self::Constant => "constant",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(Self::Function),
            "class" => Ok(Self::Class),
            "type" => Ok(Self::Type),
            "constant" => Ok(Self::Constant),
            other => Err(format!("unknown chunk type '{}'", other)),
        }
    }
}

/// One symbol-scoped unit of source code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChunk {
    pub id: String,
    pub project_id: String,
    /// Path relative to the project root, `/`-separated
    pub path: String,
    pub name: String,
    pub chunk_type: ChunkType,
    /// Verbatim text of lines `line_start..=line_end`
    pub code: String,
    /// 1-based, inclusive
    pub line_start: usize,
    /// 1-based, inclusive
    pub line_end: usize,
    /// Names of chunks this chunk references
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Names of chunks referencing this chunk
    #[serde(default)]
    pub dependents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CodeChunk {
    /// A fresh chunk with a new id and no dependency information
    pub fn new(
        project_id: &str,
        path: &str,
        name: impl Into<String>,
        chunk_type: ChunkType,
        code: impl Into<String>,
        line_start: usize,
        line_end: usize,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            path: path.to_string(),
            name: name.into(),
            chunk_type,
            code: code.into(),
            line_start,
            line_end,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            embedding: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The upsert key within a project
    pub fn key(&self) -> (&str, &str) {
        (&self.path, &self.name)
    }
}
