//! Builds code chunks for one source file
//!
//! Parses the file, extracts symbol spans, slices their code and collects raw
//! dependency names. No I/O happens here; the file content is already loaded.

use super::dependency_analyzer::{DependencyAnalyzer, DependencyStrategy};
use super::file_info::FileInfo;
use super::symbol_extractor::SymbolExtractor;
use super::CodeChunk;
use crate::error::ChunkingError;
use tree_sitter::Parser;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkBuilder {
    analyzer: DependencyAnalyzer,
}

impl ChunkBuilder {
    pub fn new(strategy: DependencyStrategy) -> Self {
        Self {
            analyzer: DependencyAnalyzer::new(strategy),
        }
    }

    /// Build the chunks for one file.
    ///
    /// Dependencies are raw names; `dependents` is left empty for the reconciler.
    pub fn build(&self, project_id: &str, file: &FileInfo) -> Result<Vec<CodeChunk>, ChunkingError> {
        let mut parser = Parser::new();
        parser
            .set_language(&file.language.grammar())
            .map_err(|e| ChunkingError::ParseFailed {
                file: file.relative_path.clone(),
                reason: format!("failed to load {} grammar: {}", file.language.name(), e),
            })?;

        let tree = parser
            .parse(&file.content, None)
            .ok_or_else(|| ChunkingError::ParseFailed {
                file: file.relative_path.clone(),
                reason: "parser returned no tree".to_string(),
            })?;

        if tree.root_node().has_error() {
            tracing::debug!(
                "Syntax errors in {}, extracting what parsed",
                file.relative_path
            );
        }

        let lines: Vec<&str> = file.content.lines().collect();
        let symbols = SymbolExtractor::extract_nodes(&tree, &file.content, &lines);

        let chunks = symbols
            .into_iter()
            .map(|symbol| {
                let span = symbol.span;
                let code = lines[span.line_start - 1..span.line_end].join("\n");
                let dependencies =
                    self.analyzer
                        .analyze(symbol.node, &file.content, &code, &span.name);
                let mut chunk = CodeChunk::new(
                    project_id,
                    &file.relative_path,
                    span.name,
                    span.kind,
                    code,
                    span.line_start,
                    span.line_end,
                );
                chunk.dependencies = dependencies;
                chunk
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Built {} chunks from {}",
            chunks.len(),
            file.relative_path
        );
        Ok(chunks)
    }
}
