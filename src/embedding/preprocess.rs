//! Text preparation before chunks are sent to the embedding model

use crate::config::EmbeddingConfig;
use crate::indexer::CodeChunk;
use regex::Regex;
use std::sync::LazyLock;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment regex"));

// `//` not preceded by `:` so URLs inside strings survive
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(^|[^:])//.*$").expect("valid line comment regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    pub annotate_path: bool,
    pub max_chars: usize,
}

impl From<&EmbeddingConfig> for PreprocessOptions {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            annotate_path: config.annotate_path,
            max_chars: config.max_input_chars,
        }
    }
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            annotate_path: true,
            max_chars: 8000,
        }
    }
}

pub fn strip_comments(code: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(code, " ");
    LINE_COMMENT.replace_all(&without_blocks, "$1").into_owned()
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Truncate to at most `max_chars` characters, never splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// The text embedded for a chunk
pub fn chunk_text(chunk: &CodeChunk, options: &PreprocessOptions) -> String {
    let body = collapse_whitespace(&strip_comments(&chunk.code));
    let text = if options.annotate_path {
        format!("{} {}: {}", chunk.path, chunk.name, body)
    } else {
        body
    };
    truncate_chars(&text, options.max_chars).to_string()
}

/// The text embedded for a search query
pub fn query_text(query: &str, options: &PreprocessOptions) -> String {
    truncate_chars(&collapse_whitespace(query), options.max_chars).to_string()
}
