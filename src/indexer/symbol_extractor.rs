//! Symbol extraction from tree-sitter syntax trees
//!
//! Walks every node of a TypeScript/JavaScript tree in depth-first pre-order and
//! yields one span per named declaration. Nested declarations are extracted on their
//! own, so a class and each of its methods produce overlapping spans.

use super::ChunkType;
use tree_sitter::{Node, Tree};

/// Node kinds that may carry a symbol name
const NAME_KINDS: &[&str] = &[
    "identifier",
    "type_identifier",
    "property_identifier",
    "private_property_identifier",
];

/// Minimum number of non-blank lines a binding (variable or class field) needs to
/// become a chunk. Declarations such as `function f() { ... }` have no floor, so
/// one-line functions, classes and types are still extracted.
const MIN_BINDING_LINES: usize = 2;

/// Node kinds that bind a name to a value rather than declare a symbol
const BINDING_KINDS: &[&str] = &[
    "variable_declarator",
    "public_field_definition",
    "field_definition",
];

/// A declaration found in a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSpan {
    pub kind: ChunkType,
    pub name: String,
    /// 1-based, inclusive
    pub line_start: usize,
    /// 1-based, inclusive
    pub line_end: usize,
}

/// A span together with the node it came from, for structural dependency analysis
#[derive(Debug, Clone)]
pub struct ExtractedSymbol<'tree> {
    pub span: SymbolSpan,
    pub node: Node<'tree>,
}

pub struct SymbolExtractor;

impl SymbolExtractor {
    /// Extract all symbol spans from a parsed file
    pub fn extract(tree: &Tree, source: &str, lines: &[&str]) -> Vec<SymbolSpan> {
        Self::extract_nodes(tree, source, lines)
            .into_iter()
            .map(|s| s.span)
            .collect()
    }

    /// Extract symbol spans and keep a handle on each declaration node
    pub fn extract_nodes<'tree>(
        tree: &'tree Tree,
        source: &str,
        lines: &[&str],
    ) -> Vec<ExtractedSymbol<'tree>> {
        let mut symbols = Vec::new();
        let mut cursor = tree.walk();

        loop {
            let node = cursor.node();
            if let Some(span) = Self::classify(node, source, lines) {
                symbols.push(ExtractedSymbol { span, node });
            }

            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return symbols;
                }
            }
        }
    }

    fn classify(node: Node<'_>, source: &str, lines: &[&str]) -> Option<SymbolSpan> {
        if !node.is_named() {
            return None;
        }

        let kind = match node.kind() {
            "function_declaration"
            | "generator_function_declaration"
            | "method_definition"
            | "arrow_function"
            | "function_expression"
            | "generator_function" => ChunkType::Function,
            "class_declaration" | "abstract_class_declaration" => ChunkType::Class,
            "interface_declaration" | "type_alias_declaration" | "enum_declaration" => {
                ChunkType::Type
            }
            "variable_declarator" | "public_field_definition" | "field_definition" => {
                if node
                    .child_by_field_name("value")
                    .is_some_and(|value| is_function_like(value.kind()))
                {
                    ChunkType::Function
                } else {
                    ChunkType::Constant
                }
            }
            _ => return None,
        };

        let name = symbol_name(node, source)?;
        let (line_start, line_end) = line_span(node, lines.len())?;

        if BINDING_KINDS.contains(&node.kind())
            && effective_lines(lines, line_start, line_end) < MIN_BINDING_LINES
        {
            return None;
        }

        Some(SymbolSpan {
            kind,
            name,
            line_start,
            line_end,
        })
    }
}

fn is_function_like(kind: &str) -> bool {
    matches!(
        kind,
        "arrow_function" | "function_expression" | "generator_function"
    )
}

/// Name from the node's own `name` field (`property` for JS class fields)
fn symbol_name(node: Node<'_>, source: &str) -> Option<String> {
    let name_node = node
        .child_by_field_name("name")
        .or_else(|| node.child_by_field_name("property"))?;

    if !NAME_KINDS.contains(&name_node.kind()) {
        return None;
    }

    let name = name_node.utf8_text(source.as_bytes()).ok()?.trim();
    is_valid_symbol_name(name).then(|| name.to_string())
}

/// A usable name is non-empty and has at least one alphanumeric character
pub fn is_valid_symbol_name(name: &str) -> bool {
    name.chars().any(char::is_alphanumeric)
}

/// 1-based inclusive line span of a node, clamped to the file
fn line_span(node: Node<'_>, total_lines: usize) -> Option<(usize, usize)> {
    if total_lines == 0 {
        return None;
    }
    let start = node.start_position();
    let end = node.end_position();

    let line_start = start.row + 1;
    let mut line_end = end.row + 1;
    // A node ending at column 0 stops before that line's content
    if end.column == 0 && end.row > start.row {
        line_end -= 1;
    }
    let line_end = line_end.min(total_lines);

    (line_start <= line_end).then_some((line_start, line_end))
}

fn effective_lines(lines: &[&str], line_start: usize, line_end: usize) -> usize {
    lines[line_start - 1..line_end]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .count()
}
