//! Per-chunk dependency name collection
//!
//! Two strategies produce the same output: a deduplicated list of referenced names,
//! excluding built-ins and the chunk's own name. Names are resolved against other
//! chunks later by the graph reconciler.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::LazyLock;
use tree_sitter::Node;

/// How raw dependency names are collected for a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStrategy {
    /// Walk the declaration's syntax subtree
    #[default]
    Structural,
    /// Pattern-match the chunk's source text
    Lexical,
}

impl FromStr for DependencyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structural" => Ok(Self::Structural),
            "lexical" => Ok(Self::Lexical),
            other => Err(format!(
                "unknown dependency strategy '{}' (expected 'structural' or 'lexical')",
                other
            )),
        }
    }
}

/// Runtime and standard-library names that never resolve to project chunks
const BUILTIN_NAMES: &[&str] = &[
    // primitive and utility types
    "string", "number", "boolean", "bigint", "symbol", "any", "unknown", "void", "never",
    "object", "undefined", "null", "true", "false", "this", "super", "Record", "Partial",
    "Required", "Readonly", "Pick", "Omit", "Exclude", "Extract", "NonNullable", "ReturnType",
    "Parameters", "InstanceType", "Awaited", "PromiseLike", "ArrayLike", "Iterable",
    "Iterator", "AsyncIterable", "AsyncIterator", "Generator", "AsyncGenerator",
    // global objects and collections
    "Array", "ReadonlyArray", "Map", "Set", "WeakMap", "WeakSet", "Promise", "Object",
    "String", "Number", "Boolean", "BigInt", "Symbol", "Date", "Error", "TypeError",
    "RangeError", "SyntaxError", "RegExp", "JSON", "Math", "Reflect", "Proxy", "Function",
    "Intl", "ArrayBuffer", "DataView", "Uint8Array", "Int32Array", "Float32Array",
    "Float64Array", "NaN", "Infinity",
    // runtime globals
    "console", "window", "document", "globalThis", "process", "require", "module", "exports",
    "Buffer", "setTimeout", "setInterval", "clearTimeout", "clearInterval", "queueMicrotask",
    "parseInt", "parseFloat", "isNaN", "isFinite", "encodeURIComponent", "decodeURIComponent",
    "fetch", "URL", "URLSearchParams", "arguments",
];

static BUILTINS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| BUILTIN_NAMES.iter().copied().collect());

/// Node kinds whose text is a reference to some declared name
const REFERENCE_KINDS: &[&str] = &[
    "identifier",
    "type_identifier",
    "shorthand_property_identifier",
];

const IDENT: &str = r"[A-Za-z_$][\w$]*";

static IMPORT_NAMED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"import\s+(?:type\s+)?(?:{IDENT}\s*,\s*)?\{{([^}}]*)\}}\s*from"
    ))
    .expect("valid named import pattern")
});

static IMPORT_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"import\s+(?:type\s+)?({IDENT})\s*(?:,|from\b)"))
        .expect("valid default import pattern")
});

static CLASS_EXTENDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"class\s+{IDENT}(?:\s*<[^>{{]*>)?\s+extends\s+({IDENT})"
    ))
    .expect("valid class extends pattern")
});

static IMPLEMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"implements\s+([^{]+)\{").expect("valid implements pattern")
});

static INTERFACE_EXTENDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"interface\s+{IDENT}(?:\s*<[^>{{]*>)?\s+extends\s+([^{{]+)\{{"
    ))
    .expect("valid interface extends pattern")
});

static TYPE_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":\s*([A-Z][\w$]*)").expect("valid type annotation pattern")
});

static LEADING_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{IDENT}")).expect("valid identifier pattern"));

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(name)
}

/// Collects referenced names for chunks using one strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyAnalyzer {
    strategy: DependencyStrategy,
}

impl DependencyAnalyzer {
    pub fn new(strategy: DependencyStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> DependencyStrategy {
        self.strategy
    }

    /// Referenced names for one chunk. `node` is the declaration node and `code` its line-sliced text.
    pub fn analyze(&self, node: Node<'_>, source: &str, code: &str, own_name: &str) -> Vec<String> {
        match self.strategy {
            DependencyStrategy::Structural => structural_references(node, source, own_name),
            DependencyStrategy::Lexical => lexical_references(code, own_name),
        }
    }
}

/// Ordered set of names with the shared exclusion rules
struct NameSet<'a> {
    own_name: &'a str,
    seen: HashSet<String>,
    names: Vec<String>,
}

impl<'a> NameSet<'a> {
    fn new(own_name: &'a str) -> Self {
        Self {
            own_name,
            seen: HashSet::new(),
            names: Vec::new(),
        }
    }

    fn push(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty()
            || name == self.own_name
            || is_builtin(name)
            || !super::symbol_extractor::is_valid_symbol_name(name)
        {
            return;
        }
        if self.seen.insert(name.to_string()) {
            self.names.push(name.to_string());
        }
    }

    fn push_list(&mut self, list: &str) {
        for item in list.split(',') {
            if let Some(m) = LEADING_IDENT.find(item.trim()) {
                self.push(m.as_str());
            }
        }
    }

    fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// Walk a declaration's subtree and record every identifier and type reference
pub fn structural_references(node: Node<'_>, source: &str, own_name: &str) -> Vec<String> {
    let mut names = NameSet::new(own_name);
    let mut cursor = node.walk();

    loop {
        let current = cursor.node();
        if REFERENCE_KINDS.contains(&current.kind())
            && let Ok(text) = current.utf8_text(source.as_bytes())
        {
            names.push(text);
        }

        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return names.into_names();
            }
        }
    }
}

/// Pattern-match imports, inheritance clauses and type annotations in source text
pub fn lexical_references(code: &str, own_name: &str) -> Vec<String> {
    let mut names = NameSet::new(own_name);

    for caps in IMPORT_NAMED.captures_iter(code) {
        for item in caps[1].split(',') {
            let item = item.trim().trim_start_matches("type ").trim();
            // `a as b` refers to the exported `a`
            if let Some(m) = LEADING_IDENT.find(item) {
                names.push(m.as_str());
            }
        }
    }
    for caps in IMPORT_DEFAULT.captures_iter(code) {
        names.push(&caps[1]);
    }
    for caps in CLASS_EXTENDS.captures_iter(code) {
        names.push(&caps[1]);
    }
    for caps in IMPLEMENTS.captures_iter(code) {
        names.push_list(&caps[1]);
    }
    for caps in INTERFACE_EXTENDS.captures_iter(code) {
        names.push_list(&caps[1]);
    }
    for caps in TYPE_ANNOTATION.captures_iter(code) {
        names.push(&caps[1]);
    }

    names.into_names()
}
