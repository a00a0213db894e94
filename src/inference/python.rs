use std::path::Path;

use super::patterns::{self, ImportTable};
use super::{decode_utf8, UnitAnalyzer};
use crate::error::Result;
use crate::ir::{Capability, Indicator, SourceLocation, UnitKind};

pub struct PythonAnalyzer;

/// Accumulates indicators for one file.
struct Collector<'a> {
    file: &'a Path,
    indicators: Vec<Indicator>,
}

impl<'a> Collector<'a> {
    fn new(file: &'a Path) -> Self {
        Self {
            file,
            indicators: Vec::new(),
        }
    }

    fn push(&mut self, capability: Capability, construct: String, line: usize, column: usize) {
        self.indicators.push(Indicator {
            capability,
            construct,
            location: SourceLocation::new(self.file, line, column),
        });
    }

    /// Flags `import module`, returning whether the module itself matched.
    fn import(&mut self, module: &str, line: usize, column: usize) -> bool {
        match patterns::module_capability(module) {
            Some(cap) => {
                self.push(cap, format!("import {module}"), line, column);
                true
            }
            None => false,
        }
    }

    /// Flags `from module import name`. Module-table hits on the name are
    /// only reported when the module was not already flagged.
    fn import_name(
        &mut self,
        module: &str,
        name: &str,
        module_flagged: bool,
        line: usize,
        column: usize,
    ) {
        let qualified = format!("{module}.{name}");
        let cap = patterns::qualified_entry(&qualified).or_else(|| {
            if module_flagged {
                None
            } else {
                patterns::module_capability(&qualified)
            }
        });
        if let Some(cap) = cap {
            self.push(cap, format!("from {module} import {name}"), line, column);
        }
    }

    /// Flags a reference to a dotted name rooted at an imported binding.
    fn reference(&mut self, table: &ImportTable, dotted: &str, line: usize, column: usize) {
        if let Some(idx) = dotted.find(".__dict__") {
            self.lookup(table, &dotted[..idx], None, line, column);
            return;
        }
        if let Some((resolved, cap)) = table.use_site_capability(dotted) {
            self.push(cap, resolved, line, column);
        }
    }

    /// Flags a bare identifier that is not bound by an explicit import:
    /// wildcard-imported members, `__builtins__` and capability builtins,
    /// whether called or passed around as a value.
    fn bare(&mut self, table: &ImportTable, ident: &str, line: usize, column: usize) {
        if table.is_bound(ident) {
            return;
        }
        for candidate in table.wildcard_candidates(ident) {
            if let Some(cap) = patterns::qualified_entry(&candidate) {
                self.push(cap, candidate, line, column);
                return;
            }
        }
        if ident == "__builtins__" {
            self.lookup(table, ident, None, line, column);
        } else if let Some(cap) = patterns::builtin_capability(ident) {
            self.push(cap, ident.to_string(), line, column);
        }
    }

    /// Flags a by-name attribute lookup on a module (`getattr(os, "system")`,
    /// `vars(os)`, `os.__dict__`). A literal attribute name is resolved like
    /// a qualified reference; anything else flags every capability the
    /// module could reach.
    fn lookup(
        &mut self,
        table: &ImportTable,
        target: &str,
        attr: Option<&str>,
        line: usize,
        column: usize,
    ) {
        let root = target.split('.').next().unwrap_or(target);
        let module = if target == "__builtins__" {
            "builtins".to_string()
        } else if table.is_bound(root) {
            table.resolve(target)
        } else {
            return;
        };

        if let Some(name) = attr {
            let qualified = format!("{module}.{name}");
            if let Some(cap) = patterns::qualified_capability(&qualified) {
                self.push(cap, qualified, line, column);
            }
            return;
        }
        for cap in patterns::lookup_capabilities(&module) {
            self.push(cap, format!("dynamic lookup on {module}"), line, column);
        }
    }
}

// ── tree-sitter analyzer ────────────────────────────────────────

#[cfg(feature = "python")]
impl UnitAnalyzer for PythonAnalyzer {
    fn kind(&self) -> UnitKind {
        UnitKind::Python
    }

    fn analyze(&self, path: &Path, content: &[u8]) -> Result<Vec<Indicator>> {
        use crate::error::TrustError;

        let source = decode_utf8(path, content)?;
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| TrustError::Parse {
                file: path.display().to_string(),
                message: format!("Failed to load Python grammar: {e}"),
            })?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| TrustError::Parse {
                file: path.display().to_string(),
                message: "tree-sitter failed to parse Python".into(),
            })?;

        let root = tree.root_node();
        if root.has_error() {
            let (line, column) = first_error(root)
                .map(|n| (n.start_position().row + 1, n.start_position().column))
                .unwrap_or((1, 0));
            return Err(TrustError::Parse {
                file: path.display().to_string(),
                message: format!("syntax error at line {line}, column {column}"),
            });
        }

        let bytes = source.as_bytes();
        let nodes = preorder(root);
        let mut table = ImportTable::default();
        let mut collector = Collector::new(path);

        // Phase 1: imports, so aliases are known before any use site
        for node in &nodes {
            match node.kind() {
                "import_statement" => visit_import(*node, bytes, &mut table, &mut collector),
                "import_from_statement" => {
                    visit_import_from(*node, bytes, &mut table, &mut collector)
                }
                _ => {}
            }
        }

        // Phase 2: attribute chains, bare names and by-name lookups
        for node in &nodes {
            let (line, column) = position(*node);
            match node.kind() {
                "attribute" if is_outermost_attribute(*node) => {
                    if let Some(dotted) = dotted_name(*node, bytes) {
                        collector.reference(&table, &dotted, line, column);
                    }
                }
                "identifier" if is_reference(*node) => {
                    collector.bare(&table, node_text(*node, bytes), line, column);
                }
                "call" => visit_lookup_call(*node, bytes, &table, &mut collector),
                _ => {}
            }
        }

        Ok(collector.indicators)
    }
}

#[cfg(feature = "python")]
fn visit_import(
    node: tree_sitter::Node,
    source: &[u8],
    table: &mut ImportTable,
    collector: &mut Collector,
) {
    let (line, column) = position(node);
    let mut cursor = node.walk();
    for child in node.children_by_field_name("name", &mut cursor) {
        let (module, alias) = split_alias(child, source);
        if module.is_empty() {
            continue;
        }
        table.bind_import(module, alias);
        collector.import(module, line, column);
    }
}

#[cfg(feature = "python")]
fn visit_import_from(
    node: tree_sitter::Node,
    source: &[u8],
    table: &mut ImportTable,
    collector: &mut Collector,
) {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };
    // `from . import x` refers to the package's own code
    if module_node.kind() == "relative_import" {
        return;
    }
    let module = node_text(module_node, source);
    let (line, column) = position(node);
    let module_flagged = collector.import(module, line, column);

    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            if child.kind() == "wildcard_import" {
                table.bind_wildcard(module);
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children_by_field_name("name", &mut cursor) {
        let (name, alias) = split_alias(child, source);
        if name.is_empty() {
            continue;
        }
        table.bind_from(module, name, alias);
        collector.import_name(module, name, module_flagged, line, column);
    }
}

/// `getattr(module, name)` and `vars(module)`.
#[cfg(feature = "python")]
fn visit_lookup_call(
    node: tree_sitter::Node,
    source: &[u8],
    table: &ImportTable,
    collector: &mut Collector,
) {
    let Some(func) = node.child_by_field_name("function") else {
        return;
    };
    let name = node_text(func, source);
    if func.kind() != "identifier" || table.is_bound(name) || !patterns::is_lookup_builtin(name) {
        return;
    }
    let Some(args) = node.child_by_field_name("arguments") else {
        return;
    };
    let Some(target) = args.named_child(0).and_then(|n| dotted_name(n, source)) else {
        return;
    };
    let attr = args
        .named_child(1)
        .and_then(|n| string_literal(n, source));
    let (line, column) = position(node);
    collector.lookup(table, &target, attr, line, column);
}

/// The value of a plain string literal that is a valid identifier. Prefixed,
/// formatted or concatenated strings give `None`.
#[cfg(feature = "python")]
fn string_literal<'a>(node: tree_sitter::Node, source: &'a [u8]) -> Option<&'a str> {
    if node.kind() != "string" {
        return None;
    }
    let body = node_text(node, source)
        .trim_start_matches(['r', 'R', 'u', 'U'])
        .trim_matches(['\'', '"']);
    let is_identifier =
        !body.is_empty() && body.chars().all(|c| c.is_alphanumeric() || c == '_');
    is_identifier.then_some(body)
}

/// An identifier in expression position: not a declared name, a keyword
/// argument name, the member half of an attribute or part of an import.
#[cfg(feature = "python")]
fn is_reference(node: tree_sitter::Node) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    let is_field = |field: &str| {
        parent
            .child_by_field_name(field)
            .is_some_and(|n| n.id() == node.id())
    };
    match parent.kind() {
        "attribute" if is_field("attribute") => return false,
        "keyword_argument" if is_field("name") => return false,
        "function_definition" | "class_definition" if is_field("name") => return false,
        "default_parameter" | "typed_default_parameter" if is_field("name") => return false,
        "parameters" | "lambda_parameters" | "typed_parameter" => return false,
        _ => {}
    }
    let mut current = Some(parent);
    while let Some(n) = current {
        match n.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                return false
            }
            "module" | "block" => return true,
            _ => current = n.parent(),
        }
    }
    true
}

/// `dotted_name` or `aliased_import` → (name, alias).
#[cfg(feature = "python")]
fn split_alias<'a>(node: tree_sitter::Node, source: &'a [u8]) -> (&'a str, Option<&'a str>) {
    if node.kind() == "aliased_import" {
        let name = node
            .child_by_field_name("name")
            .map(|n| node_text(n, source))
            .unwrap_or("");
        let alias = node
            .child_by_field_name("alias")
            .map(|n| node_text(n, source));
        (name, alias)
    } else {
        (node_text(node, source), None)
    }
}

/// An attribute node that is not the `object` of an enclosing attribute.
#[cfg(feature = "python")]
fn is_outermost_attribute(node: tree_sitter::Node) -> bool {
    match node.parent() {
        Some(parent) if parent.kind() == "attribute" => parent
            .child_by_field_name("object")
            .map_or(true, |obj| obj.id() != node.id()),
        _ => true,
    }
}

/// `a.b.c` for attribute chains rooted at an identifier.
#[cfg(feature = "python")]
fn dotted_name(node: tree_sitter::Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source).to_string()),
        "attribute" => {
            let object = node.child_by_field_name("object")?;
            let attribute = node.child_by_field_name("attribute")?;
            Some(format!(
                "{}.{}",
                dotted_name(object, source)?,
                node_text(attribute, source)
            ))
        }
        _ => None,
    }
}

/// All named nodes in document order, without recursion.
#[cfg(feature = "python")]
fn preorder(root: tree_sitter::Node) -> Vec<tree_sitter::Node> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        out.push(node);
        for i in (0..node.named_child_count()).rev() {
            if let Some(child) = node.named_child(i) {
                stack.push(child);
            }
        }
    }
    out
}

#[cfg(feature = "python")]
fn first_error(root: tree_sitter::Node) -> Option<tree_sitter::Node> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }
    None
}

#[cfg(feature = "python")]
fn node_text<'a>(node: tree_sitter::Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

#[cfg(feature = "python")]
fn position(node: tree_sitter::Node) -> (usize, usize) {
    let start = node.start_position();
    (start.row + 1, start.column)
}

// ── Regex fallback (when tree-sitter is not available) ──────────

#[cfg(not(feature = "python"))]
mod fallback {
    use once_cell::sync::Lazy;
    use regex::Regex;

    pub static IMPORT_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\s*import\s+(.+)$").unwrap());

    pub static FROM_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\s*from\s+([\w.]+)\s+import\s+(.+)$").unwrap());

    // Dotted chain not preceded by a word character or a dot
    pub static DOTTED_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?:^|[^\w.])([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)+)").unwrap()
    });

    // Identifier not preceded by a word character or a dot
    pub static IDENT_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?:^|[^\w.])([A-Za-z_]\w*)").unwrap());

    // getattr(target, "name") / vars(target)
    pub static LOOKUP_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r#"(?:^|[^\w.])(getattr|vars)\s*\(\s*([A-Za-z_][\w.]*)\s*(?:,\s*[rRuU]?['"](\w+)['"]\s*[,)])?"#,
        )
        .unwrap()
    });
}

#[cfg(not(feature = "python"))]
impl UnitAnalyzer for PythonAnalyzer {
    fn kind(&self) -> UnitKind {
        UnitKind::Python
    }

    fn analyze(&self, path: &Path, content: &[u8]) -> Result<Vec<Indicator>> {
        use fallback::*;

        let source = decode_utf8(path, content)?;
        let lines: Vec<&str> = source.lines().map(strip_comment).collect();
        let mut table = ImportTable::default();
        let mut collector = Collector::new(path);

        // Phase 1: imports, joining parenthesized `from m import (...)` blocks
        let mut idx = 0;
        while idx < lines.len() {
            let line_num = idx + 1;
            let line = lines[idx];

            if let Some(cap) = FROM_RE.captures(line) {
                let module = cap[1].to_string();
                let mut names = cap[2].to_string();
                if names.trim_start().starts_with('(') {
                    while !names.contains(')') && idx + 1 < lines.len() {
                        idx += 1;
                        names.push(' ');
                        names.push_str(lines[idx]);
                    }
                }
                if !module.starts_with('.') {
                    let flagged = collector.import(&module, line_num, 0);
                    let names = names.replace(['(', ')', '\\'], " ");
                    for entry in names.split(',') {
                        let (name, alias) = split_alias_text(entry);
                        if name == "*" {
                            table.bind_wildcard(&module);
                        } else if !name.is_empty() {
                            table.bind_from(&module, name, alias);
                            collector.import_name(&module, name, flagged, line_num, 0);
                        }
                    }
                }
            } else if let Some(cap) = IMPORT_RE.captures(line) {
                for entry in cap[1].split(',') {
                    let (module, alias) = split_alias_text(entry);
                    if !module.is_empty() {
                        table.bind_import(module, alias);
                        collector.import(module, line_num, 0);
                    }
                }
            }
            idx += 1;
        }

        // Phase 2: references
        for (line_idx, line) in lines.iter().enumerate() {
            let line_num = line_idx + 1;
            if IMPORT_RE.is_match(line) || FROM_RE.is_match(line) {
                continue;
            }
            for cap in DOTTED_RE.captures_iter(line) {
                let m = cap.get(1).map(|m| (m.as_str(), m.start()));
                if let Some((dotted, column)) = m {
                    collector.reference(&table, dotted, line_num, column);
                }
            }
            for cap in IDENT_RE.captures_iter(line) {
                if let Some(m) = cap.get(1) {
                    if is_declaration(line, m.start(), m.end()) {
                        continue;
                    }
                    collector.bare(&table, m.as_str(), line_num, m.start());
                }
            }
            for cap in LOOKUP_RE.captures_iter(line) {
                if table.is_bound(&cap[1]) {
                    continue;
                }
                let attr = cap.get(3).map(|m| m.as_str());
                let column = cap.get(1).map_or(0, |m| m.start());
                collector.lookup(&table, &cap[2], attr, line_num, column);
            }
        }

        Ok(collector.indicators)
    }
}

/// A name being defined rather than used: `def open(`, `class eval`, or a
/// keyword argument / assignment target `open=`.
#[cfg(not(feature = "python"))]
fn is_declaration(line: &str, start: usize, end: usize) -> bool {
    let previous = line[..start]
        .trim_end()
        .rsplit(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    if previous == "def" || previous == "class" {
        return true;
    }
    let after = line[end..].trim_start();
    after.starts_with('=') && !after.starts_with("==")
}

/// `name as alias` → (name, alias).
#[cfg(not(feature = "python"))]
fn split_alias_text(entry: &str) -> (&str, Option<&str>) {
    let mut parts = entry.split_whitespace();
    let name = parts.next().unwrap_or("");
    match (parts.next(), parts.next()) {
        (Some("as"), Some(alias)) => (name, Some(alias)),
        _ => (name, None),
    }
}

/// Drop a trailing `#` comment, ignoring `#` inside string literals.
#[cfg(not(feature = "python"))]
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '#' => return &line[..i],
                '"' | '\'' => quote = Some(ch),
                _ => {}
            },
        }
    }
    line
}
