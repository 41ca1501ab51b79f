//! Language plugin port
//!
//! Each supported language implements `LanguagePlugin`. Adding a language is
//! adding a registry entry, not editing existing code.

use std::collections::HashMap;
use tree_sitter::{Language as TSLanguage, Node as TSNode};

use crate::shared::models::Span;

/// Language identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageId {
    Python,
    TypeScript,
}

impl LanguageId {
    pub fn name(&self) -> &'static str {
        match self {
            LanguageId::Python => "python",
            LanguageId::TypeScript => "typescript",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" | "pyi" => Some(LanguageId::Python),
            "ts" | "tsx" => Some(LanguageId::TypeScript),
            _ => None,
        }
    }

    pub fn from_file_path(path: &str) -> Option<Self> {
        path.rsplit('.').next().and_then(Self::from_extension)
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            LanguageId::Python => &["py", "pyi"],
            LanguageId::TypeScript => &["ts", "tsx"],
        }
    }
}

/// Control flow type classification used by the BFG builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlowType {
    If,
    Loop,
    Match,
    Try,
    Return,
    Break,
    Continue,
    Raise,
}

/// Catch and finally blocks of a try construct
#[derive(Debug, Default)]
pub struct ExceptionHandlers<'a> {
    pub catch_blocks: Vec<TSNode<'a>>,
    pub finally_block: Option<TSNode<'a>>,
}

/// Language plugin contract
///
/// Provides the tree-sitter grammar plus the AST classification hooks the
/// IR and flow-graph builders need. Defaults cover the common tree-sitter
/// field names; plugins override where their grammar differs.
pub trait LanguagePlugin: Send + Sync {
    fn tree_sitter_language(&self) -> TSLanguage;

    fn language_id(&self) -> LanguageId;

    fn extensions(&self) -> &[&str] {
        self.language_id().extensions()
    }

    fn supports(&self, ext: &str) -> bool {
        self.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Names not starting with underscore are public by default
    fn is_public(&self, name: &str) -> bool {
        !name.starts_with('_')
    }

    // ========================================
    // BFG support
    // ========================================

    /// Statement boundary detection for block splitting
    fn is_statement_node(&self, node: &TSNode) -> bool;

    /// Control flow boundary detection (if/loop/match/try/return/...)
    fn is_control_flow_node(&self, node: &TSNode) -> bool;

    fn get_control_flow_type(&self, node: &TSNode) -> Option<ControlFlowType>;

    fn get_control_flow_body<'a>(&self, node: &TSNode<'a>) -> Option<TSNode<'a>> {
        node.child_by_field_name("body")
            .or_else(|| node.child_by_field_name("consequence"))
    }

    fn get_control_flow_alternative<'a>(&self, node: &TSNode<'a>) -> Option<TSNode<'a>> {
        node.child_by_field_name("alternative")
            .or_else(|| node.child_by_field_name("else_clause"))
    }

    /// All alternative branches in lexical order (elif chains are repeated
    /// `alternative` children in several grammars)
    fn get_control_flow_alternatives<'a>(&self, node: &TSNode<'a>) -> Vec<TSNode<'a>> {
        let mut cursor = node.walk();
        let alts: Vec<TSNode<'a>> = node
            .children_by_field_name("alternative", &mut cursor)
            .collect();
        if alts.is_empty() {
            self.get_control_flow_alternative(node).into_iter().collect()
        } else {
            alts
        }
    }

    fn get_control_flow_condition<'a>(&self, node: &TSNode<'a>) -> Option<TSNode<'a>> {
        node.child_by_field_name("condition")
    }

    /// Iterator nodes for for-loops; empty for while loops
    fn get_loop_iterator<'a>(&self, node: &TSNode<'a>) -> Vec<TSNode<'a>> {
        let mut result = Vec::new();
        if let Some(left) = node.child_by_field_name("left") {
            result.push(left);
        }
        if let Some(right) = node.child_by_field_name("right") {
            result.push(right);
        }
        result
    }

    fn get_exception_handlers<'a>(&self, node: &TSNode<'a>) -> ExceptionHandlers<'a> {
        let mut handlers = ExceptionHandlers::default();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "except_clause" | "catch_clause" => handlers.catch_blocks.push(child),
                "finally_clause" => handlers.finally_block = Some(child),
                _ => {}
            }
        }
        handlers
    }

    /// Is the alternative a chained condition (elif / else if)?
    fn is_chained_condition(&self, node: &TSNode) -> bool {
        matches!(node.kind(), "elif_clause" | "else_if_clause")
            || (matches!(node.kind(), "if_statement")
                && node
                    .parent()
                    .map(|p| matches!(p.kind(), "else_clause" | "alternative"))
                    .unwrap_or(false))
    }
}

/// Registry for language plugins, keyed by language tag
pub struct ParserRegistry {
    plugins: HashMap<LanguageId, Box<dyn LanguagePlugin>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Registry with the built-in plugins registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(super::plugins::PythonPlugin::new()));
        registry.register(Box::new(super::plugins::TypeScriptPlugin::new()));
        registry
    }

    pub fn register(&mut self, plugin: Box<dyn LanguagePlugin>) {
        self.plugins.insert(plugin.language_id(), plugin);
    }

    pub fn get(&self, lang: LanguageId) -> Option<&dyn LanguagePlugin> {
        self.plugins.get(&lang).map(|p| p.as_ref())
    }

    pub fn get_by_extension(&self, ext: &str) -> Option<&dyn LanguagePlugin> {
        let lang = LanguageId::from_extension(ext)?;
        self.get(lang)
    }

    pub fn get_by_file_path(&self, path: &str) -> Option<&dyn LanguagePlugin> {
        let lang = LanguageId::from_file_path(path)?;
        self.get(lang)
    }

    pub fn supports(&self, ext: &str) -> bool {
        self.get_by_extension(ext).is_some()
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut exts: Vec<&'static str> = self
            .plugins
            .keys()
            .flat_map(|lang| lang.extensions().iter().copied())
            .collect();
        exts.sort_unstable();
        exts
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Span extraction from tree-sitter nodes (1-based lines)
pub trait SpanExt {
    fn to_span(&self) -> Span;
}

impl SpanExt for TSNode<'_> {
    fn to_span(&self) -> Span {
        Span::new(
            self.start_position().row as u32 + 1,
            self.start_position().column as u32,
            self.end_position().row as u32 + 1,
            self.end_position().column as u32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_id_from_extension() {
        assert_eq!(LanguageId::from_extension("py"), Some(LanguageId::Python));
        assert_eq!(LanguageId::from_extension("tsx"), Some(LanguageId::TypeScript));
        assert_eq!(LanguageId::from_extension("unknown"), None);
    }

    #[test]
    fn test_registry_defaults() {
        let registry = ParserRegistry::with_defaults();
        assert!(registry.supports("py"));
        assert!(registry.supports("ts"));
        assert!(!registry.supports("go"));
        assert!(registry.get_by_file_path("src/m.py").is_some());
    }
}
