//! Source file and parsed-tree containers

use std::collections::HashMap;
use std::sync::Arc;
use tree_sitter::Tree;

use super::ports::LanguageId;

/// Source file contents plus identity
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub file_path: String,
    pub language: LanguageId,
    pub text: Arc<str>,
}

impl SourceFile {
    pub fn new(file_path: impl Into<String>, language: LanguageId, text: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            language,
            text: Arc::from(text.into().as_str()),
        }
    }
}

/// A parsed file: source plus its tree-sitter tree
///
/// The tree is reference-counted so the AST cache and the semantic builders
/// can share one parse per file.
#[derive(Clone)]
pub struct ParsedFile {
    pub source: SourceFile,
    pub tree: Arc<Tree>,
}

impl ParsedFile {
    pub fn new(source: SourceFile, tree: Tree) -> Self {
        Self {
            source,
            tree: Arc::new(tree),
        }
    }

    pub fn file_path(&self) -> &str {
        &self.source.file_path
    }

    pub fn text(&self) -> &str {
        &self.source.text
    }
}

impl std::fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedFile")
            .field("file_path", &self.source.file_path)
            .field("language", &self.source.language)
            .finish()
    }
}

/// Pre-parsed ASTs keyed by file path, passed between stages to avoid
/// duplicate parsing
pub type SourceMap = HashMap<String, ParsedFile>;
