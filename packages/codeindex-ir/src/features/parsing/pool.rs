//! Thread-local parser pool
//!
//! One tree-sitter parser per language per worker thread. Parsers are never
//! shared across threads; Rayon workers each lazily build their own set.

use std::cell::RefCell;
use std::collections::HashMap;
use tree_sitter::Parser;

use super::ports::LanguageId;
use super::source::{ParsedFile, SourceFile};
use crate::shared::models::{IndexError, Result};

thread_local! {
    static PARSERS: RefCell<HashMap<LanguageId, Parser>> = RefCell::new(HashMap::new());
}

fn grammar_for(language: LanguageId) -> tree_sitter::Language {
    match language {
        LanguageId::Python => tree_sitter_python::language(),
        LanguageId::TypeScript => tree_sitter_typescript::language_typescript(),
    }
}

/// Parse a source file with this thread's parser for its language.
///
/// Failures are reported as `ErrorKind::Parse`, never panicked, so callers
/// can record the file and continue.
pub fn parse_source(source: &SourceFile) -> Result<ParsedFile> {
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(source.language) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let mut parser = Parser::new();
                parser
                    .set_language(&grammar_for(source.language))
                    .map_err(|e| {
                        IndexError::parse(format!(
                            "failed to load {} grammar: {}",
                            source.language.name(),
                            e
                        ))
                    })?;
                e.insert(parser)
            }
        };

        let tree = parser.parse(source.text.as_ref(), None).ok_or_else(|| {
            IndexError::parse("parser returned no tree").with_file(&source.file_path)
        })?;

        Ok(ParsedFile::new(source.clone(), tree))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_python() {
        let source = SourceFile::new("a.py", LanguageId::Python, "def f(x):\n    return x + 1\n");
        let parsed = parse_source(&source).unwrap();
        assert_eq!(parsed.tree.root_node().kind(), "module");
    }

    #[test]
    fn test_parse_typescript() {
        let source = SourceFile::new(
            "a.ts",
            LanguageId::TypeScript,
            "function f(x: number): number { return x + 1; }\n",
        );
        let parsed = parse_source(&source).unwrap();
        assert!(!parsed.tree.root_node().has_error());
    }

    #[test]
    fn test_parser_reused_per_thread() {
        let source = SourceFile::new("a.py", LanguageId::Python, "x = 1\n");
        parse_source(&source).unwrap();
        parse_source(&source).unwrap();
        PARSERS.with(|cell| {
            assert_eq!(cell.borrow().len(), 1);
        });
    }
}
