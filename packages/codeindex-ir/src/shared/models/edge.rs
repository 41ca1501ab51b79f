//! Symbol graph edge model
//!
//! Edges are typed, directed relations. Attributes are typed per edge kind.
//! Every edge carries `source_file` and `target_file` so file-scoped
//! operations (stale marking, outbound-edge deletion) never need a node
//! lookup.

use serde::{Deserialize, Serialize};

/// Edge kind in the symbol graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Calls,
    Imports,
    Inherits,
    Implements,
    ReferencesSymbol,
    ReferencesType,
    Reads,
    Writes,
    Contains,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Calls => "CALLS",
            EdgeKind::Imports => "IMPORTS",
            EdgeKind::Inherits => "INHERITS",
            EdgeKind::Implements => "IMPLEMENTS",
            EdgeKind::ReferencesSymbol => "REFERENCES_SYMBOL",
            EdgeKind::ReferencesType => "REFERENCES_TYPE",
            EdgeKind::Reads => "READS",
            EdgeKind::Writes => "WRITES",
            EdgeKind::Contains => "CONTAINS",
        }
    }

    /// Kinds eligible for cross-file stale marking
    pub fn is_cross_file_reference(&self) -> bool {
        matches!(
            self,
            EdgeKind::Calls
                | EdgeKind::ReferencesSymbol
                | EdgeKind::ReferencesType
                | EdgeKind::Imports
                | EdgeKind::Inherits
                | EdgeKind::Implements
        )
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed per-kind edge attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeAttrs {
    None,
    /// Call site metadata
    Call { line: u32, arg_count: u32 },
    /// Import path as written in source
    Import { path: String },
    /// Position in the base-class list
    Inherit { index: u32 },
}

impl Default for EdgeAttrs {
    fn default() -> Self {
        EdgeAttrs::None
    }
}

/// Typed directed relation in the symbol graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub kind: EdgeKind,
    pub source_id: String,
    pub target_id: String,
    pub source_file: String,
    pub target_file: String,
    #[serde(default)]
    pub attrs: EdgeAttrs,
}

impl Edge {
    pub fn new(
        kind: EdgeKind,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        source_file: impl Into<String>,
        target_file: impl Into<String>,
        attrs: EdgeAttrs,
    ) -> Self {
        let source_id = source_id.into();
        let target_id = target_id.into();
        let id = Self::compose_id(kind, &source_id, &target_id, &attrs);
        Self {
            id,
            kind,
            source_id,
            target_id,
            source_file: source_file.into(),
            target_file: target_file.into(),
            attrs,
        }
    }

    /// Deterministic edge ID. Call edges include the site line so repeated
    /// calls to the same target stay distinct.
    fn compose_id(kind: EdgeKind, source_id: &str, target_id: &str, attrs: &EdgeAttrs) -> String {
        match attrs {
            EdgeAttrs::Call { line, .. } => {
                format!("edge:{}:{}->{}@{}", kind.as_str(), source_id, target_id, line)
            }
            _ => format!("edge:{}:{}->{}", kind.as_str(), source_id, target_id),
        }
    }

    /// Identity used by determinism tests: edges compare equal when kind,
    /// endpoints and attributes match, regardless of the edge ID.
    pub fn identity(&self) -> (EdgeKind, &str, &str, &EdgeAttrs) {
        (self.kind, &self.source_id, &self.target_id, &self.attrs)
    }

    pub fn is_cross_file(&self) -> bool {
        self.source_file != self.target_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_id_deterministic() {
        let a = Edge::new(
            EdgeKind::Calls,
            "func:r:a.py:f:1",
            "func:r:b.py:g:1",
            "a.py",
            "b.py",
            EdgeAttrs::Call { line: 3, arg_count: 1 },
        );
        let b = Edge::new(
            EdgeKind::Calls,
            "func:r:a.py:f:1",
            "func:r:b.py:g:1",
            "a.py",
            "b.py",
            EdgeAttrs::Call { line: 3, arg_count: 1 },
        );
        assert_eq!(a.id, b.id);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_call_sites_distinct() {
        let a = Edge::new(
            EdgeKind::Calls,
            "f",
            "g",
            "a.py",
            "b.py",
            EdgeAttrs::Call { line: 3, arg_count: 0 },
        );
        let b = Edge::new(
            EdgeKind::Calls,
            "f",
            "g",
            "a.py",
            "b.py",
            EdgeAttrs::Call { line: 9, arg_count: 0 },
        );
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_cross_file_reference_kinds() {
        assert!(EdgeKind::Calls.is_cross_file_reference());
        assert!(EdgeKind::Implements.is_cross_file_reference());
        assert!(!EdgeKind::Contains.is_cross_file_reference());
        assert!(!EdgeKind::Reads.is_cross_file_reference());
    }
}
