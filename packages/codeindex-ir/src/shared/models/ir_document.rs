//! Structural IR document

use serde::{Deserialize, Serialize};

use super::{Edge, Node};
use crate::features::semantic_ir::signature::SignatureEntity;

/// IR schema version; bump on breaking ID-format changes
pub const SCHEMA_VERSION: u32 = 3;

/// Immutable-per-snapshot structural IR for a repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IRDocument {
    pub repo_id: String,
    pub snapshot_id: String,
    pub schema_version: u32,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub signatures: Vec<SignatureEntity>,
}

impl IRDocument {
    pub fn new(repo_id: impl Into<String>, snapshot_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            snapshot_id: snapshot_id.into(),
            schema_version: SCHEMA_VERSION,
            nodes: Vec::new(),
            edges: Vec::new(),
            signatures: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_by_id(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Merge another document's contents (per-file results into the
    /// repo-level document). Order is preserved: callers merge in sorted
    /// file order for determinism.
    pub fn merge(&mut self, other: IRDocument) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self.signatures.extend(other.signatures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{NodeBuilder, NodeKind, Span};

    #[test]
    fn test_merge_preserves_order() {
        let mut doc = IRDocument::new("r", "s");
        let mut other = IRDocument::new("r", "s");
        doc.nodes.push(
            NodeBuilder::new("a", NodeKind::File, "a", "a", "a.py", Span::zero(), "python").build(),
        );
        other.nodes.push(
            NodeBuilder::new("b", NodeKind::File, "b", "b", "b.py", Span::zero(), "python").build(),
        );
        doc.merge(other);
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.nodes[0].id, "a");
        assert_eq!(doc.nodes[1].id, "b");
    }
}
