//! Type IR
//!
//! A flat table of type entities referenced by declared annotations and
//! inferred expression types. Type IDs are name-stable:
//! `type:{repo_id}:{type_name}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::shared::models::IRDocument;

/// Type entity in the semantic IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeEntity {
    pub id: String,
    pub name: String,
    /// Node.id of the declaring class/interface when resolved in-repo
    pub declared_by_node_id: Option<String>,
    /// True for builtins and types outside the repository
    pub is_external: bool,
}

pub fn type_id(repo_id: &str, name: &str) -> String {
    format!("type:{}:{}", repo_id, name)
}

/// Builds the type entity table from the structural IR.
pub struct TypeIrBuilder;

impl TypeIrBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build_full(&self, ir_doc: &IRDocument) -> Vec<TypeEntity> {
        // BTreeMap keeps output ordering deterministic
        let mut types: BTreeMap<String, TypeEntity> = BTreeMap::new();

        // Classes and interfaces declare their own types
        for node in &ir_doc.nodes {
            if node.kind.is_type() {
                let id = type_id(&ir_doc.repo_id, &node.name);
                types.insert(
                    id.clone(),
                    TypeEntity {
                        id,
                        name: node.name.clone(),
                        declared_by_node_id: Some(node.id.clone()),
                        is_external: false,
                    },
                );
            }
        }

        // Referenced annotation types not declared in-repo are external
        let mut reference = |tid: &str| {
            if !types.contains_key(tid) {
                let name = tid.rsplit(':').next().unwrap_or(tid).to_string();
                types.insert(
                    tid.to_string(),
                    TypeEntity {
                        id: tid.to_string(),
                        name,
                        declared_by_node_id: None,
                        is_external: true,
                    },
                );
            }
        };

        for node in &ir_doc.nodes {
            if let Some(tid) = &node.declared_type_id {
                reference(tid);
            }
        }
        for sig in &ir_doc.signatures {
            for tid in &sig.parameter_type_ids {
                reference(tid);
            }
            if let Some(tid) = &sig.return_type_id {
                reference(tid);
            }
        }

        types.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{NodeBuilder, NodeKind, Span};

    #[test]
    fn test_declared_and_external_types() {
        let mut doc = IRDocument::new("r", "s");
        doc.nodes.push(
            NodeBuilder::new(
                "class:r:a.py:Svc:1",
                NodeKind::Class,
                "Svc",
                "Svc",
                "a.py",
                Span::new(1, 0, 5, 0),
                "python",
            )
            .build(),
        );
        doc.nodes.push(
            NodeBuilder::new(
                "var:r:a.py:x:2",
                NodeKind::Variable,
                "x",
                "Svc.x",
                "a.py",
                Span::new(2, 0, 2, 5),
                "python",
            )
            .declared_type_id(type_id("r", "int"))
            .build(),
        );

        let types = TypeIrBuilder::new().build_full(&doc);
        assert_eq!(types.len(), 2);

        let svc = types.iter().find(|t| t.name == "Svc").unwrap();
        assert!(!svc.is_external);
        assert_eq!(svc.declared_by_node_id.as_deref(), Some("class:r:a.py:Svc:1"));

        let int_ty = types.iter().find(|t| t.name == "int").unwrap();
        assert!(int_ty.is_external);
    }
}
