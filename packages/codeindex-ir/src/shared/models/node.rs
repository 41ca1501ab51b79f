//! Symbol graph node model
//!
//! Node IDs are stable across re-indexing of the same source: the ID encodes
//! its locator components instead of relying on a central allocator.
//!
//! ID format: `{kind}:{repo_id}:{file_path}:[{parent_name}:]{name}[:{line}]`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::Span;

/// Node kind in the symbol graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Module,
    Function,
    Method,
    Class,
    Interface,
    Variable,
    Lambda,
}

impl NodeKind {
    /// ID prefix for this kind
    pub fn id_prefix(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Module => "module",
            NodeKind::Function => "func",
            NodeKind::Method => "method",
            NodeKind::Class => "class",
            NodeKind::Interface => "interface",
            NodeKind::Variable => "var",
            NodeKind::Lambda => "lambda",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, NodeKind::Function | NodeKind::Method | NodeKind::Lambda)
    }

    pub fn is_type(&self) -> bool {
        matches!(self, NodeKind::Class | NodeKind::Interface)
    }
}

/// The unit of the symbol graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identifier (see module docs for format)
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    /// Dotted path from module root
    pub fqn: String,
    pub file_path: String,
    pub span: Span,
    /// Body span (excludes decorators/signature line where applicable)
    pub body_span: Option<Span>,
    pub parent_id: Option<String>,
    pub language: String,
    /// Signature entity ID for callables
    pub signature_id: Option<String>,
    /// Declared type ID from annotations
    pub declared_type_id: Option<String>,
    /// Small open attribute map (visibility, var_kind, is_async, ...)
    #[serde(default)]
    pub attrs: HashMap<String, Value>,
}

impl Node {
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(|v| v.as_str())
    }

    pub fn is_callable(&self) -> bool {
        self.kind.is_callable()
    }
}

/// Builder for Node (required fields up-front, optional via setters)
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new(
        id: impl Into<String>,
        kind: NodeKind,
        name: impl Into<String>,
        fqn: impl Into<String>,
        file_path: impl Into<String>,
        span: Span,
        language: impl Into<String>,
    ) -> Self {
        Self {
            node: Node {
                id: id.into(),
                kind,
                name: name.into(),
                fqn: fqn.into(),
                file_path: file_path.into(),
                span,
                body_span: None,
                parent_id: None,
                language: language.into(),
                signature_id: None,
                declared_type_id: None,
                attrs: HashMap::new(),
            },
        }
    }

    pub fn body_span(mut self, span: Span) -> Self {
        self.node.body_span = Some(span);
        self
    }

    pub fn parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.node.parent_id = Some(parent_id.into());
        self
    }

    pub fn signature_id(mut self, signature_id: impl Into<String>) -> Self {
        self.node.signature_id = Some(signature_id.into());
        self
    }

    pub fn declared_type_id(mut self, type_id: impl Into<String>) -> Self {
        self.node.declared_type_id = Some(type_id.into());
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.node.attrs.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builder() {
        let node = NodeBuilder::new(
            "func:repo:a.py:f:1",
            NodeKind::Function,
            "f",
            "a.f",
            "a.py",
            Span::new(1, 0, 2, 0),
            "python",
        )
        .parent_id("file:repo:a.py")
        .attr("is_async", false)
        .build();

        assert_eq!(node.kind, NodeKind::Function);
        assert_eq!(node.fqn, "a.f");
        assert_eq!(node.parent_id.as_deref(), Some("file:repo:a.py"));
        assert_eq!(node.attrs["is_async"], serde_json::json!(false));
    }

    #[test]
    fn test_kind_predicates() {
        assert!(NodeKind::Method.is_callable());
        assert!(NodeKind::Lambda.is_callable());
        assert!(!NodeKind::Class.is_callable());
        assert!(NodeKind::Interface.is_type());
    }
}
