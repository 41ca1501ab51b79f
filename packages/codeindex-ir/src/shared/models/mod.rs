//! Shared models

mod edge;
mod error;
mod ir_document;
mod node;
mod span;

pub use edge::{Edge, EdgeAttrs, EdgeKind};
pub use error::{ErrorKind, IndexError, Result};
pub use ir_document::{IRDocument, SCHEMA_VERSION};
pub use node::{Node, NodeBuilder, NodeKind};
pub use span::Span;

/// Node identifier type alias
pub type NodeId = String;

// Re-export serde_json::Value for convenience (used by Node and Chunk attrs)
pub use serde_json::Value;
