//! Chunk data model
//!
//! Chunks are the unit of retrieval. IDs are deterministic over
//! `(repo, file, span, kind)`: whitespace edits inside a span that keep the
//! span bounds leave the chunk ID unchanged; `content_hash` captures the
//! content itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::shared::models::Span;

/// Chunk kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    File,
    Class,
    Function,
    Method,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::File => "file",
            ChunkKind::Class => "class",
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
        }
    }

    /// Embedding priority: functions, methods and classes embed inline;
    /// the rest can wait on the queue
    pub fn embed_priority(&self) -> EmbedPriority {
        match self {
            ChunkKind::Function | ChunkKind::Method | ChunkKind::Class => EmbedPriority::High,
            ChunkKind::File => EmbedPriority::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedPriority {
    High,
    Medium,
    Low,
}

/// Indexable content unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub repo_id: String,
    pub snapshot_id: String,
    pub file_path: String,
    pub kind: ChunkKind,
    /// Dotted name within the file
    pub fqn: String,
    pub span: Span,
    pub content_hash: String,
    pub parent_id: Option<String>,
    pub children: Vec<String>,
    pub language: Option<String>,
    /// Symbol graph node this chunk represents
    pub symbol_id: Option<String>,
    #[serde(default)]
    pub attrs: HashMap<String, String>,

    // Overlay metadata: editor-session chunks shadow base chunks without
    // writing to the base store
    pub is_overlay: bool,
    pub overlay_session_id: Option<String>,
    pub base_chunk_id: Option<String>,
}

impl Chunk {
    pub fn new(
        chunk_id: impl Into<String>,
        repo_id: impl Into<String>,
        snapshot_id: impl Into<String>,
        file_path: impl Into<String>,
        kind: ChunkKind,
        fqn: impl Into<String>,
        span: Span,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            repo_id: repo_id.into(),
            snapshot_id: snapshot_id.into(),
            file_path: file_path.into(),
            kind,
            fqn: fqn.into(),
            span,
            content_hash: content_hash.into(),
            parent_id: None,
            children: Vec::new(),
            language: None,
            symbol_id: None,
            attrs: HashMap::new(),
            is_overlay: false,
            overlay_session_id: None,
            base_chunk_id: None,
        }
    }

    pub fn add_child(&mut self, child_id: String) {
        if !self.children.contains(&child_id) {
            self.children.push(child_id);
        }
    }

    pub fn set_overlay(&mut self, session_id: impl Into<String>, base_chunk_id: Option<String>) {
        self.is_overlay = true;
        self.overlay_session_id = Some(session_id.into());
        self.base_chunk_id = base_chunk_id;
    }

    pub fn is_symbol(&self) -> bool {
        matches!(
            self.kind,
            ChunkKind::Class | ChunkKind::Function | ChunkKind::Method
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_creation() {
        let chunk = Chunk::new(
            "chunk:r:function:a.py:1-2",
            "r",
            "s",
            "a.py",
            ChunkKind::Function,
            "f",
            Span::new(1, 0, 2, 0),
            "hash",
        );
        assert!(chunk.is_symbol());
        assert!(!chunk.is_overlay);
    }

    #[test]
    fn test_add_child_dedupes() {
        let mut chunk = Chunk::new(
            "c1",
            "r",
            "s",
            "a.py",
            ChunkKind::File,
            "a",
            Span::zero(),
            "h",
        );
        chunk.add_child("x".into());
        chunk.add_child("x".into());
        assert_eq!(chunk.children.len(), 1);
    }

    #[test]
    fn test_overlay_metadata() {
        let mut chunk = Chunk::new(
            "c1",
            "r",
            "s",
            "a.py",
            ChunkKind::Function,
            "f",
            Span::zero(),
            "h",
        );
        chunk.set_overlay("session1", Some("base1".into()));
        assert!(chunk.is_overlay);
        assert_eq!(chunk.overlay_session_id.as_deref(), Some("session1"));
        assert_eq!(chunk.base_chunk_id.as_deref(), Some("base1"));
    }

    #[test]
    fn test_embed_priority() {
        assert_eq!(ChunkKind::Function.embed_priority(), EmbedPriority::High);
        assert_eq!(ChunkKind::File.embed_priority(), EmbedPriority::Medium);
    }
}
