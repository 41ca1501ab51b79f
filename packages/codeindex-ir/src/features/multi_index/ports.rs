//! Index and analyzer ports
//!
//! The indexing fan-out writes through these; any conforming backend is
//! acceptable. Each indexer is optional at the composition root and
//! failures are recorded as warnings, never fatal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::features::chunking::Chunk;
use crate::features::graph::GraphDocument;
use crate::shared::models::Result;

/// Document for the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDoc {
    pub id: String,
    pub content: String,
    pub payload: Value,
}

/// Flattened identifier/document view for fuzzy and domain indexes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDoc {
    pub id: String,
    pub text: String,
    pub payload: Value,
}

/// Search hit from the vector or symbol index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

/// Per-file delta layer of a lexical index. The base layer is never touched
/// in incremental mode.
#[async_trait]
pub trait LexicalDeltaIndex: Send + Sync {
    async fn index_file(&self, repo_id: &str, path: &str, content: &str) -> Result<()>;
}

#[async_trait]
pub trait LexicalIndex: Send + Sync {
    async fn reindex_repo(&self, repo_id: &str, snapshot_id: &str) -> Result<usize>;

    async fn reindex_paths(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        paths: &[String],
    ) -> Result<usize>;

    /// The delta layer, when this backend supports base+delta indexing
    fn delta(&self) -> Option<&dyn LexicalDeltaIndex> {
        None
    }

    async fn delete(&self, repo_id: &str, snapshot_id: &str, ids: &[String]) -> Result<usize>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn index(&self, repo_id: &str, snapshot_id: &str, docs: &[VectorDoc]) -> Result<usize>;

    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>>;

    async fn delete(&self, repo_id: &str, snapshot_id: &str, ids: &[String]) -> Result<usize>;
}

#[async_trait]
pub trait SymbolIndex: Send + Sync {
    async fn index_graph(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        graph: &GraphDocument,
    ) -> Result<usize>;

    async fn search(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait FuzzyIndex: Send + Sync {
    async fn index(&self, repo_id: &str, snapshot_id: &str, docs: &[IndexDoc]) -> Result<usize>;
}

#[async_trait]
pub trait DomainIndex: Send + Sync {
    async fn index(&self, repo_id: &str, snapshot_id: &str, docs: &[IndexDoc]) -> Result<usize>;
}

/// Background embedding queue. With a queue configured, only "high"
/// priority chunks are embedded inline; the queue absorbs the rest.
#[async_trait]
pub trait EmbeddingQueue: Send + Sync {
    async fn enqueue(&self, chunks: &[Chunk], repo_id: &str, snapshot_id: &str) -> Result<usize>;
}

/// Hover result from the external type analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoverInfo {
    pub type_name: String,
    pub signature: Option<String>,
}

/// Definition location from the external type analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolDefinition {
    pub file: String,
    pub line: u32,
    pub fqn: Option<String>,
}

/// External type-analyzer subprocess (LSP-backed). Calls are synchronous;
/// the expression builder batches one query per unique position. Failures
/// are transient per the error taxonomy: enrichment is skipped, never
/// fatal.
pub trait ExternalTypeAnalyzer: Send + Sync {
    fn hover(&self, file: &str, line: u32, col: u32) -> Result<Option<HoverInfo>>;

    fn definition(&self, file: &str, line: u32, col: u32) -> Result<Option<SymbolDefinition>>;
}
