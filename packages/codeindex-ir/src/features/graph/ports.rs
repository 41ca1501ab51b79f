//! Graph store port
//!
//! Any conforming persistence backend is acceptable; mutations on a
//! `(repo, snapshot)` happen only from the holder of its job lock, and every
//! mutation is an idempotent upsert or delete so cancellation never corrupts
//! the store.

use async_trait::async_trait;

use super::document::GraphDocument;
use crate::shared::models::Result;

/// Save semantics for graph documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Replace the whole stored graph for the (repo, snapshot)
    Replace,
    /// Merge into the stored graph; ID collisions replace node/edge
    /// attributes
    Upsert,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn save_graph(&self, doc: &GraphDocument, mode: SaveMode) -> Result<()>;

    async fn load_graph(&self, repo_id: &str, snapshot_id: &str)
        -> Result<Option<GraphDocument>>;

    /// Remove nodes of deleted files; their outbound edges disappear with
    /// them. Returns the removed node count.
    async fn delete_nodes_for_deleted_files(
        &self,
        repo_id: &str,
        paths: &[String],
    ) -> Result<usize>;

    /// Remove outbound edges of modified files, keeping nodes so inbound
    /// edges retain endpoints. Returns the removed edge count.
    async fn delete_outbound_edges_by_file_paths(
        &self,
        repo_id: &str,
        paths: &[String],
    ) -> Result<usize>;

    /// Remove module-level nodes with nothing left under them
    async fn delete_orphan_module_nodes(&self, repo_id: &str) -> Result<usize>;
}
