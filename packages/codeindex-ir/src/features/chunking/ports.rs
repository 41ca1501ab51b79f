//! Chunk store port

use async_trait::async_trait;
use std::collections::HashMap;

use super::chunk::Chunk;
use crate::shared::models::Result;

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Upsert a batch of chunks
    async fn save_chunks(&self, chunks: &[Chunk]) -> Result<usize>;

    async fn get_chunks_batch(&self, ids: &[String]) -> Result<HashMap<String, Chunk>>;

    async fn delete_chunk(&self, chunk_id: &str) -> Result<bool>;

    /// All chunks of a (repo, snapshot); the incremental refresher diffs
    /// against this
    async fn list_chunks(&self, repo_id: &str, snapshot_id: &str) -> Result<Vec<Chunk>>;
}
