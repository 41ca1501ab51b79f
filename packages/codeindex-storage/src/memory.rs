//! In-memory store implementations
//!
//! MemoryGraphStore implements the upsert-as-replace collision rule the
//! graph port documents. The Recording* index fakes count ingestions and
//! remember deleted IDs so tests can assert fan-out behavior.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use codeindex_ir::features::chunking::{Chunk, ChunkStore};
use codeindex_ir::features::graph::{GraphDocument, GraphStore, SaveMode};
use codeindex_ir::features::multi_index::{
    DomainIndex, EmbeddingQueue, FuzzyIndex, IndexDoc, LexicalIndex, SearchHit, SymbolIndex,
    VectorDoc, VectorIndex,
};
use codeindex_ir::shared::models::Result;

// ============================================================
// Graph store
// ============================================================

#[derive(Default)]
pub struct MemoryGraphStore {
    graphs: Mutex<HashMap<(String, String), GraphDocument>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn save_graph(&self, doc: &GraphDocument, mode: SaveMode) -> Result<()> {
        let key = (doc.repo_id.clone(), doc.snapshot_id.clone());
        let mut graphs = self.graphs.lock();

        match mode {
            SaveMode::Replace => {
                let mut stored = doc.clone();
                stored.rebuild_edge_index();
                graphs.insert(key, stored);
            }
            SaveMode::Upsert => {
                let entry = graphs
                    .entry(key)
                    .or_insert_with(|| GraphDocument::new(&doc.repo_id, &doc.snapshot_id));
                entry.upsert(doc);
            }
        }
        Ok(())
    }

    async fn load_graph(
        &self,
        repo_id: &str,
        snapshot_id: &str,
    ) -> Result<Option<GraphDocument>> {
        let graphs = self.graphs.lock();
        Ok(graphs
            .get(&(repo_id.to_string(), snapshot_id.to_string()))
            .map(|doc| {
                let mut copy = doc.clone();
                copy.rebuild_edge_index();
                copy
            }))
    }

    async fn delete_nodes_for_deleted_files(
        &self,
        repo_id: &str,
        paths: &[String],
    ) -> Result<usize> {
        let path_set: HashSet<String> = paths.iter().cloned().collect();
        let mut removed = 0;
        let mut graphs = self.graphs.lock();
        for ((r, _), doc) in graphs.iter_mut() {
            if r == repo_id {
                removed += doc.remove_nodes_for_files(&path_set);
            }
        }
        Ok(removed)
    }

    async fn delete_outbound_edges_by_file_paths(
        &self,
        repo_id: &str,
        paths: &[String],
    ) -> Result<usize> {
        let path_set: HashSet<String> = paths.iter().cloned().collect();
        let mut removed = 0;
        let mut graphs = self.graphs.lock();
        for ((r, _), doc) in graphs.iter_mut() {
            if r == repo_id {
                removed += doc.remove_outbound_edges_for_files(&path_set);
            }
        }
        Ok(removed)
    }

    async fn delete_orphan_module_nodes(&self, repo_id: &str) -> Result<usize> {
        let mut removed = 0;
        let mut graphs = self.graphs.lock();
        for ((r, _), doc) in graphs.iter_mut() {
            if r == repo_id {
                removed += doc.remove_orphan_file_nodes();
            }
        }
        Ok(removed)
    }
}

// ============================================================
// Chunk store
// ============================================================

#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: Mutex<HashMap<String, Chunk>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn save_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let mut stored = self.chunks.lock();
        for chunk in chunks {
            stored.insert(chunk.chunk_id.clone(), chunk.clone());
        }
        Ok(chunks.len())
    }

    async fn get_chunks_batch(&self, ids: &[String]) -> Result<HashMap<String, Chunk>> {
        let stored = self.chunks.lock();
        Ok(ids
            .iter()
            .filter_map(|id| stored.get(id).map(|c| (id.clone(), c.clone())))
            .collect())
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<bool> {
        Ok(self.chunks.lock().remove(chunk_id).is_some())
    }

    async fn list_chunks(&self, repo_id: &str, snapshot_id: &str) -> Result<Vec<Chunk>> {
        let stored = self.chunks.lock();
        let mut chunks: Vec<Chunk> = stored
            .values()
            .filter(|c| c.repo_id == repo_id && c.snapshot_id == snapshot_id)
            .cloned()
            .collect();
        chunks.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(chunks)
    }
}

// ============================================================
// Recording index fakes
// ============================================================

#[derive(Default)]
pub struct RecordingLexicalIndex {
    pub indexed_paths: Arc<Mutex<Vec<String>>>,
    pub deleted_ids: Arc<Mutex<Vec<String>>>,
    pub full_reindexes: Arc<Mutex<usize>>,
}

impl RecordingLexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LexicalIndex for RecordingLexicalIndex {
    async fn reindex_repo(&self, _repo_id: &str, _snapshot_id: &str) -> Result<usize> {
        *self.full_reindexes.lock() += 1;
        Ok(1)
    }

    async fn reindex_paths(
        &self,
        _repo_id: &str,
        _snapshot_id: &str,
        paths: &[String],
    ) -> Result<usize> {
        self.indexed_paths.lock().extend(paths.iter().cloned());
        Ok(paths.len())
    }

    async fn delete(&self, _repo_id: &str, _snapshot_id: &str, ids: &[String]) -> Result<usize> {
        self.deleted_ids.lock().extend(ids.iter().cloned());
        Ok(ids.len())
    }
}

#[derive(Default)]
pub struct RecordingVectorIndex {
    pub docs: Arc<Mutex<Vec<VectorDoc>>>,
    pub deleted_ids: Arc<Mutex<Vec<String>>>,
}

impl RecordingVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for RecordingVectorIndex {
    async fn index(&self, _repo_id: &str, _snapshot_id: &str, docs: &[VectorDoc]) -> Result<usize> {
        self.docs.lock().extend(docs.iter().cloned());
        Ok(docs.len())
    }

    async fn search(
        &self,
        _collection: &str,
        _query: &str,
        _limit: usize,
        _score_threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _repo_id: &str, _snapshot_id: &str, ids: &[String]) -> Result<usize> {
        self.deleted_ids.lock().extend(ids.iter().cloned());
        Ok(ids.len())
    }
}

#[derive(Default)]
pub struct RecordingSymbolIndex {
    pub graphs_indexed: Arc<Mutex<usize>>,
}

impl RecordingSymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SymbolIndex for RecordingSymbolIndex {
    async fn index_graph(
        &self,
        _repo_id: &str,
        _snapshot_id: &str,
        graph: &GraphDocument,
    ) -> Result<usize> {
        *self.graphs_indexed.lock() += 1;
        Ok(graph.graph_nodes.len())
    }

    async fn search(
        &self,
        _repo_id: &str,
        _snapshot_id: &str,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct RecordingFuzzyIndex {
    pub docs: Arc<Mutex<Vec<IndexDoc>>>,
}

impl RecordingFuzzyIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FuzzyIndex for RecordingFuzzyIndex {
    async fn index(&self, _repo_id: &str, _snapshot_id: &str, docs: &[IndexDoc]) -> Result<usize> {
        self.docs.lock().extend(docs.iter().cloned());
        Ok(docs.len())
    }
}

#[derive(Default)]
pub struct RecordingDomainIndex {
    pub docs: Arc<Mutex<Vec<IndexDoc>>>,
}

impl RecordingDomainIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DomainIndex for RecordingDomainIndex {
    async fn index(&self, _repo_id: &str, _snapshot_id: &str, docs: &[IndexDoc]) -> Result<usize> {
        self.docs.lock().extend(docs.iter().cloned());
        Ok(docs.len())
    }
}

#[derive(Default)]
pub struct RecordingEmbeddingQueue {
    pub enqueued: Arc<Mutex<Vec<Chunk>>>,
}

impl RecordingEmbeddingQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingQueue for RecordingEmbeddingQueue {
    async fn enqueue(&self, chunks: &[Chunk], _repo_id: &str, _snapshot_id: &str) -> Result<usize> {
        self.enqueued.lock().extend(chunks.iter().cloned());
        Ok(chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeindex_ir::features::chunking::ChunkKind;
    use codeindex_ir::shared::models::{NodeBuilder, NodeKind, Span};

    fn node(id: &str, file: &str) -> codeindex_ir::Node {
        NodeBuilder::new(id, NodeKind::Function, "f", "f", file, Span::new(1, 0, 2, 0), "python")
            .build()
    }

    #[tokio::test]
    async fn test_graph_store_replace_and_load() {
        let store = MemoryGraphStore::new();
        let mut doc = GraphDocument::new("r", "s");
        doc.insert_node(node("f1", "a.py"));

        store.save_graph(&doc, SaveMode::Replace).await.unwrap();
        let loaded = store.load_graph("r", "s").await.unwrap().unwrap();
        assert_eq!(loaded.graph_nodes.len(), 1);
        assert!(store.load_graph("r", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_graph_store_upsert_merges() {
        let store = MemoryGraphStore::new();
        let mut doc1 = GraphDocument::new("r", "s");
        doc1.insert_node(node("f1", "a.py"));
        store.save_graph(&doc1, SaveMode::Replace).await.unwrap();

        let mut doc2 = GraphDocument::new("r", "s");
        doc2.insert_node(node("g1", "b.py"));
        store.save_graph(&doc2, SaveMode::Upsert).await.unwrap();

        let loaded = store.load_graph("r", "s").await.unwrap().unwrap();
        assert_eq!(loaded.graph_nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_graph_store_deletions() {
        let store = MemoryGraphStore::new();
        let mut doc = GraphDocument::new("r", "s");
        doc.insert_node(node("f1", "a.py"));
        doc.insert_node(node("g1", "b.py"));
        store.save_graph(&doc, SaveMode::Replace).await.unwrap();

        let removed = store
            .delete_nodes_for_deleted_files("r", &["b.py".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let loaded = store.load_graph("r", "s").await.unwrap().unwrap();
        assert!(loaded.get_node("g1").is_none());
        assert!(loaded.get_node("f1").is_some());
    }

    #[tokio::test]
    async fn test_chunk_store_roundtrip() {
        let store = MemoryChunkStore::new();
        let chunk = Chunk::new(
            "c1",
            "r",
            "s",
            "a.py",
            ChunkKind::Function,
            "f",
            Span::new(1, 0, 2, 0),
            "h",
        );

        store.save_chunks(&[chunk.clone()]).await.unwrap();
        let batch = store
            .get_chunks_batch(&["c1".to_string()])
            .await
            .unwrap();
        assert_eq!(batch["c1"].content_hash, "h");

        assert!(store.delete_chunk("c1").await.unwrap());
        assert!(!store.delete_chunk("c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_chunk_store_list_filters_by_key() {
        let store = MemoryChunkStore::new();
        let mut a = Chunk::new("c1", "r", "s", "a.py", ChunkKind::File, "a", Span::zero(), "h1");
        let b = Chunk::new("c2", "r", "other", "b.py", ChunkKind::File, "b", Span::zero(), "h2");
        a.language = Some("python".into());
        store.save_chunks(&[a, b]).await.unwrap();

        let listed = store.list_chunks("r", "s").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].chunk_id, "c1");
    }
}
