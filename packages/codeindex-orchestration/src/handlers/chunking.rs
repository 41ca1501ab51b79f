//! Chunk generation stage
//!
//! Full mode streams the chunk set to the store in configurable batches.
//! Incremental mode defers to the refresher: only the delta is written and
//! dropped chunk IDs are removed.

use std::collections::HashSet;
use std::sync::Arc;

use codeindex_ir::features::chunking::{Chunk, ChunkBuilder, ChunkIncrementalRefresher, ChunkStore};

use super::HandlerContext;
use crate::change_detector::ChangeSet;
use crate::models::{IndexingResult, IndexingStage};
use crate::progress::IndexJobCheckpoint;

pub struct ChunkingHandler {
    chunk_builder: ChunkBuilder,
    refresher: ChunkIncrementalRefresher,
    chunk_store: Option<Arc<dyn ChunkStore>>,
}

impl ChunkingHandler {
    pub fn new(chunk_store: Option<Arc<dyn ChunkStore>>) -> Self {
        Self {
            chunk_builder: ChunkBuilder::new(),
            refresher: ChunkIncrementalRefresher::new(),
            chunk_store,
        }
    }

    /// Stage 7, full mode. Populates `ctx.chunk_ids`.
    pub async fn execute(&self, ctx: &mut HandlerContext, result: &mut IndexingResult) -> bool {
        ctx.report_progress(IndexingStage::ChunkGeneration, 0.0);

        let chunks = match self.build_chunks(ctx, result) {
            Some(chunks) => chunks,
            None => return false,
        };

        result.chunks_created = chunks.len();
        ctx.chunk_ids = chunks.iter().map(|c| c.chunk_id.clone()).collect();

        self.save_in_batches(ctx, result, &chunks).await;

        if let Some(progress) = &mut ctx.progress {
            progress.advance(IndexJobCheckpoint::ChunksStored);
        }
        ctx.persist_progress().await;
        ctx.report_progress(IndexingStage::ChunkGeneration, 100.0);

        tracing::info!(chunks = result.chunks_created, "chunk_generation_completed");
        true
    }

    /// Stage 7, incremental mode: compute and apply the chunk delta
    pub async fn execute_incremental(
        &self,
        ctx: &mut HandlerContext,
        result: &mut IndexingResult,
        change_set: &ChangeSet,
    ) -> bool {
        ctx.report_progress(IndexingStage::ChunkGeneration, 0.0);

        let new_chunks = match self.build_chunks(ctx, result) {
            Some(chunks) => chunks,
            None => return false,
        };

        let old_chunks = match &self.chunk_store {
            Some(store) => match store.list_chunks(&ctx.repo_id, &ctx.snapshot_id).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    result.add_warning(format!("loading existing chunks failed: {}", e));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let deleted_files: HashSet<String> = change_set.deleted.clone();
        let delta = self.refresher.compute_delta(
            &old_chunks,
            &new_chunks,
            &deleted_files,
            &change_set.renamed,
        );

        result.metadata.insert(
            "chunk_delta".into(),
            serde_json::json!({
                "added": delta.added.len(),
                "updated": delta.updated.len(),
                "deleted": delta.deleted.len(),
                "renamed": delta.renamed.len(),
                "drifted": delta.drifted.len(),
            }),
        );

        ctx.deleted_chunk_ids = delta.ids_to_delete();
        if let Some(store) = &self.chunk_store {
            for chunk_id in &ctx.deleted_chunk_ids {
                if let Err(e) = store.delete_chunk(chunk_id).await {
                    result.add_warning(format!("chunk delete failed: {}: {}", chunk_id, e));
                }
            }
            let to_save: Vec<Chunk> = delta.chunks_to_save().into_iter().cloned().collect();
            self.save_in_batches(ctx, result, &to_save).await;
        }

        result.chunks_created = delta.added.len()
            + delta.updated.len()
            + delta.renamed.len()
            + delta.drifted.len();
        ctx.chunk_ids = new_chunks.iter().map(|c| c.chunk_id.clone()).collect();

        if let Some(progress) = &mut ctx.progress {
            progress.advance(IndexJobCheckpoint::ChunksStored);
        }
        ctx.persist_progress().await;
        ctx.report_progress(IndexingStage::ChunkGeneration, 100.0);
        true
    }

    fn build_chunks(
        &self,
        ctx: &HandlerContext,
        result: &mut IndexingResult,
    ) -> Option<Vec<Chunk>> {
        let ir_doc = ctx.ir_doc.as_ref()?;
        let graph_doc = ctx.graph_doc.as_ref()?;

        let output = self.chunk_builder.build(ir_doc, graph_doc, &ctx.file_texts);
        for (path, error) in &output.failed_files {
            result.add_warning(format!("chunk build failed: {}: {}", path, error));
        }
        Some(output.chunks)
    }

    /// Streamed saves bound memory; batch size comes from config
    async fn save_in_batches(
        &self,
        ctx: &HandlerContext,
        result: &mut IndexingResult,
        chunks: &[Chunk],
    ) {
        let store = match &self.chunk_store {
            Some(s) => s,
            None => return,
        };

        for batch in chunks.chunks(ctx.config.chunk_batch_size.max(1)) {
            if let Err(e) = store.save_chunks(batch).await {
                result.add_error(format!("chunk save failed: {}", e));
                return;
            }
        }
    }
}
