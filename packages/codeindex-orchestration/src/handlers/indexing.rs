//! Indexing fan-out stage
//!
//! Parallel fan-out to the five index ports. Every indexer is optional;
//! failures are warnings, never fatal. Deletions are applied before new
//! material is ingested.
//!
//! Vector indexing is priority-partitioned: "high" chunks (functions,
//! methods, classes) embed inline; the rest go to the embedding queue when
//! one is configured.

use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;

use codeindex_ir::features::chunking::chunk::EmbedPriority;
use codeindex_ir::features::chunking::{Chunk, ChunkStore};
use codeindex_ir::features::multi_index::{
    DomainIndex, EmbeddingQueue, FuzzyIndex, IndexDoc, LexicalIndex, SymbolIndex, VectorDoc,
    VectorIndex,
};
use codeindex_ir::shared::models::NodeKind;

use super::HandlerContext;
use crate::models::{IndexingResult, IndexingStage};
use crate::progress::IndexJobCheckpoint;

pub struct IndexingHandler {
    lexical_index: Option<Arc<dyn LexicalIndex>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    symbol_index: Option<Arc<dyn SymbolIndex>>,
    fuzzy_index: Option<Arc<dyn FuzzyIndex>>,
    domain_index: Option<Arc<dyn DomainIndex>>,
    embedding_queue: Option<Arc<dyn EmbeddingQueue>>,
    chunk_store: Option<Arc<dyn ChunkStore>>,
}

impl IndexingHandler {
    pub fn new(
        lexical_index: Option<Arc<dyn LexicalIndex>>,
        vector_index: Option<Arc<dyn VectorIndex>>,
        symbol_index: Option<Arc<dyn SymbolIndex>>,
        fuzzy_index: Option<Arc<dyn FuzzyIndex>>,
        domain_index: Option<Arc<dyn DomainIndex>>,
        embedding_queue: Option<Arc<dyn EmbeddingQueue>>,
        chunk_store: Option<Arc<dyn ChunkStore>>,
    ) -> Self {
        Self {
            lexical_index,
            vector_index,
            symbol_index,
            fuzzy_index,
            domain_index,
            embedding_queue,
            chunk_store,
        }
    }

    /// Stage 9: fan out to the configured indexes in parallel.
    /// `deleted_chunk_ids` are dropped from each index before ingestion.
    pub async fn execute(
        &self,
        ctx: &mut HandlerContext,
        result: &mut IndexingResult,
        deleted_chunk_ids: &[String],
    ) -> bool {
        let chunks = self.load_chunks(ctx, result).await;

        let mut warnings: Vec<String> = Vec::new();
        let shared_ctx: &HandlerContext = &*ctx;
        let mut tasks: Vec<futures::future::BoxFuture<'_, IndexOutcome>> = Vec::new();

        if shared_ctx.config.enable_lexical_index {
            if let Some(lexical) = &self.lexical_index {
                tasks.push(Box::pin(run_lexical(
                    lexical.clone(),
                    shared_ctx,
                    deleted_chunk_ids.to_vec(),
                )));
            }
        }
        if shared_ctx.config.enable_vector_index {
            if let Some(vector) = &self.vector_index {
                tasks.push(Box::pin(run_vector(
                    vector.clone(),
                    self.embedding_queue.clone(),
                    shared_ctx,
                    chunks.clone(),
                    deleted_chunk_ids.to_vec(),
                )));
            }
        }
        if shared_ctx.config.enable_symbol_index {
            if let Some(symbol) = &self.symbol_index {
                tasks.push(Box::pin(run_symbol(symbol.clone(), shared_ctx)));
            }
        }
        if shared_ctx.config.enable_fuzzy_index {
            if let Some(fuzzy) = &self.fuzzy_index {
                tasks.push(Box::pin(run_fuzzy(fuzzy.clone(), shared_ctx, chunks.clone())));
            }
        }
        if shared_ctx.config.enable_domain_index {
            if let Some(domain) = &self.domain_index {
                tasks.push(Box::pin(run_domain(domain.clone(), shared_ctx, chunks.clone())));
            }
        }

        let outcomes = join_all(tasks).await;
        for outcome in outcomes {
            match outcome {
                IndexOutcome::Lexical(count) => result.lexical_docs_indexed = count,
                IndexOutcome::Vector { indexed, queued } => {
                    result.vector_docs_indexed = indexed;
                    if queued > 0 {
                        result.metadata.insert("embedding_queued".into(), json!(queued));
                    }
                }
                IndexOutcome::Symbol(count) => result.symbol_entries_indexed = count,
                IndexOutcome::Fuzzy(count) => result.fuzzy_entries_indexed = count,
                IndexOutcome::Domain(count) => result.domain_docs_indexed = count,
                IndexOutcome::Failed(stage, error) => {
                    warnings.push(format!("{} indexing failed: {}", stage, error));
                }
            }
        }

        for warning in warnings {
            tracing::warn!(warning = %warning, "index_fanout_warning");
            result.add_warning(warning);
        }

        if let Some(progress) = &mut ctx.progress {
            progress.advance(IndexJobCheckpoint::IndexesUpdated);
        }
        ctx.persist_progress().await;
        true
    }

    async fn load_chunks(&self, ctx: &HandlerContext, result: &mut IndexingResult) -> Vec<Chunk> {
        let store = match &self.chunk_store {
            Some(s) => s,
            None => return Vec::new(),
        };

        let mut chunks = Vec::new();
        for batch_ids in ctx.chunk_ids.chunks(ctx.config.chunk_batch_size.max(1)) {
            match store.get_chunks_batch(batch_ids).await {
                Ok(mut batch) => {
                    // Preserve the requested order
                    for id in batch_ids {
                        if let Some(chunk) = batch.remove(id) {
                            chunks.push(chunk);
                        }
                    }
                }
                Err(e) => {
                    result.add_warning(format!("loading chunks for indexing failed: {}", e));
                }
            }
        }
        chunks
    }
}

enum IndexOutcome {
    Lexical(usize),
    Vector { indexed: usize, queued: usize },
    Symbol(usize),
    Fuzzy(usize),
    Domain(usize),
    Failed(&'static str, String),
}

async fn run_lexical(
    lexical: Arc<dyn LexicalIndex>,
    ctx: &HandlerContext,
    deleted_ids: Vec<String>,
) -> IndexOutcome {
    ctx.report_progress(IndexingStage::LexicalIndexing, 0.0);

    if !deleted_ids.is_empty() {
        if let Err(e) = lexical.delete(&ctx.repo_id, &ctx.snapshot_id, &deleted_ids).await {
            return IndexOutcome::Failed("lexical", e.to_string());
        }
    }

    // Incremental with a delta layer updates only changed files; the base
    // is never touched. Otherwise the whole repo is reindexed.
    let outcome = if ctx.incremental {
        if let Some(delta) = lexical.delta() {
            let mut count = 0;
            let paths = ctx
                .change_set
                .as_ref()
                .map(|cs| cs.paths_to_index())
                .unwrap_or_default();
            for path in &paths {
                let content = ctx.file_texts.get(path).cloned().unwrap_or_default();
                match delta.index_file(&ctx.repo_id, path, &content).await {
                    Ok(()) => count += 1,
                    Err(e) => return IndexOutcome::Failed("lexical", e.to_string()),
                }
            }
            Ok(count)
        } else {
            let paths = ctx
                .change_set
                .as_ref()
                .map(|cs| cs.paths_to_index())
                .unwrap_or_default();
            lexical
                .reindex_paths(&ctx.repo_id, &ctx.snapshot_id, &paths)
                .await
        }
    } else {
        lexical.reindex_repo(&ctx.repo_id, &ctx.snapshot_id).await
    };

    ctx.report_progress(IndexingStage::LexicalIndexing, 100.0);
    match outcome {
        Ok(count) => IndexOutcome::Lexical(count),
        Err(e) => IndexOutcome::Failed("lexical", e.to_string()),
    }
}

async fn run_vector(
    vector: Arc<dyn VectorIndex>,
    queue: Option<Arc<dyn EmbeddingQueue>>,
    ctx: &HandlerContext,
    chunks: Vec<Chunk>,
    deleted_ids: Vec<String>,
) -> IndexOutcome {
    ctx.report_progress(IndexingStage::VectorIndexing, 0.0);

    if !deleted_ids.is_empty() {
        if let Err(e) = vector.delete(&ctx.repo_id, &ctx.snapshot_id, &deleted_ids).await {
            return IndexOutcome::Failed("vector", e.to_string());
        }
    }

    // Priority partition: with a queue only "high" embeds inline
    let (inline, deferred): (Vec<&Chunk>, Vec<&Chunk>) = if queue.is_some() {
        chunks
            .iter()
            .partition(|c| c.kind.embed_priority() == EmbedPriority::High)
    } else {
        (chunks.iter().collect(), Vec::new())
    };

    let docs: Vec<VectorDoc> = inline
        .iter()
        .map(|chunk| VectorDoc {
            id: chunk.chunk_id.clone(),
            content: format!("{} {}", chunk.fqn, chunk.content_hash),
            payload: json!({
                "file_path": chunk.file_path,
                "kind": chunk.kind.as_str(),
                "fqn": chunk.fqn,
            }),
        })
        .collect();

    let mut indexed = 0;
    for batch in docs.chunks(ctx.config.vector_batch_size.max(1)) {
        match vector.index(&ctx.repo_id, &ctx.snapshot_id, batch).await {
            Ok(count) => indexed += count,
            Err(e) => return IndexOutcome::Failed("vector", e.to_string()),
        }
    }

    let mut queued = 0;
    if let Some(queue) = queue {
        if !deferred.is_empty() {
            let deferred_owned: Vec<Chunk> = deferred.into_iter().cloned().collect();
            match queue
                .enqueue(&deferred_owned, &ctx.repo_id, &ctx.snapshot_id)
                .await
            {
                Ok(count) => queued = count,
                Err(e) => {
                    tracing::warn!(error = %e, "embedding_queue_enqueue_failed");
                }
            }
        }
    }

    ctx.report_progress(IndexingStage::VectorIndexing, 100.0);
    IndexOutcome::Vector { indexed, queued }
}

async fn run_symbol(symbol: Arc<dyn SymbolIndex>, ctx: &HandlerContext) -> IndexOutcome {
    ctx.report_progress(IndexingStage::SymbolIndexing, 0.0);

    let graph = match &ctx.graph_doc {
        Some(g) => g,
        None => return IndexOutcome::Symbol(0),
    };

    let outcome = symbol.index_graph(&ctx.repo_id, &ctx.snapshot_id, graph).await;
    ctx.report_progress(IndexingStage::SymbolIndexing, 100.0);
    match outcome {
        Ok(count) => IndexOutcome::Symbol(count),
        Err(e) => IndexOutcome::Failed("symbol", e.to_string()),
    }
}

/// Flattened identifier view from the IR
fn identifier_docs(ctx: &HandlerContext) -> Vec<IndexDoc> {
    let ir_doc = match &ctx.ir_doc {
        Some(doc) => doc,
        None => return Vec::new(),
    };

    ir_doc
        .nodes
        .iter()
        .filter(|n| {
            matches!(
                n.kind,
                NodeKind::Function | NodeKind::Method | NodeKind::Class | NodeKind::Variable
            )
        })
        .map(|n| IndexDoc {
            id: n.id.clone(),
            text: format!("{} {}", n.name, n.fqn),
            payload: json!({ "file_path": n.file_path, "kind": format!("{:?}", n.kind) }),
        })
        .collect()
}

async fn run_fuzzy(
    fuzzy: Arc<dyn FuzzyIndex>,
    ctx: &HandlerContext,
    _chunks: Vec<Chunk>,
) -> IndexOutcome {
    ctx.report_progress(IndexingStage::FuzzyIndexing, 0.0);
    let docs = identifier_docs(ctx);
    let outcome = fuzzy.index(&ctx.repo_id, &ctx.snapshot_id, &docs).await;
    ctx.report_progress(IndexingStage::FuzzyIndexing, 100.0);
    match outcome {
        Ok(count) => IndexOutcome::Fuzzy(count),
        Err(e) => IndexOutcome::Failed("fuzzy", e.to_string()),
    }
}

async fn run_domain(
    domain: Arc<dyn DomainIndex>,
    ctx: &HandlerContext,
    chunks: Vec<Chunk>,
) -> IndexOutcome {
    ctx.report_progress(IndexingStage::DomainIndexing, 0.0);

    let docs: Vec<IndexDoc> = chunks
        .iter()
        .map(|chunk| IndexDoc {
            id: chunk.chunk_id.clone(),
            text: chunk.fqn.clone(),
            payload: json!({ "file_path": chunk.file_path, "kind": chunk.kind.as_str() }),
        })
        .collect();

    let outcome = domain.index(&ctx.repo_id, &ctx.snapshot_id, &docs).await;
    ctx.report_progress(IndexingStage::DomainIndexing, 100.0);
    match outcome {
        Ok(count) => IndexOutcome::Domain(count),
        Err(e) => IndexOutcome::Failed("domain", e.to_string()),
    }
}
