//! Pipeline stage handlers
//!
//! Each stage reads the previous stage's outputs from the shared
//! HandlerContext; there is no hidden global state.

pub mod chunking;
pub mod graph_building;
pub mod indexing;
pub mod ir_building;
pub mod parsing;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use codeindex_ir::features::chunking::ChunkStore;
use codeindex_ir::features::graph::{GraphDocument, GraphStore};
use codeindex_ir::features::multi_index::{
    DomainIndex, EmbeddingQueue, ExternalTypeAnalyzer, FuzzyIndex, LexicalIndex, SymbolIndex,
    VectorIndex,
};
use codeindex_ir::features::parsing::{ParsedFile, SourceMap};
use codeindex_ir::features::semantic_ir::{SemanticIndex, SemanticIrSnapshot};
use codeindex_ir::shared::models::IRDocument;

use crate::change_detector::ChangeSet;
use crate::config::IndexingConfig;
use crate::models::IndexingStage;
use crate::progress::{JobProgress, ProgressStore};
use crate::session::IndexSessionContext;

/// Non-blocking progress callback `(stage, percent ∈ [0,100])`
pub type ProgressCallback = Arc<dyn Fn(IndexingStage, f64) + Send + Sync>;

/// Storage and index ports, dependency-injected from the composition root
#[derive(Clone, Default)]
pub struct OrchestratorPorts {
    pub graph_store: Option<Arc<dyn GraphStore>>,
    pub chunk_store: Option<Arc<dyn ChunkStore>>,
    pub lexical_index: Option<Arc<dyn LexicalIndex>>,
    pub vector_index: Option<Arc<dyn VectorIndex>>,
    pub symbol_index: Option<Arc<dyn SymbolIndex>>,
    pub fuzzy_index: Option<Arc<dyn FuzzyIndex>>,
    pub domain_index: Option<Arc<dyn DomainIndex>>,
    pub embedding_queue: Option<Arc<dyn EmbeddingQueue>>,
    pub progress_store: Option<Arc<dyn ProgressStore>>,
    pub type_analyzer: Option<Arc<dyn ExternalTypeAnalyzer>>,
}

/// Shared context passed between handlers during one indexing run
pub struct HandlerContext {
    pub repo_path: PathBuf,
    pub repo_id: String,
    pub snapshot_id: String,
    pub config: IndexingConfig,
    pub incremental: bool,
    pub change_set: Option<ChangeSet>,

    pub session: IndexSessionContext,
    pub cancel: CancellationToken,

    pub progress: Option<JobProgress>,
    pub progress_callback: Option<ProgressCallback>,
    pub progress_store: Option<Arc<dyn ProgressStore>>,

    // Intermediate results, populated stage by stage
    pub parsed_files: Vec<ParsedFile>,
    pub source_map: SourceMap,
    pub file_texts: HashMap<String, String>,
    pub ir_doc: Option<IRDocument>,
    pub semantic_snapshot: Option<SemanticIrSnapshot>,
    pub semantic_index: Option<SemanticIndex>,
    pub graph_doc: Option<GraphDocument>,
    pub chunk_ids: Vec<String>,
    /// Chunk IDs removed by the incremental refresher; the index fan-out
    /// drops these before ingestion
    pub deleted_chunk_ids: Vec<String>,
}

impl HandlerContext {
    pub fn report_progress(&self, stage: IndexingStage, percent: f64) {
        if let Some(callback) = &self.progress_callback {
            callback(stage, percent.clamp(0.0, 100.0));
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Persist progress opportunistically; persistence failures degrade to
    /// warnings so the pipeline keeps moving
    pub async fn persist_progress(&self) {
        if let (Some(store), Some(progress)) = (&self.progress_store, &self.progress) {
            if let Err(e) = store.persist(progress).await {
                tracing::warn!(error = %e, "progress_persist_failed");
            }
        }
    }
}
