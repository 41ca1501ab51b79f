//! Orchestration result models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Status of an indexing operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    /// Some files failed but the run as a whole succeeded
    Partial,
}

/// Stages of the indexing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStage {
    GitOperations,
    FileDiscovery,
    Parsing,
    IrBuilding,
    SemanticIrBuilding,
    GraphBuilding,
    ChunkGeneration,
    LexicalIndexing,
    VectorIndexing,
    SymbolIndexing,
    FuzzyIndexing,
    DomainIndexing,
    Finalization,
}

impl IndexingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexingStage::GitOperations => "git_operations",
            IndexingStage::FileDiscovery => "file_discovery",
            IndexingStage::Parsing => "parsing",
            IndexingStage::IrBuilding => "ir_building",
            IndexingStage::SemanticIrBuilding => "semantic_ir_building",
            IndexingStage::GraphBuilding => "graph_building",
            IndexingStage::ChunkGeneration => "chunk_generation",
            IndexingStage::LexicalIndexing => "lexical_indexing",
            IndexingStage::VectorIndexing => "vector_indexing",
            IndexingStage::SymbolIndexing => "symbol_indexing",
            IndexingStage::FuzzyIndexing => "fuzzy_indexing",
            IndexingStage::DomainIndexing => "domain_indexing",
            IndexingStage::Finalization => "finalization",
        }
    }
}

/// Result of an indexing operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingResult {
    pub repo_id: String,
    pub snapshot_id: String,
    pub status: IndexingStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    // File processing
    pub files_discovered: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub files_skipped: usize,

    // IR / graph / chunk stats
    pub ir_nodes_created: usize,
    pub graph_nodes_created: usize,
    pub graph_edges_created: usize,
    pub chunks_created: usize,

    // Index stats
    pub lexical_docs_indexed: usize,
    pub vector_docs_indexed: usize,
    pub symbol_entries_indexed: usize,
    pub fuzzy_entries_indexed: usize,
    pub domain_docs_indexed: usize,

    // Performance
    pub stage_timings: HashMap<String, f64>,
    pub total_duration_seconds: f64,

    // Errors and warnings
    pub errors: Vec<String>,
    pub warnings: Vec<String>,

    // Detailed failure tracking
    pub failed_files: Vec<String>,
    pub failed_parse_files: Vec<String>,
    pub failed_bfg_functions: Vec<String>,
    pub failed_dfg_functions: Vec<String>,

    // Metadata
    pub incremental: bool,
    pub git_commit_hash: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl IndexingResult {
    pub fn new(repo_id: impl Into<String>, snapshot_id: impl Into<String>, incremental: bool) -> Self {
        Self {
            repo_id: repo_id.into(),
            snapshot_id: snapshot_id.into(),
            status: IndexingStatus::InProgress,
            start_time: Utc::now(),
            end_time: None,
            files_discovered: 0,
            files_processed: 0,
            files_failed: 0,
            files_skipped: 0,
            ir_nodes_created: 0,
            graph_nodes_created: 0,
            graph_edges_created: 0,
            chunks_created: 0,
            lexical_docs_indexed: 0,
            vector_docs_indexed: 0,
            symbol_entries_indexed: 0,
            fuzzy_entries_indexed: 0,
            domain_docs_indexed: 0,
            stage_timings: HashMap::new(),
            total_duration_seconds: 0.0,
            errors: Vec::new(),
            warnings: Vec::new(),
            failed_files: Vec::new(),
            failed_parse_files: Vec::new(),
            failed_bfg_functions: Vec::new(),
            failed_dfg_functions: Vec::new(),
            incremental,
            git_commit_hash: None,
            metadata: HashMap::new(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.files_discovered == 0 {
            return 0.0;
        }
        (self.files_processed as f64 / self.files_discovered as f64) * 100.0
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn mark_completed(&mut self) {
        self.status = if self.files_failed > 0 {
            IndexingStatus::Partial
        } else {
            IndexingStatus::Completed
        };
        self.finish();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = IndexingStatus::Failed;
        self.add_error(error);
        self.finish();
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.total_duration_seconds =
            (now - self.start_time).num_milliseconds() as f64 / 1000.0;
        self.end_time = Some(now);
    }

    pub fn record_stage_timing(&mut self, stage: IndexingStage, seconds: f64) {
        self.stage_timings.insert(stage.as_str().to_string(), seconds);
    }
}
