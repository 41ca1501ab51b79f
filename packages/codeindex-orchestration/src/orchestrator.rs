//! Pipeline orchestrator
//!
//! Drives one indexing job end to end: git inspection, file discovery
//! (full or incremental), parsing, IR building, semantic IR, graph
//! building, chunk generation, indexing fan-out, finalization.
//!
//! The control flow is sequential; parallelism lives inside stages.
//! Cancellation finishes the in-flight file, persists progress, and leaves
//! the result IN_PROGRESS with `metadata.stopped_at_stage` set; re-invoking
//! with the same progress resumes.

use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use codeindex_ir::features::edge_validation::EdgeValidator;
use codeindex_ir::features::impact::GraphImpactAnalyzer;
use codeindex_ir::features::parsing::ParserRegistry;

use crate::change_detector::{ChangeDetector, ChangeSet};
use crate::config::IndexingConfig;
use crate::discovery::{DiscoveredFile, FileDiscovery};
use crate::error::Result;
use crate::git::GitHelper;
use crate::handlers::chunking::ChunkingHandler;
use crate::handlers::graph_building::GraphBuildingHandler;
use crate::handlers::indexing::IndexingHandler;
use crate::handlers::ir_building::IrBuildingHandler;
use crate::handlers::parsing::ParsingHandler;
use crate::handlers::{HandlerContext, ProgressCallback};
use crate::models::{IndexingResult, IndexingStage, IndexingStatus};
use crate::progress::{IndexJobCheckpoint, JobProgress};
use crate::session::IndexSessionContext;

pub use crate::handlers::OrchestratorPorts;

/// One indexing request
pub struct IndexRequest {
    pub repo_path: PathBuf,
    pub repo_id: String,
    pub snapshot_id: String,
    pub incremental: bool,
    pub force: bool,
    /// Last indexed commit, for change detection
    pub last_commit: Option<String>,
    /// Resume state from a previous cancelled run
    pub progress: Option<JobProgress>,
    pub cancel: Option<CancellationToken>,
    pub progress_callback: Option<ProgressCallback>,
}

impl IndexRequest {
    pub fn full(repo_path: impl Into<PathBuf>, repo_id: &str, snapshot_id: &str) -> Self {
        Self {
            repo_path: repo_path.into(),
            repo_id: repo_id.to_string(),
            snapshot_id: snapshot_id.to_string(),
            incremental: false,
            force: false,
            last_commit: None,
            progress: None,
            cancel: None,
            progress_callback: None,
        }
    }

    pub fn incremental(
        repo_path: impl Into<PathBuf>,
        repo_id: &str,
        snapshot_id: &str,
        last_commit: Option<String>,
    ) -> Self {
        Self {
            incremental: true,
            last_commit,
            ..Self::full(repo_path, repo_id, snapshot_id)
        }
    }
}

pub struct PipelineOrchestrator {
    config: IndexingConfig,
    ports: OrchestratorPorts,
    registry: Arc<ParserRegistry>,
    edge_validator: Arc<EdgeValidator>,

    parsing: ParsingHandler,
    ir_building: IrBuildingHandler,
    graph_building: GraphBuildingHandler,
    chunking: ChunkingHandler,
    indexing: IndexingHandler,
}

impl PipelineOrchestrator {
    pub fn new(config: IndexingConfig, ports: OrchestratorPorts) -> Self {
        let registry = Arc::new(ParserRegistry::with_defaults());
        let edge_validator = Arc::new(EdgeValidator::new(config.stale_ttl_hours));
        let impact_analyzer =
            GraphImpactAnalyzer::new(config.impact_max_depth, config.impact_max_affected);

        let parsing = ParsingHandler::new(registry.clone());
        let ir_building = IrBuildingHandler::new(registry.clone(), ports.type_analyzer.clone());
        let graph_building = GraphBuildingHandler::new(
            ports.graph_store.clone(),
            edge_validator.clone(),
            impact_analyzer,
        );
        let chunking = ChunkingHandler::new(ports.chunk_store.clone());
        let indexing = IndexingHandler::new(
            ports.lexical_index.clone(),
            ports.vector_index.clone(),
            ports.symbol_index.clone(),
            ports.fuzzy_index.clone(),
            ports.domain_index.clone(),
            ports.embedding_queue.clone(),
            ports.chunk_store.clone(),
        );

        Self {
            config,
            ports,
            registry,
            edge_validator,
            parsing,
            ir_building,
            graph_building,
            chunking,
            indexing,
        }
    }

    /// The edge validator, shared with query paths
    pub fn edge_validator(&self) -> Arc<EdgeValidator> {
        self.edge_validator.clone()
    }

    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<ParserRegistry> {
        self.registry.clone()
    }

    /// Index a repository end to end.
    pub async fn index_repository(&self, request: IndexRequest) -> Result<IndexingResult> {
        let start = Instant::now();
        let mut result = IndexingResult::new(
            &request.repo_id,
            &request.snapshot_id,
            request.incremental,
        );

        let mut ctx = HandlerContext {
            repo_path: request.repo_path.clone(),
            repo_id: request.repo_id.clone(),
            snapshot_id: request.snapshot_id.clone(),
            config: self.config.clone(),
            incremental: request.incremental,
            change_set: None,
            session: IndexSessionContext::new(self.config.max_impact_reindex_files),
            cancel: request.cancel.clone().unwrap_or_default(),
            progress: request.progress.clone(),
            progress_callback: request.progress_callback.clone(),
            progress_store: self.ports.progress_store.clone(),
            parsed_files: Vec::new(),
            source_map: HashMap::new(),
            file_texts: HashMap::new(),
            ir_doc: None,
            semantic_snapshot: None,
            semantic_index: None,
            graph_doc: None,
            chunk_ids: Vec::new(),
            deleted_chunk_ids: Vec::new(),
        };

        tracing::info!(
            repo_id = %request.repo_id,
            snapshot_id = %request.snapshot_id,
            incremental = request.incremental,
            "indexing_started"
        );

        // === Stage 1: git operations ===
        self.stage_git_operations(&ctx, &mut result);

        // === Stage 2: file discovery ===
        let files = if request.incremental && !request.force {
            let change_set = self.stage_incremental_discovery(&ctx, &mut result, &request);
            if change_set.is_empty() {
                tracing::info!(repo_id = %request.repo_id, "no_changes_detected");
                result.mark_completed();
                return Ok(result);
            }
            let files = self.discover_changed(&ctx, &mut result, &change_set);
            ctx.change_set = Some(change_set);
            files
        } else {
            self.stage_full_discovery(&ctx, &mut result)
        };

        if let Some(progress) = &mut ctx.progress {
            progress.total_files = files.len();
            progress.advance(IndexJobCheckpoint::ChangedFilesComputed);
        }

        if files.is_empty() {
            // A change set of pure removals still has store work to do
            let removal_only = ctx
                .change_set
                .as_ref()
                .map(|cs| !cs.deleted.is_empty() || !cs.renamed.is_empty())
                .unwrap_or(false);
            if removal_only {
                self.run_removal_pass(&mut ctx, &mut result).await;
                self.stage_finalization(&mut ctx, &mut result).await;
                result.mark_completed();
                return Ok(result);
            }

            result.add_warning("no files to process");
            result.mark_completed();
            return Ok(result);
        }

        // === Stages 3-9 over the discovered files ===
        let completed = self.run_stages(&mut ctx, &mut result, &files).await?;
        if !completed {
            return Ok(result);
        }

        // === Impact second pass, within the same job ===
        if self.config.enable_impact_pass && ctx.session.has_impact_candidates() {
            self.run_impact_pass(&mut ctx, &mut result).await;
        }

        // === Stage 10: finalization ===
        self.stage_finalization(&mut ctx, &mut result).await;

        result.mark_completed();
        result.total_duration_seconds = start.elapsed().as_secs_f64();
        tracing::info!(
            repo_id = %request.repo_id,
            files_processed = result.files_processed,
            chunks_created = result.chunks_created,
            duration_seconds = result.total_duration_seconds,
            "indexing_completed"
        );
        Ok(result)
    }

    /// Stages 3-9. Returns false when cancelled (result left IN_PROGRESS).
    async fn run_stages(
        &self,
        ctx: &mut HandlerContext,
        result: &mut IndexingResult,
        files: &[DiscoveredFile],
    ) -> Result<bool> {
        // Stage 3: parsing
        let stage_start = Instant::now();
        if !self.parsing.execute(ctx, result, files).await {
            return Ok(self.stopped(ctx, result, "parsing"));
        }
        result.record_stage_timing(IndexingStage::Parsing, stage_start.elapsed().as_secs_f64());

        if ctx.parsed_files.is_empty() {
            result.add_warning("no AST results");
            result.mark_completed();
            return Ok(false);
        }

        // Stage 4: structural IR
        let stage_start = Instant::now();
        let produced = self.ir_building.execute_ir_building(ctx, result).await;
        result.record_stage_timing(IndexingStage::IrBuilding, stage_start.elapsed().as_secs_f64());
        if self.check_cancelled(ctx, result, "ir_building") {
            return Ok(false);
        }
        if !produced {
            // Parsed ASTs with an empty IR document is stage-fatal
            result.mark_failed("IR building returned empty result");
            return Ok(false);
        }

        // Stage 5: semantic IR
        let stage_start = Instant::now();
        if !self.ir_building.execute_semantic_ir_building(ctx, result).await {
            result.mark_failed("Semantic IR building returned empty result");
            return Ok(false);
        }
        result.record_stage_timing(
            IndexingStage::SemanticIrBuilding,
            stage_start.elapsed().as_secs_f64(),
        );
        if self.check_cancelled(ctx, result, "semantic_ir_building") {
            return Ok(false);
        }

        // Stage 6: graph
        let stage_start = Instant::now();
        let graph_ok = match ctx.change_set.clone() {
            Some(change_set) if ctx.incremental => {
                self.graph_building
                    .execute_incremental(ctx, result, &change_set)
                    .await
            }
            _ => self.graph_building.execute(ctx, result).await,
        };
        result.record_stage_timing(
            IndexingStage::GraphBuilding,
            stage_start.elapsed().as_secs_f64(),
        );
        if !graph_ok {
            result.mark_failed("Graph building returned empty result");
            return Ok(false);
        }
        if self.check_cancelled(ctx, result, "graph_building") {
            return Ok(false);
        }

        // Stage 7: chunks
        let stage_start = Instant::now();
        let chunks_ok = match ctx.change_set.clone() {
            Some(change_set) if ctx.incremental => {
                self.chunking
                    .execute_incremental(ctx, result, &change_set)
                    .await
            }
            _ => self.chunking.execute(ctx, result).await,
        };
        result.record_stage_timing(
            IndexingStage::ChunkGeneration,
            stage_start.elapsed().as_secs_f64(),
        );
        if !chunks_ok {
            result.mark_failed("Chunk generation returned empty result");
            return Ok(false);
        }
        if ctx.chunk_ids.is_empty() {
            result.add_warning("no chunks generated");
            result.mark_completed();
            return Ok(false);
        }
        if self.check_cancelled(ctx, result, "chunk_generation") {
            return Ok(false);
        }

        // Stage 9: index fan-out
        let stage_start = Instant::now();
        let deleted_chunk_ids = std::mem::take(&mut ctx.deleted_chunk_ids);
        self.indexing.execute(ctx, result, &deleted_chunk_ids).await;
        result
            .stage_timings
            .insert("indexing".to_string(), stage_start.elapsed().as_secs_f64());

        Ok(true)
    }

    /// Deletions and rename-sources with no surviving files to parse:
    /// graph nodes are removed (inbound edges marked INVALID, not silently
    /// deleted), chunks dropped, indexes told to forget the IDs.
    async fn run_removal_pass(&self, ctx: &mut HandlerContext, result: &mut IndexingResult) {
        let change_set = match ctx.change_set.clone() {
            Some(cs) => cs,
            None => return,
        };

        ctx.ir_doc = Some(codeindex_ir::shared::models::IRDocument::new(
            ctx.repo_id.clone(),
            ctx.snapshot_id.clone(),
        ));

        if !self
            .graph_building
            .execute_incremental(ctx, result, &change_set)
            .await
        {
            return;
        }
        if !self
            .chunking
            .execute_incremental(ctx, result, &change_set)
            .await
        {
            return;
        }
        let deleted = std::mem::take(&mut ctx.deleted_chunk_ids);
        self.indexing.execute(ctx, result, &deleted).await;
    }

    /// The impact pass reprocesses affected files inside the same job (a
    /// new job would supersede this one's scope).
    async fn run_impact_pass(&self, ctx: &mut HandlerContext, result: &mut IndexingResult) {
        let batch = ctx.session.take_impact_batch();
        if batch.is_empty() {
            return;
        }

        tracing::info!(count = batch.len(), "impact_pass_started");
        result
            .metadata
            .insert("impact_pass_files".into(), json!(batch.clone()));

        let discovery = FileDiscovery::new(self.config.clone());
        let files = discovery.discover_files(&ctx.repo_path, Some(&batch));
        if files.is_empty() {
            return;
        }

        // Affected files rebuild as "modified"
        let mut change_set = ChangeSet::default();
        for file in &files {
            change_set.modified.insert(file.rel_path.clone());
        }

        // Reset per-pass intermediates; stores accumulate across passes
        ctx.parsed_files.clear();
        ctx.source_map.clear();
        ctx.file_texts.clear();
        ctx.ir_doc = None;
        ctx.semantic_snapshot = None;
        ctx.semantic_index = None;
        ctx.graph_doc = None;
        ctx.chunk_ids.clear();
        ctx.deleted_chunk_ids.clear();
        ctx.incremental = true;
        ctx.change_set = Some(change_set.clone());

        if !self.parsing.execute(ctx, result, &files).await {
            return;
        }
        if !self.ir_building.execute_ir_building(ctx, result).await {
            return;
        }
        if !self.ir_building.execute_semantic_ir_building(ctx, result).await {
            return;
        }
        if !self
            .graph_building
            .execute_incremental(ctx, result, &change_set)
            .await
        {
            return;
        }
        if !self
            .chunking
            .execute_incremental(ctx, result, &change_set)
            .await
        {
            return;
        }
        let deleted = std::mem::take(&mut ctx.deleted_chunk_ids);
        self.indexing.execute(ctx, result, &deleted).await;

        for file in change_set.all_changed() {
            ctx.session.mark_file_processed(&file);
        }
        tracing::info!("impact_pass_completed");
    }

    fn stage_git_operations(&self, ctx: &HandlerContext, result: &mut IndexingResult) {
        ctx.report_progress(IndexingStage::GitOperations, 0.0);

        let git = GitHelper::new(&ctx.repo_path);
        if git.is_git_repo() {
            match git.current_commit_hash() {
                Ok(hash) => {
                    if let Ok(branch) = git.current_branch() {
                        result
                            .metadata
                            .insert("git_info".into(), json!({ "current_branch": branch }));
                    }
                    result.git_commit_hash = Some(hash);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "git_operations_failed");
                    result.add_warning(format!("Git operations failed: {}", e));
                }
            }
        } else {
            tracing::warn!(repo = %ctx.repo_path.display(), "not_a_git_repository");
            result.add_warning("Not a Git repository");
        }

        ctx.report_progress(IndexingStage::GitOperations, 100.0);
    }

    fn stage_full_discovery(
        &self,
        ctx: &HandlerContext,
        result: &mut IndexingResult,
    ) -> Vec<DiscoveredFile> {
        ctx.report_progress(IndexingStage::FileDiscovery, 0.0);

        let discovery = FileDiscovery::new(self.config.clone());
        let files = discovery.discover_files(&ctx.repo_path, None);

        result.files_discovered = files.len();
        result
            .metadata
            .insert("file_stats".into(), discovery.file_stats(&files));

        ctx.report_progress(IndexingStage::FileDiscovery, 100.0);
        tracing::info!(mode = "full", count = files.len(), "files_discovered");
        files
    }

    fn stage_incremental_discovery(
        &self,
        ctx: &HandlerContext,
        result: &mut IndexingResult,
        request: &IndexRequest,
    ) -> ChangeSet {
        ctx.report_progress(IndexingStage::FileDiscovery, 0.0);

        let detector = ChangeDetector::new(self.config.clone());
        let change_set = detector.detect_changes(
            &ctx.repo_path,
            &ctx.repo_id,
            request.last_commit.as_deref(),
        );

        result.metadata.insert(
            "change_set".into(),
            json!({
                "added": change_set.added.len(),
                "modified": change_set.modified.len(),
                "deleted": change_set.deleted.len(),
                "renamed": change_set.renamed.len(),
            }),
        );
        result.metadata.insert(
            "changed_files".into(),
            json!(change_set.all_changed().into_iter().collect::<Vec<_>>()),
        );

        change_set
    }

    fn discover_changed(
        &self,
        ctx: &HandlerContext,
        result: &mut IndexingResult,
        change_set: &ChangeSet,
    ) -> Vec<DiscoveredFile> {
        let discovery = FileDiscovery::new(self.config.clone());
        let paths = change_set.paths_to_index();
        let files = discovery.discover_files(&ctx.repo_path, Some(&paths));

        result.files_discovered = files.len();
        if !files.is_empty() {
            result
                .metadata
                .insert("file_stats".into(), discovery.file_stats(&files));
        }
        ctx.report_progress(IndexingStage::FileDiscovery, 100.0);
        files
    }

    async fn stage_finalization(&self, ctx: &mut HandlerContext, result: &mut IndexingResult) {
        ctx.report_progress(IndexingStage::Finalization, 0.0);

        if let Some(hash) = &result.git_commit_hash {
            result
                .metadata
                .insert("previous_commit".into(), json!(hash));
        }
        if let Some(progress) = &mut ctx.progress {
            progress.advance(IndexJobCheckpoint::Completed);
        }
        ctx.persist_progress().await;

        ctx.report_progress(IndexingStage::Finalization, 100.0);
    }

    fn check_cancelled(
        &self,
        ctx: &HandlerContext,
        result: &mut IndexingResult,
        stage: &str,
    ) -> bool {
        if ctx.is_cancelled() {
            self.stopped(ctx, result, stage);
            return true;
        }
        false
    }

    /// Record the interruption; checkpoints remain valid for resume
    fn stopped(&self, _ctx: &HandlerContext, result: &mut IndexingResult, stage: &str) -> bool {
        tracing::info!(stage, "indexing_stopped_by_request");
        result.status = IndexingStatus::InProgress;
        result
            .metadata
            .insert("stopped_at_stage".into(), json!(stage));
        false
    }
}
