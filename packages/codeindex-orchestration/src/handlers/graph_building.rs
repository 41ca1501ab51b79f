//! Graph building stage
//!
//! Full builds replace the stored graph. Incremental builds follow the
//! source-local invalidation protocol, in strict order:
//!
//! 1. mark cross-file backward edges stale
//! 2. delete nodes of deleted files (cascade target_deleted marking,
//!    reap orphan module nodes)
//! 3. delete outbound edges of modified files (keep the nodes)
//! 4. build + upsert the new graph
//! 5. analyze symbol-level impact (may recommend further reindexing)
//! 6. clear stale entries for files reindexed by this run

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use codeindex_ir::features::edge_validation::EdgeValidator;
use codeindex_ir::features::graph::{GraphBuilder, GraphDocument, GraphStore, SaveMode};
use codeindex_ir::features::impact::{detect_symbol_changes, GraphImpactAnalyzer};

use super::HandlerContext;
use crate::change_detector::ChangeSet;
use crate::models::{IndexingResult, IndexingStage};

pub struct GraphBuildingHandler {
    graph_builder: GraphBuilder,
    graph_store: Option<Arc<dyn GraphStore>>,
    edge_validator: Arc<EdgeValidator>,
    impact_analyzer: GraphImpactAnalyzer,
}

impl GraphBuildingHandler {
    pub fn new(
        graph_store: Option<Arc<dyn GraphStore>>,
        edge_validator: Arc<EdgeValidator>,
        impact_analyzer: GraphImpactAnalyzer,
    ) -> Self {
        Self {
            graph_builder: GraphBuilder::new(),
            graph_store,
            edge_validator,
            impact_analyzer,
        }
    }

    /// Stage 6, full mode
    pub async fn execute(&self, ctx: &mut HandlerContext, result: &mut IndexingResult) -> bool {
        ctx.report_progress(IndexingStage::GraphBuilding, 0.0);

        let graph_doc = match self.build(ctx, result) {
            Some(doc) => doc,
            None => return false,
        };

        self.record_counts(result, &graph_doc);
        self.save(&graph_doc, SaveMode::Replace, result).await;

        ctx.graph_doc = Some(graph_doc);
        ctx.report_progress(IndexingStage::GraphBuilding, 100.0);
        true
    }

    /// Stage 6, incremental mode
    pub async fn execute_incremental(
        &self,
        ctx: &mut HandlerContext,
        result: &mut IndexingResult,
        change_set: &ChangeSet,
    ) -> bool {
        ctx.report_progress(IndexingStage::GraphBuilding, 0.0);
        tracing::info!(
            deleted = change_set.deleted.len(),
            modified = change_set.modified.len(),
            added = change_set.added.len(),
            renamed = change_set.renamed.len(),
            "incremental_graph_building_started"
        );

        // Step 0: existing graph for stale analysis
        let existing_graph = self.load_existing(ctx).await;

        // Step 1: stale marking
        if let Some(existing) = &existing_graph {
            let mut changed: HashSet<String> = change_set
                .modified
                .union(&change_set.deleted)
                .cloned()
                .collect();
            for (old, _) in &change_set.renamed {
                changed.insert(old.clone());
            }
            if !changed.is_empty() {
                let stale = self
                    .edge_validator
                    .mark_stale_edges(&ctx.repo_id, &changed, existing);
                if !stale.is_empty() {
                    result
                        .metadata
                        .insert("stale_edges_marked".into(), json!(stale.len()));
                    result.metadata.insert(
                        "stale_source_files".into(),
                        json!(self
                            .edge_validator
                            .get_stale_source_files(&ctx.repo_id)
                            .into_iter()
                            .collect::<Vec<_>>()),
                    );
                }
            }
        }

        // Steps 2-3: deletions then outbound-edge removal
        self.handle_deleted_files(ctx, result, change_set, existing_graph.as_ref())
            .await;
        self.handle_modified_files(ctx, result, change_set).await;

        // Step 4: build and upsert; targets in untouched files resolve
        // through the existing graph
        let graph_doc = match self.build_with_fallback(ctx, result, existing_graph.as_ref()) {
            Some(doc) => doc,
            None => return false,
        };
        self.record_counts(result, &graph_doc);
        self.save(&graph_doc, SaveMode::Upsert, result).await;

        // Step 5: impact analysis
        if let Some(existing) = &existing_graph {
            self.analyze_impact(ctx, result, existing, &graph_doc, change_set);
        }

        // Step 6: clear stale entries for reindexed files
        let mut cleared = 0;
        for file in change_set.paths_to_index() {
            cleared += self.edge_validator.clear_stale_for_file(&ctx.repo_id, &file);
        }
        if cleared > 0 {
            result
                .metadata
                .insert("stale_edges_cleared".into(), json!(cleared));
        }

        ctx.graph_doc = Some(graph_doc);
        ctx.report_progress(IndexingStage::GraphBuilding, 100.0);
        true
    }

    fn build(&self, ctx: &HandlerContext, result: &mut IndexingResult) -> Option<GraphDocument> {
        self.build_with_fallback(ctx, result, None)
    }

    fn build_with_fallback(
        &self,
        ctx: &HandlerContext,
        result: &mut IndexingResult,
        existing: Option<&GraphDocument>,
    ) -> Option<GraphDocument> {
        let ir_doc = ctx.ir_doc.as_ref()?;
        let outcome = match existing {
            Some(existing) => self.graph_builder.build_incremental(
                ir_doc,
                ctx.semantic_snapshot.as_ref(),
                existing,
            ),
            None => self
                .graph_builder
                .build_full(ir_doc, ctx.semantic_snapshot.as_ref()),
        };
        match outcome {
            Ok(doc) => Some(doc),
            Err(e) => {
                result.add_error(format!("graph building failed: {}", e));
                None
            }
        }
    }

    fn record_counts(&self, result: &mut IndexingResult, doc: &GraphDocument) {
        result.graph_nodes_created = doc.graph_nodes.len();
        result.graph_edges_created = doc.graph_edges.len();
        tracing::info!(
            nodes = result.graph_nodes_created,
            edges = result.graph_edges_created,
            "graph_building_completed"
        );
    }

    async fn load_existing(&self, ctx: &HandlerContext) -> Option<GraphDocument> {
        let store = self.graph_store.as_ref()?;
        match store.load_graph(&ctx.repo_id, &ctx.snapshot_id).await {
            Ok(graph) => graph,
            Err(e) => {
                tracing::warn!(error = %e, "failed_to_load_existing_graph");
                None
            }
        }
    }

    async fn save(&self, doc: &GraphDocument, mode: SaveMode, result: &mut IndexingResult) {
        let store = match &self.graph_store {
            Some(s) => s,
            None => {
                tracing::info!("graph_save_skipped_no_store");
                return;
            }
        };
        if doc.is_empty() {
            tracing::info!("graph_save_skipped_empty");
            return;
        }
        if let Err(e) = store.save_graph(doc, mode).await {
            result.add_error(format!("graph save failed: {}", e));
        }
    }

    async fn handle_deleted_files(
        &self,
        ctx: &HandlerContext,
        result: &mut IndexingResult,
        change_set: &ChangeSet,
        existing_graph: Option<&GraphDocument>,
    ) {
        let removed_paths = change_set.paths_to_remove();
        if removed_paths.is_empty() {
            return;
        }

        // Inbound edges of dying symbols become target_deleted
        if let Some(existing) = existing_graph {
            let path_set: HashSet<String> = removed_paths.iter().cloned().collect();
            let deleted_symbol_ids = existing.node_ids_for_files(&path_set);
            if !deleted_symbol_ids.is_empty() {
                self.edge_validator.mark_deleted_symbol_edges(
                    &ctx.repo_id,
                    &deleted_symbol_ids,
                    existing,
                );
            }
        }

        let store = match &self.graph_store {
            Some(s) => s,
            None => return,
        };

        match store
            .delete_nodes_for_deleted_files(&ctx.repo_id, &removed_paths)
            .await
        {
            Ok(count) => {
                tracing::info!(count, "graph_nodes_deleted_for_deleted_files");
                result.metadata.insert("graph_nodes_deleted".into(), json!(count));
            }
            Err(e) => result.add_warning(format!("deleting graph nodes failed: {}", e)),
        }

        match store.delete_orphan_module_nodes(&ctx.repo_id).await {
            Ok(count) if count > 0 => {
                result
                    .metadata
                    .insert("orphan_modules_deleted".into(), json!(count));
            }
            Ok(_) => {}
            Err(e) => result.add_warning(format!("orphan cleanup failed: {}", e)),
        }
    }

    async fn handle_modified_files(
        &self,
        ctx: &HandlerContext,
        result: &mut IndexingResult,
        change_set: &ChangeSet,
    ) {
        if change_set.modified.is_empty() {
            return;
        }
        let store = match &self.graph_store {
            Some(s) => s,
            None => return,
        };

        let modified: Vec<String> = {
            let mut v: Vec<String> = change_set.modified.iter().cloned().collect();
            v.sort();
            v
        };
        match store
            .delete_outbound_edges_by_file_paths(&ctx.repo_id, &modified)
            .await
        {
            Ok(count) => {
                tracing::info!(count, "graph_outbound_edges_deleted_for_modified_files");
                result.metadata.insert("graph_edges_deleted".into(), json!(count));
            }
            Err(e) => result.add_warning(format!("deleting outbound edges failed: {}", e)),
        }
    }

    fn analyze_impact(
        &self,
        ctx: &mut HandlerContext,
        result: &mut IndexingResult,
        existing: &GraphDocument,
        new_graph: &GraphDocument,
        change_set: &ChangeSet,
    ) {
        let changed_files = change_set.all_changed();
        let changes = detect_symbol_changes(existing, new_graph, &changed_files);
        if changes.is_empty() {
            return;
        }

        let mut type_counts: std::collections::BTreeMap<&str, usize> = Default::default();
        for change in &changes {
            let name = match change.change_type {
                codeindex_ir::features::impact::SymbolChangeType::Modified => "MODIFIED",
                codeindex_ir::features::impact::SymbolChangeType::Deleted => "DELETED",
                codeindex_ir::features::impact::SymbolChangeType::SignatureChanged => {
                    "SIGNATURE_CHANGED"
                }
            };
            *type_counts.entry(name).or_insert(0) += 1;
        }
        result
            .metadata
            .insert("symbol_change_types".into(), json!(type_counts));

        let impact = self.impact_analyzer.analyze_impact(existing, &changes);
        result.metadata.insert(
            "impact_analysis".into(),
            json!({
                "direct_affected": impact.direct_affected.len(),
                "transitive_affected": impact.transitive_affected.len(),
                "affected_files": impact.affected_files.iter().take(20).collect::<Vec<_>>(),
            }),
        );

        // Affected files this run did not process are follow-up candidates
        let unprocessed: Vec<String> = {
            let mut v: Vec<String> = impact
                .affected_files
                .difference(&changed_files)
                .cloned()
                .collect();
            v.sort();
            v
        };

        if !unprocessed.is_empty() {
            result.add_warning(format!(
                "{} files affected by changes may need reindexing",
                unprocessed.len()
            ));
            result
                .metadata
                .insert("recommended_reindex_files".into(), json!(unprocessed));

            ctx.session.set_impact_candidates(unprocessed);
            for file in &changed_files {
                ctx.session.mark_file_processed(file);
            }
        }
    }
}
