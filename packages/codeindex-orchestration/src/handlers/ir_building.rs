//! IR building stages (structural + semantic)

use std::sync::Arc;

use codeindex_ir::features::ir::IRBuilder;
use codeindex_ir::features::multi_index::ExternalTypeAnalyzer;
use codeindex_ir::features::parsing::ParserRegistry;
use codeindex_ir::features::semantic_ir::SemanticIrBuilder;

use super::HandlerContext;
use crate::models::{IndexingResult, IndexingStage};
use crate::progress::IndexJobCheckpoint;

pub struct IrBuildingHandler {
    ir_builder: IRBuilder,
    semantic_builder: SemanticIrBuilder,
}

impl IrBuildingHandler {
    pub fn new(
        registry: Arc<ParserRegistry>,
        type_analyzer: Option<Arc<dyn ExternalTypeAnalyzer>>,
    ) -> Self {
        let mut semantic_builder = SemanticIrBuilder::new(registry.clone());
        if let Some(analyzer) = type_analyzer {
            semantic_builder = semantic_builder.with_type_analyzer(analyzer);
        }
        Self {
            ir_builder: IRBuilder::new(registry),
            semantic_builder,
        }
    }

    /// Stage 4: structural IR. Returns false when the document came out
    /// empty despite parsed input (stage-fatal upstream decision is the
    /// orchestrator's).
    pub async fn execute_ir_building(
        &self,
        ctx: &mut HandlerContext,
        result: &mut IndexingResult,
    ) -> bool {
        ctx.report_progress(IndexingStage::IrBuilding, 0.0);

        let (doc, failed) =
            self.ir_builder
                .build_document(&ctx.parsed_files, &ctx.repo_id, &ctx.snapshot_id);

        for (path, error) in failed {
            result.files_failed += 1;
            result.failed_files.push(path.clone());
            if let Some(progress) = &mut ctx.progress {
                progress.mark_file_failed(&path, &error);
            }
        }

        result.ir_nodes_created = doc.nodes.len();
        let produced = !doc.is_empty();
        ctx.ir_doc = Some(doc);

        if let Some(progress) = &mut ctx.progress {
            progress.advance(IndexJobCheckpoint::IrBuildCompleted);
        }
        ctx.persist_progress().await;
        ctx.report_progress(IndexingStage::IrBuilding, 100.0);

        tracing::info!(nodes = result.ir_nodes_created, "ir_building_completed");
        produced
    }

    /// Stage 5: semantic IR (types, signatures, BFG, CFG, expressions, DFG)
    pub async fn execute_semantic_ir_building(
        &self,
        ctx: &mut HandlerContext,
        result: &mut IndexingResult,
    ) -> bool {
        ctx.report_progress(IndexingStage::SemanticIrBuilding, 0.0);

        let ir_doc = match &ctx.ir_doc {
            Some(doc) => doc,
            None => return false,
        };

        match self.semantic_builder.build_full(ir_doc, &ctx.source_map) {
            Ok((snapshot, index)) => {
                if !index.failed_bfg_functions.is_empty() {
                    result.add_warning(format!(
                        "{} functions failed BFG extraction",
                        index.failed_bfg_functions.len()
                    ));
                    result
                        .failed_bfg_functions
                        .extend(index.failed_bfg_functions.iter().cloned());
                }
                if !index.failed_dfg_functions.is_empty() {
                    result.add_warning(format!(
                        "{} functions failed DFG analysis",
                        index.failed_dfg_functions.len()
                    ));
                    result
                        .failed_dfg_functions
                        .extend(index.failed_dfg_functions.iter().cloned());
                }

                ctx.semantic_snapshot = Some(snapshot);
                ctx.semantic_index = Some(index);
                ctx.report_progress(IndexingStage::SemanticIrBuilding, 100.0);
                true
            }
            Err(e) => {
                // Stage-fatal: BFG/CFG corruption must not be persisted
                result.add_error(format!("semantic IR building failed: {}", e));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::session::IndexSessionContext;
    use codeindex_ir::features::parsing::{parse_source, LanguageId, SourceFile};
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;

    fn context_with_file(code: &str) -> HandlerContext {
        let parsed =
            parse_source(&SourceFile::new("a.py", LanguageId::Python, code)).unwrap();
        let mut source_map = HashMap::new();
        source_map.insert("a.py".to_string(), parsed.clone());
        let mut file_texts = HashMap::new();
        file_texts.insert("a.py".to_string(), code.to_string());

        HandlerContext {
            repo_path: std::path::PathBuf::from("/tmp"),
            repo_id: "r".into(),
            snapshot_id: "s".into(),
            config: IndexingConfig::default(),
            incremental: false,
            change_set: None,
            session: IndexSessionContext::new(200),
            cancel: CancellationToken::new(),
            progress: None,
            progress_callback: None,
            progress_store: None,
            parsed_files: vec![parsed],
            source_map,
            file_texts,
            ir_doc: None,
            semantic_snapshot: None,
            semantic_index: None,
            graph_doc: None,
            chunk_ids: Vec::new(),
            deleted_chunk_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_ir_then_semantic() {
        let mut ctx = context_with_file("def f(x):\n    return x + 1\n");
        let mut result = IndexingResult::new("r", "s", false);

        let handler = IrBuildingHandler::new(Arc::new(ParserRegistry::with_defaults()), None);
        assert!(handler.execute_ir_building(&mut ctx, &mut result).await);
        assert!(result.ir_nodes_created > 0);

        assert!(
            handler
                .execute_semantic_ir_building(&mut ctx, &mut result)
                .await
        );
        let snapshot = ctx.semantic_snapshot.as_ref().unwrap();
        assert_eq!(snapshot.cfg_graphs.len(), 1);
        assert!(!snapshot.dfg.variables.is_empty());
    }
}
