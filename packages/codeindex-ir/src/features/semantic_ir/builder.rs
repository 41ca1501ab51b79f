//! Semantic IR builder
//!
//! Composes the type, signature, BFG, CFG, expression, and DFG builders
//! over a structural IR document. Exposes `build_full` and an idempotent
//! `apply_delta` for incremental updates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::bfg::{BasicFlowBlock, BasicFlowGraph, BfgBuilder};
use super::cfg::{CfgBuilder, ControlFlowBlock, ControlFlowEdge, ControlFlowGraph};
use super::expression::{Expression, ExpressionBuilder};
use super::signature::{SignatureEntity, SignatureIndex, SignatureIrBuilder};
use super::types::{TypeEntity, TypeIrBuilder};
use crate::features::data_flow::{DfgBuilder, DfgSnapshot};
use crate::features::multi_index::ports::ExternalTypeAnalyzer;
use crate::features::parsing::{ParserRegistry, SourceMap};
use crate::shared::models::{IRDocument, IndexError, Result};
use crate::shared::utils::id_gen::extract_file_path;

/// Everything the semantic layer produces for one document
#[derive(Debug, Clone, Default)]
pub struct SemanticIrSnapshot {
    pub types: Vec<TypeEntity>,
    pub signatures: Vec<SignatureEntity>,
    pub bfg_graphs: Vec<BasicFlowGraph>,
    pub bfg_blocks: Vec<BasicFlowBlock>,
    pub cfg_graphs: Vec<ControlFlowGraph>,
    pub cfg_blocks: Vec<ControlFlowBlock>,
    pub cfg_edges: Vec<ControlFlowEdge>,
    pub expressions: Vec<Expression>,
    pub dfg: DfgSnapshot,
}

/// Lookup structures and per-function failure lists
#[derive(Debug, Clone, Default)]
pub struct SemanticIndex {
    pub signature_index: SignatureIndex,
    pub failed_bfg_functions: Vec<String>,
    pub failed_dfg_functions: Vec<String>,
    /// block_id → (defined_variable_ids, used_variable_ids)
    pub block_variables: HashMap<String, (Vec<String>, Vec<String>)>,
}

/// Composes the five semantic builders.
pub struct SemanticIrBuilder {
    type_builder: TypeIrBuilder,
    signature_builder: SignatureIrBuilder,
    bfg_builder: BfgBuilder,
    cfg_builder: CfgBuilder,
    expression_builder: ExpressionBuilder,
}

impl SemanticIrBuilder {
    pub fn new(registry: Arc<ParserRegistry>) -> Self {
        Self {
            type_builder: TypeIrBuilder::new(),
            signature_builder: SignatureIrBuilder::new(),
            bfg_builder: BfgBuilder::new(registry),
            cfg_builder: CfgBuilder::new(),
            expression_builder: ExpressionBuilder::new(),
        }
    }

    pub fn with_type_analyzer(mut self, analyzer: Arc<dyn ExternalTypeAnalyzer>) -> Self {
        self.expression_builder = self.expression_builder.with_type_analyzer(analyzer);
        self
    }

    /// Build the full semantic IR for a document.
    ///
    /// Stage-fatal conditions (blocks without graphs, empty CFG from a
    /// non-empty BFG) return errors; per-function failures are collected
    /// into the index.
    pub fn build_full(
        &self,
        ir_doc: &IRDocument,
        source_map: &SourceMap,
    ) -> Result<(SemanticIrSnapshot, SemanticIndex)> {
        let types = self.type_builder.build_full(ir_doc);
        let (signatures, signature_index) = self.signature_builder.build_full(ir_doc);

        let bfg = self.bfg_builder.build_full(ir_doc, source_map);
        if bfg.graphs.is_empty() && !bfg.blocks.is_empty() {
            return Err(IndexError::flow_analysis(format!(
                "BFG produced {} orphaned blocks without graphs",
                bfg.blocks.len()
            )));
        }

        let (cfg_graphs, cfg_blocks, cfg_edges) = self.cfg_builder.build_from_bfg(&bfg.graphs)?;

        let expressions = self
            .expression_builder
            .build_full(ir_doc, &bfg.graphs, source_map);

        let mut dfg_builder = DfgBuilder::new();
        let dfg_output = dfg_builder.build_full(ir_doc, &bfg.blocks, &expressions);

        let snapshot = SemanticIrSnapshot {
            types,
            signatures,
            bfg_graphs: bfg.graphs,
            bfg_blocks: bfg.blocks,
            cfg_graphs,
            cfg_blocks,
            cfg_edges,
            expressions,
            dfg: dfg_output.snapshot,
        };

        let index = SemanticIndex {
            signature_index,
            failed_bfg_functions: bfg.failed_functions,
            failed_dfg_functions: dfg_output.failed_functions,
            block_variables: dfg_output.block_variables,
        };

        Ok((snapshot, index))
    }

    /// Incremental update: rebuild semantics for the files covered by
    /// `new_ir`, keep everything else from `old`. Applying the same delta
    /// twice yields the same snapshot.
    pub fn apply_delta(
        &self,
        old: &SemanticIrSnapshot,
        new_ir: &IRDocument,
        source_map: &SourceMap,
    ) -> Result<(SemanticIrSnapshot, SemanticIndex)> {
        let changed_files: HashSet<&str> =
            new_ir.nodes.iter().map(|n| n.file_path.as_str()).collect();

        let (new_snapshot, index) = self.build_full(new_ir, source_map)?;

        let in_changed_file =
            |function_node_id: &str| -> bool {
                extract_file_path(function_node_id)
                    .map(|f| changed_files.contains(f.as_str()))
                    .unwrap_or(false)
            };

        let mut merged = SemanticIrSnapshot::default();

        // Kept (unchanged-file) entries first, then the rebuilt ones
        merged.bfg_graphs = old
            .bfg_graphs
            .iter()
            .filter(|g| !in_changed_file(&g.function_node_id))
            .cloned()
            .chain(new_snapshot.bfg_graphs)
            .collect();
        merged.bfg_blocks = old
            .bfg_blocks
            .iter()
            .filter(|b| !in_changed_file(&b.function_node_id))
            .cloned()
            .chain(new_snapshot.bfg_blocks)
            .collect();
        merged.cfg_graphs = old
            .cfg_graphs
            .iter()
            .filter(|g| !in_changed_file(&g.function_node_id))
            .cloned()
            .chain(new_snapshot.cfg_graphs)
            .collect();
        merged.cfg_blocks = old
            .cfg_blocks
            .iter()
            .filter(|b| !in_changed_file(&b.function_node_id))
            .cloned()
            .chain(new_snapshot.cfg_blocks)
            .collect();
        merged.cfg_edges = old
            .cfg_edges
            .iter()
            .filter(|e| {
                // Edge endpoints always share a function; source decides
                let bfg_id = crate::shared::utils::id_gen::cfg_id_to_bfg_id(&e.source_block_id);
                let func = bfg_id
                    .strip_prefix("bfg:")
                    .and_then(|rest| rest.split(":block:").next())
                    .unwrap_or("");
                !in_changed_file(func)
            })
            .cloned()
            .chain(new_snapshot.cfg_edges)
            .collect();
        merged.expressions = old
            .expressions
            .iter()
            .filter(|e| !changed_files.contains(e.file_path.as_str()))
            .cloned()
            .chain(new_snapshot.expressions)
            .collect();

        merged.dfg.variables = old
            .dfg
            .variables
            .iter()
            .filter(|v| !changed_files.contains(v.file_path.as_str()))
            .cloned()
            .chain(new_snapshot.dfg.variables)
            .collect();
        merged.dfg.events = old
            .dfg
            .events
            .iter()
            .filter(|e| !changed_files.contains(e.file_path.as_str()))
            .cloned()
            .chain(new_snapshot.dfg.events)
            .collect();
        merged.dfg.edges = old
            .dfg
            .edges
            .iter()
            .filter(|e| !changed_files.contains(e.file_path.as_str()))
            .cloned()
            .chain(new_snapshot.dfg.edges)
            .collect();

        // Types and signatures merge by ID, new entries win
        let mut types: HashMap<String, TypeEntity> = old
            .types
            .iter()
            .map(|t| (t.id.clone(), t.clone()))
            .collect();
        for t in new_snapshot.types {
            types.insert(t.id.clone(), t);
        }
        let mut sorted_types: Vec<TypeEntity> = types.into_values().collect();
        sorted_types.sort_by(|a, b| a.id.cmp(&b.id));
        merged.types = sorted_types;

        let mut signatures: HashMap<String, SignatureEntity> = old
            .signatures
            .iter()
            .filter(|s| {
                !in_changed_file(&s.owner_node_id)
            })
            .map(|s| (s.id.clone(), s.clone()))
            .collect();
        for s in new_snapshot.signatures {
            signatures.insert(s.id.clone(), s);
        }
        let mut sorted_sigs: Vec<SignatureEntity> = signatures.into_values().collect();
        sorted_sigs.sort_by(|a, b| a.id.cmp(&b.id));
        merged.signatures = sorted_sigs;

        Ok((merged, index))
    }
}
