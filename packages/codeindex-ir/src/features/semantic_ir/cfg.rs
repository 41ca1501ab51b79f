//! Control Flow Graph (CFG)
//!
//! Adds typed control-flow edges to BFG blocks. Block segmentation stays in
//! the BFG layer; this layer only emits edges. CFG block IDs mirror BFG
//! block IDs with the `cfg:` prefix.

use serde::{Deserialize, Serialize};

use super::bfg::{BasicFlowBlock, BasicFlowGraph, BfgBlockKind};
use crate::shared::models::{IndexError, Result, Span};
use crate::shared::utils::id_gen::bfg_id_to_cfg_id;

/// Control Flow Graph block types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CfgBlockKind {
    Entry,
    Exit,
    Block,
    Condition,
    LoopHeader,
    Try,
    Catch,
    Finally,
}

impl CfgBlockKind {
    fn from_bfg(kind: BfgBlockKind) -> Self {
        match kind {
            BfgBlockKind::Entry => CfgBlockKind::Entry,
            BfgBlockKind::Exit => CfgBlockKind::Exit,
            BfgBlockKind::Statement => CfgBlockKind::Block,
            BfgBlockKind::Condition => CfgBlockKind::Condition,
            BfgBlockKind::LoopHeader => CfgBlockKind::LoopHeader,
            BfgBlockKind::Try => CfgBlockKind::Try,
            BfgBlockKind::Catch => CfgBlockKind::Catch,
            BfgBlockKind::Finally => CfgBlockKind::Finally,
        }
    }
}

/// Control flow edge types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CfgEdgeKind {
    Normal,
    TrueBranch,
    FalseBranch,
    Exception,
    LoopBack,
    Break,
    Continue,
    Return,
}

/// CFG basic block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFlowBlock {
    /// e.g. `cfg:func:repo:a.py:f:1:block:2`
    pub id: String,
    pub kind: CfgBlockKind,
    pub function_node_id: String,
    pub span: Option<Span>,
}

/// CFG edge between blocks of the same function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFlowEdge {
    pub source_block_id: String,
    pub target_block_id: String,
    pub kind: CfgEdgeKind,
}

/// Control Flow Graph for a single function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    /// `cfg:{function_node_id}`
    pub id: String,
    pub function_node_id: String,
    pub entry_block_id: String,
    pub exit_block_id: String,
    pub blocks: Vec<ControlFlowBlock>,
    pub edges: Vec<ControlFlowEdge>,
}

/// Builds CFGs from BFG graphs.
pub struct CfgBuilder;

impl CfgBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Convert every BFG graph into a CFG.
    ///
    /// A non-empty BFG producing zero CFGs is a hard error: silently
    /// continuing would persist graphs with missing control flow.
    pub fn build_from_bfg(
        &self,
        bfg_graphs: &[BasicFlowGraph],
    ) -> Result<(Vec<ControlFlowGraph>, Vec<ControlFlowBlock>, Vec<ControlFlowEdge>)> {
        let mut cfg_graphs = Vec::new();
        let mut all_blocks = Vec::new();
        let mut all_edges = Vec::new();

        for bfg_graph in bfg_graphs {
            if let Some(graph) = self.build_function_cfg(bfg_graph) {
                all_blocks.extend(graph.blocks.iter().cloned());
                all_edges.extend(graph.edges.iter().cloned());
                cfg_graphs.push(graph);
            } else {
                tracing::warn!(function = %bfg_graph.function_node_id, "cfg_conversion_failed");
            }
        }

        if !bfg_graphs.is_empty() && cfg_graphs.is_empty() {
            return Err(IndexError::flow_analysis(format!(
                "CFG conversion produced no graphs from {} BFG graphs",
                bfg_graphs.len()
            )));
        }

        Ok((cfg_graphs, all_blocks, all_edges))
    }

    fn build_function_cfg(&self, bfg_graph: &BasicFlowGraph) -> Option<ControlFlowGraph> {
        let blocks: Vec<ControlFlowBlock> = bfg_graph
            .blocks
            .iter()
            .map(|b| ControlFlowBlock {
                id: bfg_id_to_cfg_id(&b.id),
                kind: CfgBlockKind::from_bfg(b.kind),
                function_node_id: bfg_graph.function_node_id.clone(),
                span: b.span,
            })
            .collect();

        let entry = blocks.iter().find(|b| b.kind == CfgBlockKind::Entry)?;
        let exit = blocks.iter().find(|b| b.kind == CfgBlockKind::Exit)?;
        let entry_id = entry.id.clone();
        let exit_id = exit.id.clone();

        let edges = EdgeEmitter::new(&blocks, &bfg_graph.blocks, exit_id.clone()).emit(&entry_id);

        Some(ControlFlowGraph {
            id: format!("cfg:{}", bfg_graph.function_node_id),
            function_node_id: bfg_graph.function_node_id.clone(),
            entry_block_id: entry_id,
            exit_block_id: exit_id,
            blocks,
            edges,
        })
    }
}

/// Edge emission over the paired (CFG, BFG) body blocks.
///
/// Edges are only ever emitted between blocks of the same function; both
/// inputs come from a single BFG graph.
struct EdgeEmitter<'a> {
    body: Vec<(&'a ControlFlowBlock, &'a BasicFlowBlock)>,
    exit_id: String,
    edges: Vec<ControlFlowEdge>,
}

impl<'a> EdgeEmitter<'a> {
    fn new(
        cfg_blocks: &'a [ControlFlowBlock],
        bfg_blocks: &'a [BasicFlowBlock],
        exit_id: String,
    ) -> Self {
        let body = cfg_blocks
            .iter()
            .zip(bfg_blocks.iter())
            .filter(|(c, _)| !matches!(c.kind, CfgBlockKind::Entry | CfgBlockKind::Exit))
            .collect();
        Self {
            body,
            exit_id,
            edges: Vec::new(),
        }
    }

    fn emit(mut self, entry_id: &str) -> Vec<ControlFlowEdge> {
        if self.body.is_empty() {
            self.push(entry_id, &self.exit_id.clone(), CfgEdgeKind::Normal);
            return self.edges;
        }

        self.push(entry_id, &self.body[0].0.id.clone(), CfgEdgeKind::Normal);

        for i in 0..self.body.len() {
            let (block, bfg_block) = self.body[i];
            let next_id = self.next_id(i);

            match block.kind {
                CfgBlockKind::Condition => self.emit_condition(i, bfg_block, &next_id),
                CfgBlockKind::LoopHeader => self.emit_loop(i, bfg_block),
                CfgBlockKind::Try => self.emit_try(i, &next_id),
                CfgBlockKind::Catch | CfgBlockKind::Finally => {
                    self.push(&block.id.clone(), &next_id, CfgEdgeKind::Normal);
                }
                _ => self.emit_statement(i, bfg_block, &next_id),
            }
        }

        self.edges
    }

    fn next_id(&self, i: usize) -> String {
        if i + 1 < self.body.len() {
            self.body[i + 1].0.id.clone()
        } else {
            self.exit_id.clone()
        }
    }

    fn id_at(&self, i: usize) -> Option<String> {
        self.body.get(i).map(|(c, _)| c.id.clone())
    }

    fn push(&mut self, source: &str, target: &str, kind: CfgEdgeKind) {
        self.edges.push(ControlFlowEdge {
            source_block_id: source.to_string(),
            target_block_id: target.to_string(),
            kind,
        });
    }

    /// CONDITION: TRUE_BRANCH to the consequence, FALSE_BRANCH to the
    /// alternative or the first post-branch block
    fn emit_condition(&mut self, i: usize, _bfg_block: &BasicFlowBlock, next_id: &str) {
        let source = self.body[i].0.id.clone();

        if let Some(true_target) = self.id_at(i + 1) {
            self.push(&source, &true_target, CfgEdgeKind::TrueBranch);
        } else {
            self.push(&source, next_id, CfgEdgeKind::TrueBranch);
            return;
        }

        let false_target = self.id_at(i + 2).unwrap_or_else(|| self.exit_id.clone());
        self.push(&source, &false_target, CfgEdgeKind::FalseBranch);
    }

    /// LOOP_HEADER: TRUE_BRANCH into the body, FALSE_BRANCH to the post-loop
    /// block, LOOP_BACK from the body only when the body block carries no
    /// break/continue/return
    fn emit_loop(&mut self, i: usize, bfg_block: &BasicFlowBlock) {
        let source = self.body[i].0.id.clone();

        if let Some((body_cfg, body_bfg)) = self.body.get(i + 1).copied() {
            let body_id = body_cfg.id.clone();
            self.push(&source, &body_id, CfgEdgeKind::TrueBranch);

            if !body_bfg.has_control_flow_exit() {
                self.push(&body_id, &source, CfgEdgeKind::LoopBack);
            }
        }

        let post = self.resolve_loop_post(bfg_block);
        self.push(&source, &post, CfgEdgeKind::FalseBranch);
    }

    /// TRY: NORMAL to the body continuation, EXCEPTION to each catch block
    /// in lexical order
    fn emit_try(&mut self, i: usize, next_id: &str) {
        let source = self.body[i].0.id.clone();
        self.push(&source, next_id, CfgEdgeKind::Normal);

        for j in (i + 1)..self.body.len() {
            match self.body[j].0.kind {
                CfgBlockKind::Catch => {
                    let target = self.body[j].0.id.clone();
                    self.push(&source, &target, CfgEdgeKind::Exception);
                }
                CfgBlockKind::Finally => continue,
                _ => break,
            }
        }
    }

    /// Statement blocks: break/continue/return divert, everything else
    /// falls through
    fn emit_statement(&mut self, i: usize, bfg_block: &BasicFlowBlock, next_id: &str) {
        let source = self.body[i].0.id.clone();

        if bfg_block.is_break {
            let target = bfg_block
                .target_loop_id
                .as_deref()
                .and_then(|loop_id| self.find_bfg_block(loop_id))
                .map(|header| self.resolve_loop_post(header))
                .unwrap_or_else(|| self.exit_id.clone());
            self.push(&source, &target, CfgEdgeKind::Break);
        } else if bfg_block.is_continue {
            let target = bfg_block
                .target_loop_id
                .as_deref()
                .map(bfg_id_to_cfg_id)
                .filter(|id| self.body.iter().any(|(c, _)| &c.id == id));
            match target {
                Some(header_id) => self.push(&source, &header_id, CfgEdgeKind::Continue),
                None => self.push(&source, next_id, CfgEdgeKind::Normal),
            }
        } else if bfg_block.is_return {
            self.push(&source, &self.exit_id.clone(), CfgEdgeKind::Return);
        } else {
            self.push(&source, next_id, CfgEdgeKind::Normal);
        }
    }

    fn find_bfg_block(&self, bfg_id: &str) -> Option<&'a BasicFlowBlock> {
        self.body
            .iter()
            .find(|(_, b)| b.id == bfg_id)
            .map(|(_, b)| *b)
    }

    /// Loop post-exit: the block recorded at segmentation time if it exists,
    /// otherwise the function exit
    fn resolve_loop_post(&self, header: &BasicFlowBlock) -> String {
        header
            .loop_post_block_id
            .as_deref()
            .map(bfg_id_to_cfg_id)
            .filter(|id| self.body.iter().any(|(c, _)| &c.id == id))
            .unwrap_or_else(|| self.exit_id.clone())
    }
}
