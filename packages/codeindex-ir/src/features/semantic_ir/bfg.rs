//! Basic Flow Graph (BFG)
//!
//! Per-function basic blocks without control-flow edges. Block segmentation
//! records the AST metadata (node type, has-alternative) and the control
//! flow flags (is_break / is_continue / is_return, target_loop_id) the CFG
//! layer needs for correct edge emission under nested loops.

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tree_sitter::Node as TSNode;

use crate::features::parsing::{
    ControlFlowType, LanguagePlugin, ParsedFile, ParserRegistry, SourceMap, SpanExt,
};
use crate::shared::models::{IRDocument, IndexError, Node, NodeKind, Result, Span};

/// Default AST cache capacity; sized for mid-size projects
pub const DEFAULT_AST_CACHE_CAPACITY: usize = 100;

/// Basic Flow Graph block types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BfgBlockKind {
    Entry,
    Exit,
    Statement,
    Condition,
    LoopHeader,
    Try,
    Catch,
    Finally,
}

impl BfgBlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BfgBlockKind::Entry => "Entry",
            BfgBlockKind::Exit => "Exit",
            BfgBlockKind::Statement => "Statement",
            BfgBlockKind::Condition => "Condition",
            BfgBlockKind::LoopHeader => "LoopHeader",
            BfgBlockKind::Try => "Try",
            BfgBlockKind::Catch => "Catch",
            BfgBlockKind::Finally => "Finally",
        }
    }
}

/// Basic block: maximal statement sequence with single entry/exit.
///
/// ID format: `bfg:{function_node_id}:block:{index}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicFlowBlock {
    pub id: String,
    pub kind: BfgBlockKind,
    pub function_node_id: String,
    pub span: Option<Span>,

    /// AST metadata for CFG edge generation
    pub ast_node_type: Option<String>,
    pub ast_has_alternative: bool,

    pub statement_count: usize,

    /// Control flow flags; a block "ends with" at most one of these
    pub is_break: bool,
    pub is_continue: bool,
    pub is_return: bool,
    /// For break/continue: the target loop header block ID (nested loops)
    pub target_loop_id: Option<String>,
    /// For LoopHeader blocks: the block ID control reaches after the loop,
    /// if any block was created there (break targets resolve through this)
    pub loop_post_block_id: Option<String>,

    /// Filled by the DFG layer
    pub defined_variable_ids: Vec<String>,
    pub used_variable_ids: Vec<String>,
}

impl BasicFlowBlock {
    fn new(id: String, kind: BfgBlockKind, function_node_id: String) -> Self {
        Self {
            id,
            kind,
            function_node_id,
            span: None,
            ast_node_type: None,
            ast_has_alternative: false,
            statement_count: 0,
            is_break: false,
            is_continue: false,
            is_return: false,
            target_loop_id: None,
            loop_post_block_id: None,
            defined_variable_ids: Vec::new(),
            used_variable_ids: Vec::new(),
        }
    }

    pub fn has_control_flow_exit(&self) -> bool {
        self.is_break || self.is_continue || self.is_return
    }
}

/// Basic Flow Graph for a single function; blocks only, no edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicFlowGraph {
    /// `bfg:{function_node_id}`
    pub id: String,
    pub function_node_id: String,
    pub entry_block_id: String,
    pub exit_block_id: String,
    pub blocks: Vec<BasicFlowBlock>,
    pub total_statements: usize,
}

/// Outcome of a full BFG build
#[derive(Debug, Default)]
pub struct BfgBuildResult {
    pub graphs: Vec<BasicFlowGraph>,
    pub blocks: Vec<BasicFlowBlock>,
    /// Function node IDs that failed block extraction
    pub failed_functions: Vec<String>,
}

/// Builds basic flow blocks from function AST subtrees.
///
/// Keeps an LRU cache of parsed files so repeated builds (incremental
/// deltas) avoid re-parsing; pre-parsed ASTs arrive via the source map.
pub struct BfgBuilder {
    registry: Arc<ParserRegistry>,
    ast_cache: Mutex<LruCache<String, ParsedFile>>,
    cache_hits: Mutex<u64>,
    cache_misses: Mutex<u64>,
}

impl BfgBuilder {
    pub fn new(registry: Arc<ParserRegistry>) -> Self {
        Self::with_cache_capacity(registry, DEFAULT_AST_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(registry: Arc<ParserRegistry>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            registry,
            ast_cache: Mutex::new(LruCache::new(capacity)),
            cache_hits: Mutex::new(0),
            cache_misses: Mutex::new(0),
        }
    }

    pub fn cache_stats(&self) -> (u64, u64) {
        (*self.cache_hits.lock(), *self.cache_misses.lock())
    }

    /// Build BFG for every function and method in the document.
    ///
    /// Per-function failures are recorded, never raised; the caller decides
    /// whether an empty result for a non-empty document is stage-fatal.
    pub fn build_full(&self, ir_doc: &IRDocument, source_map: &SourceMap) -> BfgBuildResult {
        let mut result = BfgBuildResult::default();

        for node in &ir_doc.nodes {
            if !matches!(node.kind, NodeKind::Function | NodeKind::Method) {
                continue;
            }

            match self.build_function(node, source_map) {
                Ok(Some(graph)) => {
                    result.blocks.extend(graph.blocks.iter().cloned());
                    result.graphs.push(graph);
                }
                Ok(None) => {
                    tracing::warn!(function = %node.id, "bfg_function_ast_not_found");
                    result.failed_functions.push(node.id.clone());
                }
                Err(e) => {
                    tracing::warn!(function = %node.id, error = %e, "bfg_function_failed");
                    result.failed_functions.push(node.id.clone());
                }
            }
        }

        result
    }

    fn build_function(
        &self,
        func_node: &Node,
        source_map: &SourceMap,
    ) -> Result<Option<BasicFlowGraph>> {
        let parsed = self.parsed_file(&func_node.file_path, source_map)?;
        let plugin = self
            .registry
            .get_by_file_path(&func_node.file_path)
            .ok_or_else(|| {
                IndexError::flow_analysis("no language plugin").with_file(&func_node.file_path)
            })?;

        let root = parsed.tree.root_node();
        let ast_func = match find_function_node(&root, func_node.span.start_line) {
            Some(n) => n,
            None => return Ok(None),
        };

        let body = match ast_func.child_by_field_name("body") {
            Some(b) => b,
            None => return Ok(None),
        };

        let mut acc = BlockAccumulator::new(plugin, func_node.id.clone());
        acc.push_block(BfgBlockKind::Entry, None);
        acc.visit_block_statements(&body);
        acc.flush(BfgBlockKind::Statement);
        let exit_id = acc.push_block(BfgBlockKind::Exit, None);

        let blocks = acc.blocks;
        let total_statements = blocks.iter().map(|b| b.statement_count).sum();

        Ok(Some(BasicFlowGraph {
            id: format!("bfg:{}", func_node.id),
            function_node_id: func_node.id.clone(),
            entry_block_id: blocks[0].id.clone(),
            exit_block_id: exit_id,
            blocks,
            total_statements,
        }))
    }

    fn parsed_file(&self, file_path: &str, source_map: &SourceMap) -> Result<ParsedFile> {
        if let Some(parsed) = source_map.get(file_path) {
            // Keep the cache warm for delta builds that omit the source map
            self.ast_cache
                .lock()
                .put(file_path.to_string(), parsed.clone());
            return Ok(parsed.clone());
        }

        if let Some(parsed) = self.ast_cache.lock().get(file_path) {
            *self.cache_hits.lock() += 1;
            return Ok(parsed.clone());
        }

        *self.cache_misses.lock() += 1;
        Err(IndexError::flow_analysis("source not available").with_file(file_path))
    }
}

/// Locate a function/method definition by its starting line
fn find_function_node<'a>(root: &TSNode<'a>, start_line: u32) -> Option<TSNode<'a>> {
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        if matches!(
            node.kind(),
            "function_definition" | "function_declaration" | "method_definition"
        ) && node.start_position().row as u32 + 1 == start_line
        {
            return Some(node);
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    None
}

/// Block segmentation state for one function
struct BlockAccumulator<'p> {
    plugin: &'p dyn LanguagePlugin,
    function_node_id: String,
    blocks: Vec<BasicFlowBlock>,
    counter: usize,
    pending: Vec<Span>,
    /// Indices of enclosing LoopHeader blocks, innermost last
    loop_stack: Vec<usize>,
}

impl<'p> BlockAccumulator<'p> {
    fn new(plugin: &'p dyn LanguagePlugin, function_node_id: String) -> Self {
        Self {
            plugin,
            function_node_id,
            blocks: Vec::new(),
            counter: 0,
            pending: Vec::new(),
            loop_stack: Vec::new(),
        }
    }

    fn next_block_id(&self) -> String {
        format!("bfg:{}:block:{}", self.function_node_id, self.counter)
    }

    fn push_block(&mut self, kind: BfgBlockKind, span: Option<Span>) -> String {
        let id = self.next_block_id();
        self.counter += 1;
        let mut block = BasicFlowBlock::new(id.clone(), kind, self.function_node_id.clone());
        block.span = span;
        self.blocks.push(block);
        id
    }

    /// Flush accumulated statement spans into a block of the given kind.
    /// Returns the index of the created block, if any.
    fn flush(&mut self, kind: BfgBlockKind) -> Option<usize> {
        if self.pending.is_empty() {
            return None;
        }

        let first = self.pending.first().copied().unwrap();
        let last = self.pending.last().copied().unwrap();
        let span = Span::new(first.start_line, first.start_col, last.end_line, last.end_col);
        let count = self.pending.len();
        self.pending.clear();

        self.push_block(kind, Some(span));
        let idx = self.blocks.len() - 1;
        self.blocks[idx].statement_count = count;
        Some(idx)
    }

    fn visit_block_statements(&mut self, block_node: &TSNode) {
        let mut cursor = block_node.walk();
        for child in block_node.children(&mut cursor) {
            if self.plugin.is_control_flow_node(&child) {
                self.visit_control_flow(&child);
            } else if self.plugin.is_statement_node(&child) {
                self.pending.push(child.to_span());
            }
        }
    }

    fn visit_control_flow(&mut self, node: &TSNode) {
        let cf_type = match self.plugin.get_control_flow_type(node) {
            Some(t) => t,
            None => return,
        };

        match cf_type {
            ControlFlowType::If => self.process_if(node),
            ControlFlowType::Loop => self.process_loop(node),
            ControlFlowType::Match => self.process_match(node),
            ControlFlowType::Try => self.process_try(node),
            ControlFlowType::Return => self.process_terminator(node, |b| b.is_return = true),
            ControlFlowType::Break => {
                let target = self.innermost_loop_id();
                self.process_terminator(node, move |b| {
                    b.is_break = true;
                    b.target_loop_id = target.clone();
                });
            }
            ControlFlowType::Continue => {
                let target = self.innermost_loop_id();
                self.process_terminator(node, move |b| {
                    b.is_continue = true;
                    b.target_loop_id = target.clone();
                });
            }
            ControlFlowType::Raise => {
                // Raises close their own block; exception edges come from
                // the enclosing try construct
                self.flush(BfgBlockKind::Statement);
                self.pending.push(node.to_span());
                self.flush(BfgBlockKind::Statement);
            }
        }
    }

    fn innermost_loop_id(&self) -> Option<String> {
        self.loop_stack.last().map(|&i| self.blocks[i].id.clone())
    }

    /// A terminator never shares a block with preceding statements: the
    /// accumulated block is flushed first, then the terminator closes its
    /// own block carrying the control flow flag
    fn process_terminator(&mut self, node: &TSNode, mark: impl Fn(&mut BasicFlowBlock)) {
        self.flush(BfgBlockKind::Statement);
        self.pending.push(node.to_span());
        if let Some(idx) = self.flush(BfgBlockKind::Statement) {
            self.blocks[idx].ast_node_type = Some(node.kind().to_string());
            mark(&mut self.blocks[idx]);
        }
    }

    fn process_if(&mut self, node: &TSNode) {
        self.flush(BfgBlockKind::Statement);

        let alternatives = self.plugin.get_control_flow_alternatives(node);
        if let Some(condition) = self.plugin.get_control_flow_condition(node) {
            self.pending.push(condition.to_span());
            if let Some(idx) = self.flush(BfgBlockKind::Condition) {
                self.blocks[idx].ast_node_type = Some(node.kind().to_string());
                self.blocks[idx].ast_has_alternative = !alternatives.is_empty();
            }
        }

        if let Some(consequence) = self.plugin.get_control_flow_body(node) {
            self.visit_block_statements(&consequence);
            self.flush(BfgBlockKind::Statement);
        }

        for alternative in alternatives {
            if self.plugin.is_chained_condition(&alternative) {
                self.visit_control_flow(&alternative);
            } else {
                if let Some(else_body) = self.plugin.get_control_flow_body(&alternative) {
                    self.visit_block_statements(&else_body);
                } else {
                    self.visit_block_statements(&alternative);
                }
                self.flush(BfgBlockKind::Statement);
            }
        }
    }

    fn process_loop(&mut self, node: &TSNode) {
        self.flush(BfgBlockKind::Statement);

        // Loop header: iterator for for-loops, condition for while-loops
        let iterators = self.plugin.get_loop_iterator(node);
        if !iterators.is_empty() {
            for iter_node in iterators {
                self.pending.push(iter_node.to_span());
            }
        } else if let Some(condition) = self.plugin.get_control_flow_condition(node) {
            self.pending.push(condition.to_span());
        } else {
            self.pending.push(node.to_span());
        }

        let header_idx = match self.flush(BfgBlockKind::LoopHeader) {
            Some(idx) => idx,
            None => return,
        };
        self.blocks[header_idx].ast_node_type = Some(node.kind().to_string());

        self.loop_stack.push(header_idx);
        if let Some(body) = self.plugin.get_control_flow_body(node) {
            self.visit_block_statements(&body);
            self.flush(BfgBlockKind::Statement);
        }
        self.loop_stack.pop();

        // Whatever block is created next is where control lands after the
        // loop; the CFG layer resolves break/false-branch targets through
        // this, falling back to the function exit
        self.blocks[header_idx].loop_post_block_id = Some(self.next_block_id());
    }

    fn process_match(&mut self, node: &TSNode) {
        self.flush(BfgBlockKind::Statement);

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if matches!(child.kind(), "case_clause" | "switch_case" | "switch_default") {
                if let Some(body) = self.plugin.get_control_flow_body(&child) {
                    self.visit_block_statements(&body);
                } else {
                    self.visit_block_statements(&child);
                }
                self.flush(BfgBlockKind::Statement);
            }
        }
    }

    fn process_try(&mut self, node: &TSNode) {
        self.flush(BfgBlockKind::Statement);

        if let Some(body) = self.plugin.get_control_flow_body(node) {
            self.visit_block_statements(&body);
            if self.pending.is_empty() {
                // Keep the try block addressable even when its body is all
                // nested control flow
                self.pending.push(body.to_span());
            }
            if let Some(idx) = self.flush(BfgBlockKind::Try) {
                self.blocks[idx].ast_node_type = Some(node.kind().to_string());
            }
        }

        let handlers = self.plugin.get_exception_handlers(node);
        for catch_block in handlers.catch_blocks {
            if let Some(catch_body) = self.plugin.get_control_flow_body(&catch_block) {
                self.visit_block_statements(&catch_body);
                if self.pending.is_empty() {
                    self.pending.push(catch_body.to_span());
                }
            } else {
                self.pending.push(catch_block.to_span());
            }
            self.flush(BfgBlockKind::Catch);
        }

        if let Some(finally_block) = handlers.finally_block {
            if let Some(finally_body) = self.plugin.get_control_flow_body(&finally_block) {
                self.visit_block_statements(&finally_body);
                if self.pending.is_empty() {
                    self.pending.push(finally_body.to_span());
                }
            }
            self.flush(BfgBlockKind::Finally);
        }
    }
}
