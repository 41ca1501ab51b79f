//! Expression IR
//!
//! Value-level entities tied to CFG blocks. Expressions carry the
//! reads/defines information the DFG layer consumes; the DFG never touches
//! the AST.
//!
//! Statement analyzers are pluggable per language via a registry, mirroring
//! the parser plugins.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tree_sitter::Node as TSNode;

use super::bfg::{BasicFlowGraph, BfgBlockKind};
use crate::features::multi_index::ports::ExternalTypeAnalyzer;
use crate::features::parsing::{LanguageId, ParsedFile, SourceMap};
use crate::shared::models::Span;

/// Expression types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprKind {
    NameLoad,
    Attribute,
    Subscript,
    BinOp,
    UnaryOp,
    Compare,
    BoolOp,
    Call,
    Instantiate,
    Literal,
    Collection,
    Assign,
    Lambda,
    Comprehension,
}

/// Expression entity (value-level node for DFG)
///
/// ID format: `expr:{repo_id}:{file_path}:{line}:{col}[:{n}]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub id: String,
    pub kind: ExprKind,
    pub repo_id: String,
    pub file_path: String,
    /// None for module-level expressions
    pub function_fqn: Option<String>,
    pub span: Span,

    /// Variable names read by this expression
    pub reads_vars: Vec<String>,
    /// Variable name written by this expression (assignment targets)
    pub defines_var: Option<String>,

    pub inferred_type: Option<String>,

    /// Expression tree
    pub parent_expr_id: Option<String>,
    pub child_expr_ids: Vec<String>,

    /// BFG block this expression belongs to
    pub block_id: Option<String>,

    /// Kind-specific attributes: callee_name, call_args, is_return,
    /// has_call_rhs, attr_name, value_type, ...
    #[serde(default)]
    pub attrs: HashMap<String, Value>,
}

impl Expression {
    pub fn is_return(&self) -> bool {
        self.attrs
            .get("is_return")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn call_args(&self) -> Vec<String> {
        self.attrs
            .get("call_args")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn callee_name(&self) -> Option<&str> {
        self.attrs.get("callee_name").and_then(|v| v.as_str())
    }

    pub fn has_call_rhs(&self) -> bool {
        self.attrs
            .get("has_call_rhs")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Per-language statement analysis capability
pub trait StatementAnalyzer: Send + Sync {
    fn language_id(&self) -> LanguageId;

    /// Extract expressions (with reads/writes) from one statement subtree
    fn analyze_statement(&self, stmt: &TSNode, ctx: &mut ExprCtx);
}

/// Mutable extraction context for one function
pub struct ExprCtx<'a> {
    pub repo_id: &'a str,
    pub file_path: &'a str,
    pub function_fqn: Option<String>,
    pub block_id: Option<String>,
    pub source: &'a str,
    pub expressions: Vec<Expression>,
    seen_ids: HashSet<String>,
}

impl<'a> ExprCtx<'a> {
    pub fn new(repo_id: &'a str, file_path: &'a str, source: &'a str) -> Self {
        Self {
            repo_id,
            file_path,
            function_fqn: None,
            block_id: None,
            source,
            expressions: Vec::new(),
            seen_ids: HashSet::new(),
        }
    }

    pub fn text(&self, node: &TSNode) -> &str {
        self.source.get(node.byte_range()).unwrap_or("")
    }

    fn alloc_id(&mut self, span: &Span) -> String {
        let base = format!(
            "expr:{}:{}:{}:{}",
            self.repo_id, self.file_path, span.start_line, span.start_col
        );
        if self.seen_ids.insert(base.clone()) {
            return base;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}:{}", base, n);
            if self.seen_ids.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Create and register an expression, returning its ID
    pub fn emit(
        &mut self,
        kind: ExprKind,
        span: Span,
        reads_vars: Vec<String>,
        parent: Option<&str>,
    ) -> String {
        let id = self.alloc_id(&span);
        let expr = Expression {
            id: id.clone(),
            kind,
            repo_id: self.repo_id.to_string(),
            file_path: self.file_path.to_string(),
            function_fqn: self.function_fqn.clone(),
            span,
            reads_vars,
            defines_var: None,
            inferred_type: None,
            parent_expr_id: parent.map(String::from),
            child_expr_ids: Vec::new(),
            block_id: self.block_id.clone(),
            attrs: HashMap::new(),
        };
        if let Some(parent_id) = parent {
            if let Some(p) = self.expressions.iter_mut().rfind(|e| e.id == parent_id) {
                p.child_expr_ids.push(id.clone());
            }
        }
        self.expressions.push(expr);
        id
    }

    pub fn last_mut(&mut self, id: &str) -> Option<&mut Expression> {
        self.expressions.iter_mut().rfind(|e| e.id == id)
    }
}

fn node_span(node: &TSNode) -> Span {
    Span::new(
        node.start_position().row as u32 + 1,
        node.start_position().column as u32,
        node.end_position().row as u32 + 1,
        node.end_position().column as u32,
    )
}

/// Builds Expression IR per function from BFG blocks and the AST.
pub struct ExpressionBuilder {
    analyzers: HashMap<LanguageId, Box<dyn StatementAnalyzer>>,
    type_analyzer: Option<Arc<dyn ExternalTypeAnalyzer>>,
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        let mut analyzers: HashMap<LanguageId, Box<dyn StatementAnalyzer>> = HashMap::new();
        analyzers.insert(LanguageId::Python, Box::new(PythonStatementAnalyzer));
        Self {
            analyzers,
            type_analyzer: None,
        }
    }

    pub fn with_type_analyzer(mut self, analyzer: Arc<dyn ExternalTypeAnalyzer>) -> Self {
        self.type_analyzer = Some(analyzer);
        self
    }

    pub fn register_analyzer(&mut self, analyzer: Box<dyn StatementAnalyzer>) {
        self.analyzers.insert(analyzer.language_id(), analyzer);
    }

    /// Build expressions for every function with a BFG graph.
    pub fn build_full(
        &self,
        ir_doc: &crate::shared::models::IRDocument,
        bfg_graphs: &[BasicFlowGraph],
        source_map: &SourceMap,
    ) -> Vec<Expression> {
        let mut all = Vec::new();
        let nodes_by_id: HashMap<&str, &crate::shared::models::Node> =
            ir_doc.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        for graph in bfg_graphs {
            let func_node = match nodes_by_id.get(graph.function_node_id.as_str()) {
                Some(n) => *n,
                None => continue,
            };
            let parsed = match source_map.get(&func_node.file_path) {
                Some(p) => p,
                None => continue,
            };
            let analyzer = match self.analyzers.get(&parsed.source.language) {
                Some(a) => a.as_ref(),
                None => continue,
            };

            let exprs = self.build_function(&ir_doc.repo_id, func_node, graph, parsed, analyzer);
            all.extend(exprs);
        }

        if let Some(type_analyzer) = &self.type_analyzer {
            enrich_types(&mut all, type_analyzer.as_ref());
        }

        all
    }

    fn build_function(
        &self,
        repo_id: &str,
        func_node: &crate::shared::models::Node,
        graph: &BasicFlowGraph,
        parsed: &ParsedFile,
        analyzer: &dyn StatementAnalyzer,
    ) -> Vec<Expression> {
        let source = parsed.text().to_string();
        let mut ctx = ExprCtx::new(repo_id, parsed.file_path(), &source);
        ctx.function_fqn = Some(func_node.fqn.clone());

        // Narrowest-span block lookup for statement placement
        let blocks: Vec<(&str, Span)> = graph
            .blocks
            .iter()
            .filter(|b| !matches!(b.kind, BfgBlockKind::Entry | BfgBlockKind::Exit))
            .filter_map(|b| b.span.map(|s| (b.id.as_str(), s)))
            .collect();

        let root = parsed.tree.root_node();
        let func_ast = match find_subtree_at_line(&root, func_node.span.start_line) {
            Some(n) => n,
            None => return Vec::new(),
        };
        let body = match func_ast.child_by_field_name("body") {
            Some(b) => b,
            None => return Vec::new(),
        };

        let mut statements = Vec::new();
        collect_statements(&body, &mut statements);

        for stmt in statements {
            let stmt_span = node_span(&stmt);
            ctx.block_id = narrowest_block(&blocks, stmt_span.start_line);
            analyzer.analyze_statement(&stmt, &mut ctx);
        }

        ctx.expressions
    }
}

/// Statements in source order, skipping nested function/class scopes
/// (those produce their own expression sets)
fn collect_statements<'a>(body: &TSNode<'a>, out: &mut Vec<TSNode<'a>>) {
    let mut cursor = body.walk();
    for child in body.children(&mut cursor) {
        match child.kind() {
            "function_definition" | "class_definition" | "decorated_definition" => continue,
            "expression_statement" | "return_statement" | "augmented_assignment"
            | "assert_statement" | "delete_statement" | "raise_statement" => out.push(child),
            "if_statement" | "elif_clause" | "else_clause" | "for_statement"
            | "while_statement" | "try_statement" | "with_statement" | "except_clause"
            | "finally_clause" | "block" | "match_statement" | "case_clause" => {
                // Conditions and iterators are expressions owned by their
                // Condition/LoopHeader blocks
                if let Some(cond) = child.child_by_field_name("condition") {
                    out.push(cond);
                }
                if child.kind() == "for_statement" {
                    if let Some(right) = child.child_by_field_name("right") {
                        out.push(right);
                    }
                }
                collect_statements(&child, out);
            }
            _ => {}
        }
    }
}

fn narrowest_block(blocks: &[(&str, Span)], line: u32) -> Option<String> {
    blocks
        .iter()
        .filter(|(_, span)| span.contains_line(line))
        .min_by_key(|(_, span)| span.line_count())
        .map(|(id, _)| id.to_string())
}

fn find_subtree_at_line<'a>(root: &TSNode<'a>, start_line: u32) -> Option<TSNode<'a>> {
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

/// Batch type enrichment through the external analyzer, one query per
/// unique position
fn enrich_types(expressions: &mut [Expression], analyzer: &dyn ExternalTypeAnalyzer) {
    let mut by_position: HashMap<(String, u32, u32), Vec<usize>> = HashMap::new();
    for (i, expr) in expressions.iter().enumerate() {
        if matches!(expr.kind, ExprKind::NameLoad | ExprKind::Attribute | ExprKind::Call) {
            by_position
                .entry((expr.file_path.clone(), expr.span.start_line, expr.span.start_col))
                .or_default()
                .push(i);
        }
    }

    for ((file, line, col), indices) in by_position {
        match analyzer.hover(&file, line, col) {
            Ok(Some(hover)) => {
                for i in indices {
                    expressions[i].inferred_type = Some(hover.type_name.clone());
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(file = %file, line, col, error = %e, "type_enrichment_failed");
            }
        }
    }
}

// ============================================================
// Python statement analyzer
// ============================================================

pub struct PythonStatementAnalyzer;

impl StatementAnalyzer for PythonStatementAnalyzer {
    fn language_id(&self) -> LanguageId {
        LanguageId::Python
    }

    fn analyze_statement(&self, stmt: &TSNode, ctx: &mut ExprCtx) {
        match stmt.kind() {
            "expression_statement" => {
                let mut cursor = stmt.walk();
                for child in stmt.children(&mut cursor) {
                    match child.kind() {
                        "assignment" => self.handle_assignment(&child, ctx),
                        "augmented_assignment" => self.handle_augmented(&child, ctx),
                        _ => {
                            self.walk_expr(&child, ctx, None);
                        }
                    }
                }
            }
            "augmented_assignment" => self.handle_augmented(stmt, ctx),
            "return_statement" => self.handle_return(stmt, ctx),
            "assert_statement" | "delete_statement" | "raise_statement" => {
                let mut cursor = stmt.walk();
                for child in stmt.children(&mut cursor) {
                    if child.is_named() {
                        self.walk_expr(&child, ctx, None);
                    }
                }
            }
            _ => {
                self.walk_expr(stmt, ctx, None);
            }
        }
    }
}

/// Walk outcome for one subtree
struct WalkResult {
    reads: Vec<String>,
    expr_ids: Vec<String>,
    has_call: bool,
}

impl WalkResult {
    fn empty() -> Self {
        Self {
            reads: Vec::new(),
            expr_ids: Vec::new(),
            has_call: false,
        }
    }

    fn merge(&mut self, other: WalkResult) {
        self.reads.extend(other.reads);
        self.expr_ids.extend(other.expr_ids);
        self.has_call |= other.has_call;
    }
}

impl PythonStatementAnalyzer {
    /// Simple assignment `x = e`: the left side becomes an Assign expression
    /// with `defines_var = x` and reads copied from the right side. Tuple
    /// unpacking creates one Assign per target, all sharing the reads.
    fn handle_assignment(&self, node: &TSNode, ctx: &mut ExprCtx) {
        let left = node.child_by_field_name("left");
        let right = node.child_by_field_name("right");

        let rhs = match &right {
            Some(r) => self.walk_expr(r, ctx, None),
            None => WalkResult::empty(),
        };

        let left = match left {
            Some(l) => l,
            None => return,
        };

        match left.kind() {
            "identifier" => {
                self.emit_assign(&left, &rhs, ctx);
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" => {
                let mut cursor = left.walk();
                for target in left.children(&mut cursor) {
                    if target.kind() == "identifier" {
                        self.emit_assign(&target, &rhs, ctx);
                    }
                }
            }
            _ => {
                // Attribute/subscript target: record as a write-target access
                let result = self.walk_expr(&left, ctx, None);
                if let Some(id) = result.expr_ids.first() {
                    if let Some(expr) = ctx.last_mut(id) {
                        expr.attrs.insert("is_write_target".into(), json!(true));
                    }
                }
            }
        }
    }

    fn emit_assign(&self, target: &TSNode, rhs: &WalkResult, ctx: &mut ExprCtx) {
        let name = ctx.text(target).to_string();
        if name.is_empty() {
            return;
        }
        let id = ctx.emit(ExprKind::Assign, node_span(target), rhs.reads.clone(), None);
        if let Some(expr) = ctx.last_mut(&id) {
            expr.defines_var = Some(name);
            if rhs.has_call {
                expr.attrs.insert("has_call_rhs".into(), json!(true));
            }
        }
    }

    /// Augmented assignment `x += e`: the target is both read and written
    fn handle_augmented(&self, node: &TSNode, ctx: &mut ExprCtx) {
        let rhs = match node.child_by_field_name("right") {
            Some(r) => self.walk_expr(&r, ctx, None),
            None => WalkResult::empty(),
        };

        if let Some(left) = node.child_by_field_name("left") {
            if left.kind() == "identifier" {
                let name = ctx.text(&left).to_string();
                let mut reads = rhs.reads.clone();
                reads.push(name.clone());
                let id = ctx.emit(ExprKind::Assign, node_span(&left), reads, None);
                if let Some(expr) = ctx.last_mut(&id) {
                    expr.defines_var = Some(name);
                    if rhs.has_call {
                        expr.attrs.insert("has_call_rhs".into(), json!(true));
                    }
                }
            }
        }
    }

    /// Return statements tag every produced expression with
    /// `attrs.is_return = true`; the DFG layer turns NameLoad reads into
    /// `return_value` edges.
    fn handle_return(&self, node: &TSNode, ctx: &mut ExprCtx) {
        let before = ctx.expressions.len();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.is_named() {
                self.walk_expr(&child, ctx, None);
            }
        }
        for expr in ctx.expressions.iter_mut().skip(before) {
            expr.attrs.insert("is_return".into(), json!(true));
        }
    }

    fn walk_expr(&self, node: &TSNode, ctx: &mut ExprCtx, parent: Option<&str>) -> WalkResult {
        let span = node_span(node);
        match node.kind() {
            "identifier" => {
                let name = ctx.text(node).to_string();
                let id = ctx.emit(ExprKind::NameLoad, span, vec![name.clone()], parent);
                WalkResult {
                    reads: vec![name],
                    expr_ids: vec![id],
                    has_call: false,
                }
            }

            "attribute" => self.walk_attribute(node, ctx, parent, span),

            "subscript" => {
                let base_name = node
                    .child_by_field_name("value")
                    .filter(|v| v.kind() == "identifier")
                    .map(|v| ctx.text(&v).to_string());
                let reads: Vec<String> = base_name.clone().into_iter().collect();
                let id = ctx.emit(ExprKind::Subscript, span, reads.clone(), parent);

                let mut result = WalkResult {
                    reads,
                    expr_ids: vec![id.clone()],
                    has_call: false,
                };
                if let Some(index) = node.child_by_field_name("subscript") {
                    result.merge(self.walk_expr(&index, ctx, Some(&id)));
                }
                result
            }

            "call" => self.walk_call(node, ctx, parent, span),

            "binary_operator" => self.walk_compound(node, ctx, parent, span, ExprKind::BinOp),
            "comparison_operator" => self.walk_compound(node, ctx, parent, span, ExprKind::Compare),
            "boolean_operator" => self.walk_compound(node, ctx, parent, span, ExprKind::BoolOp),
            "unary_operator" | "not_operator" => {
                self.walk_compound(node, ctx, parent, span, ExprKind::UnaryOp)
            }

            "integer" | "float" | "string" | "true" | "false" | "none" => {
                let id = ctx.emit(ExprKind::Literal, span, Vec::new(), parent);
                if let Some(expr) = ctx.last_mut(&id) {
                    expr.attrs.insert("value_type".into(), json!(literal_type(node.kind())));
                }
                WalkResult {
                    reads: Vec::new(),
                    expr_ids: vec![id],
                    has_call: false,
                }
            }

            "list" | "tuple" | "set" | "dictionary" => {
                let id = ctx.emit(ExprKind::Collection, span, Vec::new(), parent);
                let mut result = WalkResult {
                    reads: Vec::new(),
                    expr_ids: vec![id.clone()],
                    has_call: false,
                };
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.is_named() {
                        result.merge(self.walk_expr(&child, ctx, Some(&id)));
                    }
                }
                result
            }

            "lambda" => {
                // Lambda bodies are separate scopes; don't descend
                let id = ctx.emit(ExprKind::Lambda, span, Vec::new(), parent);
                WalkResult {
                    reads: Vec::new(),
                    expr_ids: vec![id],
                    has_call: false,
                }
            }

            "list_comprehension" | "set_comprehension" | "dictionary_comprehension"
            | "generator_expression" => {
                let id = ctx.emit(ExprKind::Comprehension, span, Vec::new(), parent);
                let mut result = WalkResult {
                    reads: Vec::new(),
                    expr_ids: vec![id.clone()],
                    has_call: false,
                };
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.is_named() {
                        result.merge(self.walk_expr(&child, ctx, Some(&id)));
                    }
                }
                result
            }

            "parenthesized_expression" | "conditional_expression" | "await" => {
                let mut result = WalkResult::empty();
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.is_named() {
                        result.merge(self.walk_expr(&child, ctx, parent));
                    }
                }
                result
            }

            _ => WalkResult::empty(),
        }
    }

    fn walk_attribute(
        &self,
        node: &TSNode,
        ctx: &mut ExprCtx,
        parent: Option<&str>,
        span: Span,
    ) -> WalkResult {
        let object = node.child_by_field_name("object");
        let attr_name = node
            .child_by_field_name("attribute")
            .map(|a| ctx.text(&a).to_string());

        // Reads resolve to the root identifier of the access chain
        let base_name = object.as_ref().and_then(|o| chain_root_name(o, ctx));
        let reads: Vec<String> = base_name.into_iter().collect();

        let id = ctx.emit(ExprKind::Attribute, span, reads.clone(), parent);
        if let Some(name) = attr_name {
            if let Some(expr) = ctx.last_mut(&id) {
                expr.attrs.insert("attr_name".into(), json!(name));
            }
        }

        let mut result = WalkResult {
            reads,
            expr_ids: vec![id.clone()],
            has_call: false,
        };
        // Descend into non-trivial bases (calls, subscripts); identifier
        // bases are already accounted for by the chain-root read
        if let Some(obj) = object {
            if !matches!(obj.kind(), "identifier" | "attribute") {
                result.merge(self.walk_expr(&obj, ctx, Some(&id)));
            }
        }
        result
    }

    /// Calls extract `callee_name` and `call_args` (identifier arguments and
    /// keyword-argument values), feeding DFG `param_to_arg` edges.
    fn walk_call(
        &self,
        node: &TSNode,
        ctx: &mut ExprCtx,
        parent: Option<&str>,
        span: Span,
    ) -> WalkResult {
        let callee = node.child_by_field_name("function");
        let callee_name = callee.map(|c| ctx.text(&c).to_string()).unwrap_or_default();

        let is_instantiation = callee
            .filter(|c| c.kind() == "identifier")
            .map(|c| {
                ctx.text(&c)
                    .chars()
                    .next()
                    .map(|ch| ch.is_uppercase())
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        let kind = if is_instantiation {
            ExprKind::Instantiate
        } else {
            ExprKind::Call
        };

        let mut call_args: Vec<String> = Vec::new();
        let mut non_identifier_args = Vec::new();
        if let Some(arguments) = node.child_by_field_name("arguments") {
            let mut cursor = arguments.walk();
            for arg in arguments.children(&mut cursor) {
                match arg.kind() {
                    "identifier" => call_args.push(ctx.text(&arg).to_string()),
                    "keyword_argument" => {
                        if let Some(value) = arg.child_by_field_name("value") {
                            if value.kind() == "identifier" {
                                call_args.push(ctx.text(&value).to_string());
                            } else {
                                non_identifier_args.push(value);
                            }
                        }
                    }
                    _ if arg.is_named() => non_identifier_args.push(arg),
                    _ => {}
                }
            }
        }

        let reads = call_args.clone();
        let id = ctx.emit(kind, span, reads.clone(), parent);
        if let Some(expr) = ctx.last_mut(&id) {
            if !callee_name.is_empty() {
                expr.attrs.insert("callee_name".into(), json!(callee_name));
            }
            if !call_args.is_empty() {
                expr.attrs.insert("call_args".into(), json!(call_args));
            }
        }

        let mut result = WalkResult {
            reads,
            expr_ids: vec![id.clone()],
            has_call: true,
        };
        // Attribute callees read their receiver chain
        if let Some(c) = callee {
            if c.kind() == "attribute" {
                result.merge(self.walk_expr(&c, ctx, Some(&id)));
            }
        }
        for arg in non_identifier_args {
            result.merge(self.walk_expr(&arg, ctx, Some(&id)));
        }
        result
    }

    fn walk_compound(
        &self,
        node: &TSNode,
        ctx: &mut ExprCtx,
        parent: Option<&str>,
        span: Span,
        kind: ExprKind,
    ) -> WalkResult {
        let id = ctx.emit(kind, span, Vec::new(), parent);
        let mut result = WalkResult {
            reads: Vec::new(),
            expr_ids: vec![id.clone()],
            has_call: false,
        };
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.is_named() {
                result.merge(self.walk_expr(&child, ctx, Some(&id)));
            }
        }
        result
    }
}

fn chain_root_name(node: &TSNode, ctx: &ExprCtx) -> Option<String> {
    match node.kind() {
        "identifier" => Some(ctx.text(node).to_string()),
        "attribute" => node
            .child_by_field_name("object")
            .and_then(|o| chain_root_name(&o, ctx)),
        _ => None,
    }
}

fn literal_type(kind: &str) -> &'static str {
    match kind {
        "integer" => "int",
        "float" => "float",
        "string" => "str",
        "true" | "false" => "bool",
        _ => "none",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir::IRBuilder;
    use crate::features::parsing::{parse_source, ParserRegistry, SourceFile};
    use crate::features::semantic_ir::bfg::BfgBuilder;
    use crate::shared::models::IRDocument;

    fn build_exprs(code: &str) -> Vec<Expression> {
        let registry = Arc::new(ParserRegistry::with_defaults());
        let source = SourceFile::new("t.py", LanguageId::Python, code);
        let parsed = parse_source(&source).unwrap();

        let ir_builder = IRBuilder::new(registry.clone());
        let mut doc = IRDocument::new("r", "s");
        doc.merge(ir_builder.build_file(&parsed, "r").unwrap());

        let mut source_map = SourceMap::new();
        source_map.insert("t.py".to_string(), parsed);

        let bfg = BfgBuilder::new(registry).build_full(&doc, &source_map);
        ExpressionBuilder::new().build_full(&doc, &bfg.graphs, &source_map)
    }

    #[test]
    fn test_return_marks_expressions() {
        let exprs = build_exprs("def f(x):\n    return x + 1\n");
        assert!(!exprs.is_empty());
        assert!(exprs.iter().all(|e| e.is_return()));

        let name_loads: Vec<&Expression> =
            exprs.iter().filter(|e| e.kind == ExprKind::NameLoad).collect();
        assert_eq!(name_loads.len(), 1);
        assert_eq!(name_loads[0].reads_vars, vec!["x"]);
    }

    #[test]
    fn test_simple_assignment_defines() {
        let exprs = build_exprs("def f(a):\n    b = a\n");
        let assign = exprs.iter().find(|e| e.kind == ExprKind::Assign).unwrap();
        assert_eq!(assign.defines_var.as_deref(), Some("b"));
        assert_eq!(assign.reads_vars, vec!["a"]);
        assert!(!assign.has_call_rhs());
    }

    #[test]
    fn test_call_assignment_has_call_rhs() {
        let exprs = build_exprs("def f(a):\n    b = g(a)\n");
        let assign = exprs.iter().find(|e| e.kind == ExprKind::Assign).unwrap();
        assert!(assign.has_call_rhs());

        let call = exprs.iter().find(|e| e.kind == ExprKind::Call).unwrap();
        assert_eq!(call.callee_name(), Some("g"));
        assert_eq!(call.call_args(), vec!["a"]);
    }

    #[test]
    fn test_tuple_unpacking_shares_reads() {
        let exprs = build_exprs("def f(a, b):\n    x, y = a, b\n");
        let assigns: Vec<&Expression> =
            exprs.iter().filter(|e| e.kind == ExprKind::Assign).collect();
        assert_eq!(assigns.len(), 2);
        for assign in &assigns {
            assert_eq!(assign.reads_vars.len(), 2);
            assert!(assign.reads_vars.contains(&"a".to_string()));
            assert!(assign.reads_vars.contains(&"b".to_string()));
        }
        let defines: HashSet<&str> = assigns
            .iter()
            .filter_map(|e| e.defines_var.as_deref())
            .collect();
        assert_eq!(defines, HashSet::from(["x", "y"]));
    }

    #[test]
    fn test_instantiate_detected_by_case() {
        let exprs = build_exprs("def f():\n    svc = Service()\n");
        assert!(exprs.iter().any(|e| e.kind == ExprKind::Instantiate));
    }

    #[test]
    fn test_expressions_carry_block_ids() {
        let exprs = build_exprs("def f(x):\n    y = x\n    return y\n");
        assert!(exprs.iter().all(|e| e.block_id.is_some()));
    }
}
