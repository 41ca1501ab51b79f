//! DFG builder
//!
//! Consumes IR + BFG blocks + Expression IR; never the AST. Outer functions
//! are processed before inner ones (FQN depth order) so closure capture can
//! resolve against already-known outer variables.

use serde_json::json;
use std::collections::HashMap;

use super::models::{
    DataFlowEdge, DataFlowEdgeKind, DfgSnapshot, EventKind, VariableEntity, VariableEvent,
    VariableKind,
};
use super::resolver::{resolve_or_create_variable, DfgContext, VarResolverState};
use crate::features::semantic_ir::bfg::BasicFlowBlock;
use crate::features::semantic_ir::expression::{ExprKind, Expression};
use crate::shared::models::{IRDocument, Node, NodeKind};

/// Performance/failure metrics for a DFG build
#[derive(Debug, Clone, Default)]
pub struct DfgMetrics {
    pub total_functions: usize,
    pub total_variables: usize,
    pub total_events: usize,
    pub total_edges: usize,
    pub failed_functions: usize,
}

/// Output of a full DFG build
#[derive(Debug, Default)]
pub struct DfgBuildOutput {
    pub snapshot: DfgSnapshot,
    pub failed_functions: Vec<String>,
    pub metrics: DfgMetrics,
    /// block_id → (defined_variable_ids, used_variable_ids)
    pub block_variables: HashMap<String, (Vec<String>, Vec<String>)>,
}

/// Builds the DFG from Expression IR.
pub struct DfgBuilder {
    /// fqn → {name → var_id}, for closure detection in nested functions
    function_variables: HashMap<String, HashMap<String, String>>,
}

impl DfgBuilder {
    pub fn new() -> Self {
        Self {
            function_variables: HashMap::new(),
        }
    }

    pub fn build_full(
        &mut self,
        ir_doc: &IRDocument,
        bfg_blocks: &[BasicFlowBlock],
        expressions: &[Expression],
    ) -> DfgBuildOutput {
        self.function_variables.clear();

        let mut output = DfgBuildOutput::default();

        let exprs_by_block = group_expressions_by_block(expressions);
        let blocks_by_function = group_blocks_by_function(bfg_blocks);

        let nodes_by_id: HashMap<&str, &Node> =
            ir_doc.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        // Outer functions first; ties broken by FQN for determinism
        let mut function_ids: Vec<&String> = blocks_by_function.keys().collect();
        function_ids.sort_by_key(|fid| {
            let depth = nodes_by_id
                .get(fid.as_str())
                .map(|n| n.fqn.matches('.').count())
                .unwrap_or(0);
            (depth, fid.to_string())
        });

        output.metrics.total_functions = function_ids.len();

        for function_id in function_ids {
            let func_node = match nodes_by_id.get(function_id.as_str()) {
                Some(n) if matches!(n.kind, NodeKind::Function | NodeKind::Method) => *n,
                _ => {
                    tracing::warn!(function = %function_id, "dfg_function_node_not_found");
                    output.metrics.failed_functions += 1;
                    output.failed_functions.push(function_id.clone());
                    continue;
                }
            };

            let func_blocks = &blocks_by_function[function_id.as_str()];
            let func_snapshot =
                self.build_function_dfg(func_node, func_blocks, &exprs_by_block, ir_doc, &mut output);
            output.snapshot.merge(func_snapshot);
        }

        output.metrics.total_variables = output.snapshot.variables.len();
        output.metrics.total_events = output.snapshot.events.len();
        output.metrics.total_edges = output.snapshot.edges.len();

        tracing::info!(
            variables = output.metrics.total_variables,
            events = output.metrics.total_events,
            edges = output.metrics.total_edges,
            failed = output.metrics.failed_functions,
            "dfg_build_completed"
        );

        output
    }

    fn build_function_dfg(
        &mut self,
        func_node: &Node,
        bfg_blocks: &[&BasicFlowBlock],
        exprs_by_block: &HashMap<&str, Vec<&Expression>>,
        ir_doc: &IRDocument,
        output: &mut DfgBuildOutput,
    ) -> DfgSnapshot {
        let mut ctx = DfgContext::new(
            &ir_doc.repo_id,
            &func_node.file_path,
            &func_node.fqn,
            &func_node.language,
        );
        ctx.outer_scope_vars = self.collect_outer_scope_vars(&func_node.fqn);

        let mut state = VarResolverState::default();
        let mut events: Vec<VariableEvent> = Vec::new();

        self.create_parameter_variables(func_node, ir_doc, &mut state, &mut ctx);

        for (block_idx, block) in bfg_blocks.iter().enumerate() {
            let block_exprs = exprs_by_block.get(block.id.as_str());
            let (defined, used) = process_block_expressions(
                block,
                block_idx,
                block_exprs.map(|v| v.as_slice()).unwrap_or(&[]),
                &mut state,
                &mut ctx,
                &mut events,
            );
            if !defined.is_empty() || !used.is_empty() {
                output
                    .block_variables
                    .insert(block.id.clone(), (defined, used));
            }
        }

        let edges = build_dataflow_edges(bfg_blocks, exprs_by_block, &ctx);

        self.track_function_variables(&func_node.fqn, &ctx);

        let mut variables: Vec<VariableEntity> = ctx.variable_index.into_values().collect();
        variables.sort_by(|a, b| a.id.cmp(&b.id));

        DfgSnapshot {
            variables,
            events,
            edges,
        }
    }

    /// Variables from enclosing scopes by FQN prefix; the nearest scope wins
    fn collect_outer_scope_vars(&self, function_fqn: &str) -> HashMap<String, (String, String)> {
        let mut outer: HashMap<String, (String, String)> = HashMap::new();
        if function_fqn.is_empty() {
            return outer;
        }

        let parts: Vec<&str> = function_fqn.split('.').collect();
        for i in (1..parts.len()).rev() {
            let enclosing = parts[..i].join(".");
            if let Some(vars) = self.function_variables.get(&enclosing) {
                for (name, var_id) in vars {
                    outer
                        .entry(name.clone())
                        .or_insert_with(|| (var_id.clone(), enclosing.clone()));
                }
            }
        }
        outer
    }

    fn track_function_variables(&mut self, function_fqn: &str, ctx: &DfgContext) {
        if function_fqn.is_empty() {
            return;
        }
        let mut vars = HashMap::new();
        for (name, ids) in &ctx.name_to_ids {
            if let Some(first) = ids.first() {
                vars.insert(name.clone(), first.clone());
            }
        }
        self.function_variables.insert(function_fqn.to_string(), vars);
    }

    /// Parameters become variables at block 0 (entry), shadow 1
    fn create_parameter_variables(
        &self,
        func_node: &Node,
        ir_doc: &IRDocument,
        state: &mut VarResolverState,
        ctx: &mut DfgContext,
    ) {
        for node in &ir_doc.nodes {
            if node.parent_id.as_deref() != Some(&func_node.id) || node.kind != NodeKind::Variable {
                continue;
            }
            if node.attr_str("var_kind") != Some("parameter") {
                continue;
            }
            if node.name.is_empty() {
                continue;
            }

            if let Some(type_id) = &node.declared_type_id {
                ctx.type_index.insert(node.name.clone(), type_id.clone());
            }
            resolve_or_create_variable(&node.name, 0, VariableKind::Param, state, ctx);
        }
    }
}

fn group_expressions_by_block<'a>(
    expressions: &'a [Expression],
) -> HashMap<&'a str, Vec<&'a Expression>> {
    let mut map: HashMap<&str, Vec<&Expression>> = HashMap::new();
    for expr in expressions {
        if let Some(block_id) = &expr.block_id {
            map.entry(block_id.as_str()).or_default().push(expr);
        }
    }
    map
}

fn group_blocks_by_function(blocks: &[BasicFlowBlock]) -> HashMap<String, Vec<&BasicFlowBlock>> {
    let mut map: HashMap<String, Vec<&BasicFlowBlock>> = HashMap::new();
    for block in blocks {
        map.entry(block.function_node_id.clone())
            .or_default()
            .push(block);
    }
    map
}

/// Turn one block's expression reads/writes into events. Returns the
/// (defined, used) variable IDs for the block.
fn process_block_expressions(
    block: &BasicFlowBlock,
    block_idx: usize,
    expressions: &[&Expression],
    state: &mut VarResolverState,
    ctx: &mut DfgContext,
    events: &mut Vec<VariableEvent>,
) -> (Vec<String>, Vec<String>) {
    let mut defined = Vec::new();
    let mut used = Vec::new();

    for expr in expressions {
        for var_name in &expr.reads_vars {
            let var_id =
                resolve_or_create_variable(var_name, block_idx, VariableKind::Local, state, ctx);

            if let Some(inferred) = &expr.inferred_type {
                if let Some(var) = ctx.variable_index.get_mut(&var_id) {
                    if var.type_source == "unknown" {
                        var.inferred_type = Some(inferred.clone());
                        var.type_source = "inferred".to_string();
                    }
                }
            }

            events.push(VariableEvent {
                id: format!("evt:{}:{}", var_id, expr.id),
                repo_id: ctx.repo_id.clone(),
                file_path: ctx.file_path.clone(),
                function_fqn: ctx.function_fqn.clone(),
                variable_id: var_id.clone(),
                block_id: block.id.clone(),
                expr_id: expr.id.clone(),
                op_kind: EventKind::Read,
                start_line: Some(expr.span.start_line),
                end_line: Some(expr.span.end_line),
            });
            used.push(var_id);
        }

        if let Some(var_name) = &expr.defines_var {
            let var_id =
                resolve_or_create_variable(var_name, block_idx, VariableKind::Local, state, ctx);

            if let Some(inferred) = &expr.inferred_type {
                if let Some(var) = ctx.variable_index.get_mut(&var_id) {
                    var.inferred_type = Some(inferred.clone());
                    var.type_source = "inferred".to_string();
                }
            }

            events.push(VariableEvent {
                id: format!("evt:{}:{}", var_id, expr.id),
                repo_id: ctx.repo_id.clone(),
                file_path: ctx.file_path.clone(),
                function_fqn: ctx.function_fqn.clone(),
                variable_id: var_id.clone(),
                block_id: block.id.clone(),
                expr_id: expr.id.clone(),
                op_kind: EventKind::Write,
                start_line: Some(expr.span.start_line),
                end_line: Some(expr.span.end_line),
            });
            defined.push(var_id);
        }
    }

    (defined, used)
}

/// Emit alias/assign, return_value, and param_to_arg edges. Edge IDs use a
/// monotonic per-function counter for determinism.
fn build_dataflow_edges(
    bfg_blocks: &[&BasicFlowBlock],
    exprs_by_block: &HashMap<&str, Vec<&Expression>>,
    ctx: &DfgContext,
) -> Vec<DataFlowEdge> {
    let mut name_to_id: HashMap<&str, &str> = HashMap::new();
    for (name, ids) in &ctx.name_to_ids {
        if let Some(first) = ids.first() {
            name_to_id.insert(name.as_str(), first.as_str());
        }
    }

    let mut edges = Vec::new();
    let mut edge_counter = 0usize;

    let mut push_edge = |edges: &mut Vec<DataFlowEdge>,
                         counter: &mut usize,
                         kind: DataFlowEdgeKind,
                         from: &str,
                         to: &str,
                         attrs: HashMap<String, serde_json::Value>| {
        edges.push(DataFlowEdge {
            id: format!("edge:{}:{}", kind.as_str(), counter),
            from_variable_id: from.to_string(),
            to_variable_id: to.to_string(),
            kind,
            repo_id: ctx.repo_id.clone(),
            file_path: ctx.file_path.clone(),
            function_fqn: ctx.function_fqn.clone(),
            attrs,
        });
        *counter += 1;
    };

    // Block order keeps edge emission deterministic
    for block in bfg_blocks {
        let expressions = match exprs_by_block.get(block.id.as_str()) {
            Some(e) => e,
            None => continue,
        };

        for expr in expressions {
            // Assignment: alias for plain copies, assign when the right
            // side involves a call
            if let (Some(defines), false) = (&expr.defines_var, expr.reads_vars.is_empty()) {
                if let Some(target_id) = name_to_id.get(defines.as_str()) {
                    let is_call = expr.kind == ExprKind::Call || expr.has_call_rhs();
                    let kind = if is_call {
                        DataFlowEdgeKind::Assign
                    } else {
                        DataFlowEdgeKind::Alias
                    };
                    for source_name in &expr.reads_vars {
                        if let Some(source_id) = name_to_id.get(source_name.as_str()) {
                            push_edge(
                                &mut edges,
                                &mut edge_counter,
                                kind,
                                source_id,
                                target_id,
                                HashMap::new(),
                            );
                        }
                    }
                }
            }

            // Return statements flow reads into the special `return` target
            if expr.kind == ExprKind::NameLoad && expr.is_return() {
                for var_name in &expr.reads_vars {
                    if let Some(var_id) = name_to_id.get(var_name.as_str()) {
                        push_edge(
                            &mut edges,
                            &mut edge_counter,
                            DataFlowEdgeKind::ReturnValue,
                            var_id,
                            "return",
                            HashMap::new(),
                        );
                    }
                }
            }

            // Calls: argument → callee parameter, symbolic until resolved
            if matches!(expr.kind, ExprKind::Call | ExprKind::Instantiate) {
                let call_args = expr.call_args();
                if let Some(callee_name) = expr.callee_name() {
                    for (arg_idx, arg_name) in call_args.iter().enumerate() {
                        if let Some(arg_id) = name_to_id.get(arg_name.as_str()) {
                            let target = format!("callee:{}:param:{}", callee_name, arg_idx);
                            let mut attrs = HashMap::new();
                            attrs.insert("callee_name".to_string(), json!(callee_name));
                            attrs.insert("arg_index".to_string(), json!(arg_idx));
                            push_edge(
                                &mut edges,
                                &mut edge_counter,
                                DataFlowEdgeKind::ParamToArg,
                                arg_id,
                                &target,
                                attrs,
                            );
                        }
                    }
                }
            }
        }
    }

    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir::IRBuilder;
    use crate::features::parsing::{parse_source, LanguageId, ParserRegistry, SourceFile, SourceMap};
    use crate::features::semantic_ir::bfg::BfgBuilder;
    use crate::features::semantic_ir::expression::ExpressionBuilder;
    use std::sync::Arc;

    fn build_dfg(code: &str) -> DfgBuildOutput {
        let registry = Arc::new(ParserRegistry::with_defaults());
        let source = SourceFile::new("t.py", LanguageId::Python, code);
        let parsed = parse_source(&source).unwrap();

        let ir_builder = IRBuilder::new(registry.clone());
        let mut doc = IRDocument::new("r", "s");
        doc.merge(ir_builder.build_file(&parsed, "r").unwrap());

        let mut source_map = SourceMap::new();
        source_map.insert("t.py".to_string(), parsed);

        let bfg = BfgBuilder::new(registry).build_full(&doc, &source_map);
        let expressions = ExpressionBuilder::new().build_full(&doc, &bfg.graphs, &source_map);

        DfgBuilder::new().build_full(&doc, &bfg.blocks, &expressions)
    }

    #[test]
    fn test_trivial_function_dfg() {
        // One param variable, one read event, one return_value edge
        let output = build_dfg("def f(x):\n    return x + 1\n");
        let snapshot = &output.snapshot;

        let x_vars: Vec<&VariableEntity> = snapshot
            .variables
            .iter()
            .filter(|v| v.name == "x")
            .collect();
        assert_eq!(x_vars.len(), 1);
        assert_eq!(x_vars[0].kind, VariableKind::Param);

        let reads: Vec<&VariableEvent> = snapshot
            .events
            .iter()
            .filter(|e| e.op_kind == EventKind::Read)
            .collect();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].variable_id, x_vars[0].id);

        let return_edges: Vec<&DataFlowEdge> = snapshot
            .edges
            .iter()
            .filter(|e| e.kind == DataFlowEdgeKind::ReturnValue)
            .collect();
        assert_eq!(return_edges.len(), 1);
        assert_eq!(return_edges[0].from_variable_id, x_vars[0].id);
        assert_eq!(return_edges[0].to_variable_id, "return");
    }

    #[test]
    fn test_alias_edge_for_simple_assignment() {
        let output = build_dfg("def f(a):\n    b = a\n");
        assert!(output
            .snapshot
            .edges
            .iter()
            .any(|e| e.kind == DataFlowEdgeKind::Alias));
    }

    #[test]
    fn test_assign_edge_for_call_assignment() {
        let output = build_dfg("def f(a):\n    b = g(a)\n");
        assert!(output
            .snapshot
            .edges
            .iter()
            .any(|e| e.kind == DataFlowEdgeKind::Assign));
    }

    #[test]
    fn test_param_to_arg_symbolic_target() {
        let output = build_dfg("def f(a):\n    g(a)\n");
        let edge = output
            .snapshot
            .edges
            .iter()
            .find(|e| e.kind == DataFlowEdgeKind::ParamToArg)
            .expect("param_to_arg edge");
        assert_eq!(edge.to_variable_id, "callee:g:param:0");
    }

    #[test]
    fn test_shadowing_creates_distinct_variables() {
        // x assigned in two different blocks: shadow count bumps
        let code = "def f(c):\n    if c:\n        x = 1\n    else:\n        x = 2\n";
        let output = build_dfg(code);
        let x_vars: Vec<&VariableEntity> = output
            .snapshot
            .variables
            .iter()
            .filter(|v| v.name == "x")
            .collect();
        assert_eq!(x_vars.len(), 2);

        // Every read/write event resolves to exactly one known variable
        for event in &output.snapshot.events {
            assert!(output
                .snapshot
                .variables
                .iter()
                .any(|v| v.id == event.variable_id));
        }
    }

    #[test]
    fn test_return_read_does_not_merge_with_preceding_writes() {
        // The return closes its own BFG block, so its read resolves in a
        // different block than the straight-line writes
        let output = build_dfg("def f():\n    x = 1\n    x = 2\n    return x\n");

        let x_vars: Vec<&VariableEntity> = output
            .snapshot
            .variables
            .iter()
            .filter(|v| v.name == "x")
            .collect();
        assert_eq!(x_vars.len(), 2);

        let writes: Vec<&VariableEvent> = output
            .snapshot
            .events
            .iter()
            .filter(|e| e.op_kind == EventKind::Write)
            .collect();
        assert_eq!(writes.len(), 2);
        // Same straight-line block: one variable version for both writes
        assert_eq!(writes[0].variable_id, writes[1].variable_id);

        let read = output
            .snapshot
            .events
            .iter()
            .find(|e| e.op_kind == EventKind::Read)
            .unwrap();
        assert_ne!(read.variable_id, writes[0].variable_id);
        assert_ne!(read.block_id, writes[0].block_id);
    }

    #[test]
    fn test_captured_variable_in_nested_function() {
        let code = "def outer():\n    x = 1\n    def inner():\n        return x\n";
        let output = build_dfg(code);

        let captured: Vec<&VariableEntity> = output
            .snapshot
            .variables
            .iter()
            .filter(|v| v.kind == VariableKind::Captured)
            .collect();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].name, "x");
        assert_eq!(captured[0].function_fqn, "outer.inner");

        let outer_x = output
            .snapshot
            .variables
            .iter()
            .find(|v| v.name == "x" && v.function_fqn == "outer")
            .unwrap();
        assert_eq!(captured[0].captured_from(), Some(outer_x.id.as_str()));
    }
}
