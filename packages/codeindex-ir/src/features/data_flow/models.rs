//! DFG domain models

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Variable kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Param,
    Local,
    Captured,
}

/// Scope classification derived from the function FQN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Module,
    Function,
    Method,
    Lambda,
    Comprehension,
}

/// A variable within one function.
///
/// Shadow-counted ID format:
/// `var:{repo_id}:{file_path}:{function_fqn}:{name}@{block_idx}:{shadow}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableEntity {
    pub id: String,
    pub repo_id: String,
    pub file_path: String,
    pub function_fqn: String,
    pub name: String,
    pub kind: VariableKind,
    /// TypeEntity ID from annotation, when declared
    pub type_id: Option<String>,
    pub inferred_type: Option<String>,
    /// annotation | inferred | unknown
    pub type_source: String,
    pub decl_block_id: String,
    pub scope_id: String,
    pub scope_kind: ScopeKind,
    pub scope_depth: usize,
    /// `captured_from` for captured variables
    #[serde(default)]
    pub attrs: HashMap<String, Value>,
}

impl VariableEntity {
    pub fn captured_from(&self) -> Option<&str> {
        self.attrs.get("captured_from").and_then(|v| v.as_str())
    }
}

/// Read or write of a variable at a specific (block, expression)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableEvent {
    /// `evt:{variable_id}:{expr_id}`
    pub id: String,
    pub repo_id: String,
    pub file_path: String,
    pub function_fqn: String,
    pub variable_id: String,
    pub block_id: String,
    /// The expression that produced this event
    pub expr_id: String,
    pub op_kind: EventKind,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Read,
    Write,
}

/// Data flow edge kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFlowEdgeKind {
    /// `a = b`
    Alias,
    /// `a = f(b)`
    Assign,
    /// `return a`
    ReturnValue,
    /// argument → callee parameter (symbolic target when unresolved)
    ParamToArg,
}

impl DataFlowEdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFlowEdgeKind::Alias => "alias",
            DataFlowEdgeKind::Assign => "assign",
            DataFlowEdgeKind::ReturnValue => "return_value",
            DataFlowEdgeKind::ParamToArg => "param_to_arg",
        }
    }
}

/// Value-flow edge between variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFlowEdge {
    /// `edge:{kind}:{counter}` — counter is monotonic within the function
    pub id: String,
    pub from_variable_id: String,
    /// A variable ID, the special target `return`, or a symbolic
    /// `callee:{name}:param:{i}` target
    pub to_variable_id: String,
    pub kind: DataFlowEdgeKind,
    pub repo_id: String,
    pub file_path: String,
    pub function_fqn: String,
    #[serde(default)]
    pub attrs: HashMap<String, Value>,
}

/// All DFG output for a document (or one function, before merging)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DfgSnapshot {
    pub variables: Vec<VariableEntity>,
    pub events: Vec<VariableEvent>,
    pub edges: Vec<DataFlowEdge>,
}

impl DfgSnapshot {
    pub fn merge(&mut self, other: DfgSnapshot) {
        self.variables.extend(other.variables);
        self.events.extend(other.events);
        self.edges.extend(other.edges);
    }
}
