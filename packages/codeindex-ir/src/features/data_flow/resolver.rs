//! Variable resolution with shadow-count support
//!
//! Rules:
//! - a (block, name) pair resolves to at most one variable ID
//! - reads of a name declared as a parameter resolve to the block-0 param
//! - reads of a name bound in an enclosing scope materialize as `captured`
//! - everything else creates a fresh variable with a bumped shadow count

use serde_json::json;
use std::collections::HashMap;

use super::models::{ScopeKind, VariableEntity, VariableKind};

/// Extract (scope_id, scope_kind, scope_depth) from a function FQN.
///
/// - `module` → module scope, depth 0
/// - `module.func` → function, depth 1
/// - `Class.method` → method (uppercase parent heuristic)
/// - `f.<lambda_1>` → lambda
pub fn extract_scope_info(function_fqn: &str) -> (String, ScopeKind, usize) {
    if function_fqn.is_empty() {
        return (String::new(), ScopeKind::Module, 0);
    }

    let parts: Vec<&str> = function_fqn.split('.').collect();
    let scope_depth = parts.len() - 1;
    let last = *parts.last().unwrap();

    let scope_kind = if last.starts_with("<lambda") {
        ScopeKind::Lambda
    } else if last.starts_with("<comprehension") {
        ScopeKind::Comprehension
    } else if parts.len() == 1 {
        ScopeKind::Function
    } else {
        let parent = parts[parts.len() - 2];
        if parent.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
            ScopeKind::Method
        } else {
            ScopeKind::Function
        }
    };

    (function_fqn.to_string(), scope_kind, scope_depth)
}

/// Per-function resolution state
#[derive(Debug, Default)]
pub struct VarResolverState {
    /// name → all variable IDs (in creation order)
    pub by_name: HashMap<String, Vec<String>>,
    /// (block_idx, name) → current variable ID in that block
    pub current_by_block: HashMap<(usize, String), String>,
    /// name → shadow count
    pub shadow_counter: HashMap<String, usize>,
}

/// Per-function DFG context
#[derive(Debug)]
pub struct DfgContext {
    pub repo_id: String,
    pub file_path: String,
    pub function_fqn: String,
    pub language: String,
    /// variable_id → entity
    pub variable_index: HashMap<String, VariableEntity>,
    /// name → variable IDs, for O(1) lookup
    pub name_to_ids: HashMap<String, Vec<String>>,
    /// name → annotation type id (from parameter annotations)
    pub type_index: HashMap<String, String>,
    /// Enclosing-scope bindings for closure detection: name → (var_id, scope_fqn)
    pub outer_scope_vars: HashMap<String, (String, String)>,
}

impl DfgContext {
    pub fn new(
        repo_id: impl Into<String>,
        file_path: impl Into<String>,
        function_fqn: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            repo_id: repo_id.into(),
            file_path: file_path.into(),
            function_fqn: function_fqn.into(),
            language: language.into(),
            variable_index: HashMap::new(),
            name_to_ids: HashMap::new(),
            type_index: HashMap::new(),
            outer_scope_vars: HashMap::new(),
        }
    }

    pub fn register_variable(&mut self, var: VariableEntity) {
        self.name_to_ids
            .entry(var.name.clone())
            .or_default()
            .push(var.id.clone());
        self.variable_index.insert(var.id.clone(), var);
    }

    /// First variable registered under the name
    pub fn find_variable_id_by_name(&self, name: &str) -> Option<&str> {
        self.name_to_ids
            .get(name)
            .and_then(|ids| ids.first())
            .map(String::as_str)
    }
}

/// Resolve a name in a block, creating a variable if needed. Returns the
/// variable ID.
pub fn resolve_or_create_variable(
    name: &str,
    block_idx: usize,
    kind: VariableKind,
    state: &mut VarResolverState,
    ctx: &mut DfgContext,
) -> String {
    let key = (block_idx, name.to_string());

    if let Some(var_id) = state.current_by_block.get(&key) {
        return var_id.clone();
    }

    // Reads resolve to the parameter variable when the name is a parameter
    if kind == VariableKind::Local && state.by_name.contains_key(name) {
        let param_key = (0usize, name.to_string());
        if let Some(param_var_id) = state.current_by_block.get(&param_key).cloned() {
            let is_param = ctx
                .variable_index
                .get(&param_var_id)
                .map(|v| v.kind == VariableKind::Param)
                .unwrap_or(false);
            if is_param {
                state.current_by_block.insert(key, param_var_id.clone());
                return param_var_id;
            }
        }
    }

    // Names bound in an enclosing scope become captured variables
    let mut actual_kind = kind;
    let mut outer_var_id: Option<String> = None;
    if kind == VariableKind::Local {
        if let Some((outer_id, _scope)) = ctx.outer_scope_vars.get(name) {
            actual_kind = VariableKind::Captured;
            outer_var_id = Some(outer_id.clone());
        }
    }

    let shadow = state.shadow_counter.get(name).copied().unwrap_or(0) + 1;
    state.shadow_counter.insert(name.to_string(), shadow);

    let var_id = format!(
        "var:{}:{}:{}:{}@{}:{}",
        ctx.repo_id, ctx.file_path, ctx.function_fqn, name, block_idx, shadow
    );

    state
        .by_name
        .entry(name.to_string())
        .or_default()
        .push(var_id.clone());
    state.current_by_block.insert(key, var_id.clone());

    let (scope_id, scope_kind, scope_depth) = extract_scope_info(&ctx.function_fqn);

    let mut var = VariableEntity {
        id: var_id.clone(),
        repo_id: ctx.repo_id.clone(),
        file_path: ctx.file_path.clone(),
        function_fqn: ctx.function_fqn.clone(),
        name: name.to_string(),
        kind: actual_kind,
        type_id: ctx.type_index.get(name).cloned(),
        inferred_type: None,
        type_source: if ctx.type_index.contains_key(name) {
            "annotation".to_string()
        } else {
            "unknown".to_string()
        },
        decl_block_id: format!("block:{}", block_idx),
        scope_id,
        scope_kind,
        scope_depth,
        attrs: HashMap::new(),
    };

    if actual_kind == VariableKind::Captured {
        if let Some(outer_id) = outer_var_id {
            var.attrs.insert("captured_from".into(), json!(outer_id));
        }
    }

    ctx.register_variable(var);
    var_id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DfgContext {
        DfgContext::new("r", "a.py", "f", "python")
    }

    #[test]
    fn test_same_block_same_name_resolves_once() {
        let mut state = VarResolverState::default();
        let mut ctx = ctx();
        let a = resolve_or_create_variable("x", 1, VariableKind::Local, &mut state, &mut ctx);
        let b = resolve_or_create_variable("x", 1, VariableKind::Local, &mut state, &mut ctx);
        assert_eq!(a, b);
        assert_eq!(ctx.variable_index.len(), 1);
    }

    #[test]
    fn test_read_resolves_to_parameter() {
        let mut state = VarResolverState::default();
        let mut ctx = ctx();
        let param = resolve_or_create_variable("x", 0, VariableKind::Param, &mut state, &mut ctx);
        let read = resolve_or_create_variable("x", 2, VariableKind::Local, &mut state, &mut ctx);
        assert_eq!(param, read);
    }

    #[test]
    fn test_shadow_count_bumps_across_blocks() {
        let mut state = VarResolverState::default();
        let mut ctx = ctx();
        let first = resolve_or_create_variable("y", 1, VariableKind::Local, &mut state, &mut ctx);
        let second = resolve_or_create_variable("y", 2, VariableKind::Local, &mut state, &mut ctx);
        assert_ne!(first, second);
        assert!(first.ends_with("@1:1"));
        assert!(second.ends_with("@2:2"));
    }

    #[test]
    fn test_outer_scope_creates_captured() {
        let mut state = VarResolverState::default();
        let mut ctx = DfgContext::new("r", "a.py", "outer.inner", "python");
        ctx.outer_scope_vars.insert(
            "x".to_string(),
            ("var:r:a.py:outer:x@0:1".to_string(), "outer".to_string()),
        );

        let var_id = resolve_or_create_variable("x", 1, VariableKind::Local, &mut state, &mut ctx);
        let var = ctx.variable_index.get(&var_id).unwrap();
        assert_eq!(var.kind, VariableKind::Captured);
        assert_eq!(var.captured_from(), Some("var:r:a.py:outer:x@0:1"));
    }

    #[test]
    fn test_scope_info_extraction() {
        assert_eq!(extract_scope_info("f").1, ScopeKind::Function);
        assert_eq!(extract_scope_info("Svc.run").1, ScopeKind::Method);
        assert_eq!(extract_scope_info("f.<lambda_1>").1, ScopeKind::Lambda);
        assert_eq!(extract_scope_info("outer.inner").2, 1);
    }
}
