//! Built-in language plugins

use tree_sitter::{Language as TSLanguage, Node as TSNode};

use super::ports::{ControlFlowType, ExceptionHandlers, LanguageId, LanguagePlugin};

/// Python language plugin
pub struct PythonPlugin;

impl PythonPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl LanguagePlugin for PythonPlugin {
    fn tree_sitter_language(&self) -> TSLanguage {
        tree_sitter_python::language()
    }

    fn language_id(&self) -> LanguageId {
        LanguageId::Python
    }

    fn is_statement_node(&self, node: &TSNode) -> bool {
        matches!(
            node.kind(),
            "expression_statement"
                | "assignment"
                | "augmented_assignment"
                | "import_statement"
                | "import_from_statement"
                | "assert_statement"
                | "pass_statement"
                | "delete_statement"
                | "global_statement"
                | "nonlocal_statement"
                | "with_statement"
        )
    }

    fn is_control_flow_node(&self, node: &TSNode) -> bool {
        self.get_control_flow_type(node).is_some()
    }

    fn get_control_flow_type(&self, node: &TSNode) -> Option<ControlFlowType> {
        match node.kind() {
            "if_statement" | "elif_clause" => Some(ControlFlowType::If),
            "for_statement" | "while_statement" => Some(ControlFlowType::Loop),
            "match_statement" => Some(ControlFlowType::Match),
            "try_statement" => Some(ControlFlowType::Try),
            "return_statement" => Some(ControlFlowType::Return),
            "break_statement" => Some(ControlFlowType::Break),
            "continue_statement" => Some(ControlFlowType::Continue),
            "raise_statement" => Some(ControlFlowType::Raise),
            _ => None,
        }
    }

    fn get_control_flow_body<'a>(&self, node: &TSNode<'a>) -> Option<TSNode<'a>> {
        // else_clause carries its body under "body"; if/elif under
        // "consequence"; except/finally clauses hold a bare block child
        node.child_by_field_name("consequence")
            .or_else(|| node.child_by_field_name("body"))
            .or_else(|| {
                let mut cursor = node.walk();
                let blocks: Vec<TSNode<'a>> = node
                    .children(&mut cursor)
                    .filter(|c| c.kind() == "block")
                    .collect();
                blocks.into_iter().next_back()
            })
    }

    fn get_control_flow_alternative<'a>(&self, node: &TSNode<'a>) -> Option<TSNode<'a>> {
        node.child_by_field_name("alternative")
    }

    fn get_exception_handlers<'a>(&self, node: &TSNode<'a>) -> ExceptionHandlers<'a> {
        let mut handlers = ExceptionHandlers::default();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "except_clause" | "except_group_clause" => handlers.catch_blocks.push(child),
                "finally_clause" => handlers.finally_block = Some(child),
                _ => {}
            }
        }
        handlers
    }

    fn is_chained_condition(&self, node: &TSNode) -> bool {
        node.kind() == "elif_clause"
    }
}

/// TypeScript language plugin
pub struct TypeScriptPlugin;

impl TypeScriptPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl LanguagePlugin for TypeScriptPlugin {
    fn tree_sitter_language(&self) -> TSLanguage {
        tree_sitter_typescript::language_typescript()
    }

    fn language_id(&self) -> LanguageId {
        LanguageId::TypeScript
    }

    fn is_statement_node(&self, node: &TSNode) -> bool {
        matches!(
            node.kind(),
            "expression_statement"
                | "lexical_declaration"
                | "variable_declaration"
                | "import_statement"
                | "export_statement"
        )
    }

    fn is_control_flow_node(&self, node: &TSNode) -> bool {
        self.get_control_flow_type(node).is_some()
    }

    fn get_control_flow_type(&self, node: &TSNode) -> Option<ControlFlowType> {
        match node.kind() {
            "if_statement" => Some(ControlFlowType::If),
            "for_statement" | "for_in_statement" | "while_statement" | "do_statement" => {
                Some(ControlFlowType::Loop)
            }
            "switch_statement" => Some(ControlFlowType::Match),
            "try_statement" => Some(ControlFlowType::Try),
            "return_statement" => Some(ControlFlowType::Return),
            "break_statement" => Some(ControlFlowType::Break),
            "continue_statement" => Some(ControlFlowType::Continue),
            "throw_statement" => Some(ControlFlowType::Raise),
            _ => None,
        }
    }

    fn get_control_flow_alternative<'a>(&self, node: &TSNode<'a>) -> Option<TSNode<'a>> {
        // else_clause wraps either a block or a chained if_statement
        node.child_by_field_name("alternative")
            .map(|alt| alt.child(1).unwrap_or(alt))
    }

    fn get_control_flow_alternatives<'a>(&self, node: &TSNode<'a>) -> Vec<TSNode<'a>> {
        self.get_control_flow_alternative(node).into_iter().collect()
    }

    fn get_exception_handlers<'a>(&self, node: &TSNode<'a>) -> ExceptionHandlers<'a> {
        let mut handlers = ExceptionHandlers::default();
        if let Some(handler) = node.child_by_field_name("handler") {
            handlers.catch_blocks.push(handler);
        }
        if let Some(finalizer) = node.child_by_field_name("finalizer") {
            handlers.finally_block = Some(finalizer);
        }
        handlers
    }

    fn is_chained_condition(&self, node: &TSNode) -> bool {
        node.kind() == "if_statement"
    }
}
