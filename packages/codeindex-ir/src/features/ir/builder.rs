//! IR builder
//!
//! Translates per-file ASTs into structural IR: stable node IDs,
//! parent/child CONTAINS links, FQNs, declared type IDs from annotations,
//! signatures for callables, import edges, and call-site records consumed
//! by the graph builder.
//!
//! Per-file failures are logged and reported; the document is never
//! corrupted by one bad file.

use serde_json::json;
use std::sync::Arc;
use tree_sitter::Node as TSNode;

use crate::features::parsing::{LanguagePlugin, ParsedFile, ParserRegistry, SpanExt};
use crate::features::semantic_ir::signature::{SignatureEntity, Visibility};
use crate::features::semantic_ir::types::type_id;
use crate::shared::models::{
    Edge, EdgeAttrs, EdgeKind, IRDocument, IndexError, NodeBuilder, NodeKind, Result, Span,
};
use crate::shared::utils::id_gen::node_id;

pub struct IRBuilder {
    registry: Arc<ParserRegistry>,
}

impl IRBuilder {
    pub fn new(registry: Arc<ParserRegistry>) -> Self {
        Self { registry }
    }

    /// Build structural IR for one parsed file.
    pub fn build_file(&self, parsed: &ParsedFile, repo_id: &str) -> Result<IRDocument> {
        let plugin = self
            .registry
            .get(parsed.source.language)
            .ok_or_else(|| {
                IndexError::ir_generation("no language plugin").with_file(parsed.file_path())
            })?;

        let mut doc = IRDocument::new(repo_id, "");
        let mut ctx = FileCtx {
            repo_id,
            file_path: parsed.file_path(),
            language: parsed.source.language.name(),
            source: parsed.text(),
            plugin,
            scope: Vec::new(),
            doc: &mut doc,
        };

        let root = parsed.tree.root_node();
        let file_id = ctx.emit_file_node(&root);
        ctx.walk_scope(&root, &file_id, None);

        Ok(doc)
    }

    /// Build the repo-level document by merging per-file IR in sorted file
    /// order. Failed files are recorded `(path, error)`, never raised.
    pub fn build_document(
        &self,
        parsed_files: &[ParsedFile],
        repo_id: &str,
        snapshot_id: &str,
    ) -> (IRDocument, Vec<(String, String)>) {
        let mut doc = IRDocument::new(repo_id, snapshot_id);
        let mut failed = Vec::new();

        let mut sorted: Vec<&ParsedFile> = parsed_files.iter().collect();
        sorted.sort_by(|a, b| a.file_path().cmp(b.file_path()));

        for parsed in sorted {
            match self.build_file(parsed, repo_id) {
                Ok(file_doc) => doc.merge(file_doc),
                Err(e) => {
                    tracing::warn!(file = %parsed.file_path(), error = %e, "ir_file_failed");
                    failed.push((parsed.file_path().to_string(), e.to_string()));
                }
            }
        }

        (doc, failed)
    }
}

/// File path → dotted module path (`src/app/svc.py` → `app.svc`)
pub fn module_path_for(file_path: &str) -> String {
    let without_ext = file_path
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_path);
    let without_src = without_ext.strip_prefix("src/").unwrap_or(without_ext);
    without_src.replace('/', ".")
}

struct FileCtx<'a> {
    repo_id: &'a str,
    file_path: &'a str,
    language: &'a str,
    source: &'a str,
    plugin: &'a dyn LanguagePlugin,
    scope: Vec<String>,
    doc: &'a mut IRDocument,
}

impl<'a> FileCtx<'a> {
    fn text(&self, node: &TSNode) -> &str {
        self.source.get(node.byte_range()).unwrap_or("")
    }

    fn fqn_for(&self, name: &str) -> String {
        if self.scope.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.scope.join("."), name)
        }
    }

    fn contains_edge(&mut self, parent_id: &str, child_id: &str) {
        let edge = Edge::new(
            EdgeKind::Contains,
            parent_id,
            child_id,
            self.file_path,
            self.file_path,
            EdgeAttrs::None,
        );
        self.doc.edges.push(edge);
    }

    fn emit_file_node(&mut self, root: &TSNode) -> String {
        let module_path = module_path_for(self.file_path);
        let name = module_path
            .rsplit('.')
            .next()
            .unwrap_or(&module_path)
            .to_string();
        let id = node_id(
            NodeKind::File,
            self.repo_id,
            self.file_path,
            None,
            &name,
            &root.to_span(),
        );
        let node = NodeBuilder::new(
            id.clone(),
            NodeKind::File,
            name,
            module_path,
            self.file_path,
            root.to_span(),
            self.language,
        )
        .build();
        self.doc.nodes.push(node);
        id
    }

    /// Walk one scope level (module, class body, or function body) emitting
    /// definitions and import/variable statements.
    fn walk_scope(&mut self, scope_node: &TSNode, parent_id: &str, parent_class: Option<&str>) {
        let mut cursor = scope_node.walk();
        for child in scope_node.children(&mut cursor) {
            match child.kind() {
                "function_definition" | "function_declaration" | "method_definition" => {
                    self.emit_callable(&child, parent_id, parent_class);
                }
                "class_definition" | "class_declaration" => {
                    self.emit_class(&child, parent_id);
                }
                "decorated_definition" => {
                    if let Some(definition) = child.child_by_field_name("definition") {
                        match definition.kind() {
                            "class_definition" => self.emit_class(&definition, parent_id),
                            _ => self.emit_callable(&definition, parent_id, parent_class),
                        }
                    }
                }
                "import_statement" | "import_from_statement" => {
                    self.emit_imports(&child, parent_id);
                }
                "expression_statement" => {
                    // Module/class level assignments become Variable nodes;
                    // function locals belong to the DFG layer instead
                    let var_kind = if self.scope.is_empty() {
                        Some("module")
                    } else if parent_class.is_some() {
                        Some("class")
                    } else {
                        None
                    };
                    if let Some(var_kind) = var_kind {
                        let mut inner = child.walk();
                        for stmt in child.children(&mut inner) {
                            if stmt.kind() == "assignment" {
                                self.emit_scope_variable(&stmt, parent_id, var_kind);
                            }
                        }
                    }
                }
                // Control flow at module level can nest definitions
                "if_statement" | "try_statement" | "block" | "statement_block" => {
                    self.walk_scope(&child, parent_id, parent_class);
                }
                _ => {}
            }
        }
    }

    fn emit_callable(&mut self, node: &TSNode, parent_id: &str, parent_class: Option<&str>) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.text(&n).to_string(),
            None => return,
        };
        if name.is_empty() {
            return;
        }

        let kind = if parent_class.is_some() {
            NodeKind::Method
        } else {
            NodeKind::Function
        };
        let span = node.to_span();
        let id = node_id(kind, self.repo_id, self.file_path, parent_class, &name, &span);
        let fqn = self.fqn_for(&name);

        let mut is_async_cursor = node.walk();
        let is_async = node.children(&mut is_async_cursor).any(|c| c.kind() == "async");

        let visibility = if self.plugin.is_public(&name) {
            Visibility::Public
        } else {
            Visibility::Private
        };

        // Signature from parameters + return annotation
        let (params, param_type_ids, raw_params) = self.collect_parameters(node, &id);
        let return_type_id = node
            .child_by_field_name("return_type")
            .map(|rt| type_id(self.repo_id, self.text(&rt).trim()));

        let raw = format!(
            "{}({}){}",
            name,
            raw_params.join(", "),
            node.child_by_field_name("return_type")
                .map(|rt| format!(" -> {}", self.text(&rt).trim()))
                .unwrap_or_default()
        );
        let sig_id = format!("sig:{}:{}:{}", self.repo_id, self.file_path, raw);
        self.doc.signatures.push(SignatureEntity {
            id: sig_id.clone(),
            owner_node_id: id.clone(),
            name: name.clone(),
            raw: raw.clone(),
            parameter_type_ids: param_type_ids,
            return_type_id: return_type_id.clone(),
            is_async,
            is_static: false,
            visibility: Some(visibility),
            throws_type_ids: Vec::new(),
            signature_hash: Some(SignatureEntity::compute_hash(&raw)),
        });

        let body_span = node.child_by_field_name("body").map(|b| b.to_span());
        let mut builder = NodeBuilder::new(
            id.clone(),
            kind,
            name.clone(),
            fqn,
            self.file_path,
            span,
            self.language,
        )
        .parent_id(parent_id)
        .signature_id(sig_id)
        .attr("is_async", is_async)
        .attr(
            "visibility",
            if visibility == Visibility::Public {
                "public"
            } else {
                "private"
            },
        );
        if let Some(bs) = body_span {
            builder = builder.body_span(bs);
        }
        if let Some(rt) = return_type_id {
            builder = builder.declared_type_id(rt);
        }
        self.doc.nodes.push(builder.build());
        self.contains_edge(parent_id, &id);

        // Parameter variable nodes
        for (param_name, param_span, param_type) in params {
            let var_id = node_id(
                NodeKind::Variable,
                self.repo_id,
                self.file_path,
                None,
                &format!("{}.{}", name, param_name),
                &param_span,
            );
            let mut var_builder = NodeBuilder::new(
                var_id.clone(),
                NodeKind::Variable,
                param_name.clone(),
                format!("{}.{}", self.fqn_for(&name), param_name),
                self.file_path,
                param_span,
                self.language,
            )
            .parent_id(&id)
            .attr("var_kind", "parameter");
            if let Some(t) = param_type {
                var_builder = var_builder.declared_type_id(t);
            }
            self.doc.nodes.push(var_builder.build());
            self.contains_edge(&id, &var_id);
        }

        // Call sites within this callable's body feed CALLS edges at the
        // graph stage
        if let Some(body) = node.child_by_field_name("body") {
            let call_sites = self.collect_call_sites(&body);
            if !call_sites.is_empty() {
                if let Some(n) = self.doc.nodes.iter_mut().rfind(|n| n.id == id) {
                    n.attrs.insert("call_sites".into(), json!(call_sites));
                }
            }

            // Nested definitions
            self.scope.push(name.clone());
            self.walk_scope(&body, &id, None);
            self.scope.pop();
        }
    }

    fn emit_class(&mut self, node: &TSNode, parent_id: &str) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.text(&n).to_string(),
            None => return,
        };
        if name.is_empty() {
            return;
        }

        let span = node.to_span();
        let id = node_id(NodeKind::Class, self.repo_id, self.file_path, None, &name, &span);
        let fqn = self.fqn_for(&name);

        // Base classes feed INHERITS edges at the graph stage
        let mut base_classes: Vec<String> = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for base in superclasses.children(&mut cursor) {
                if matches!(base.kind(), "identifier" | "attribute") {
                    base_classes.push(self.text(&base).to_string());
                }
            }
        }

        let mut builder = NodeBuilder::new(
            id.clone(),
            NodeKind::Class,
            name.clone(),
            fqn,
            self.file_path,
            span,
            self.language,
        )
        .parent_id(parent_id)
        .attr(
            "visibility",
            if self.plugin.is_public(&name) {
                "public"
            } else {
                "private"
            },
        );
        if !base_classes.is_empty() {
            builder = builder.attr("base_classes", json!(base_classes));
        }
        self.doc.nodes.push(builder.build());
        self.contains_edge(parent_id, &id);

        if let Some(body) = node.child_by_field_name("body") {
            self.scope.push(name.clone());
            self.walk_scope(&body, &id, Some(&name));
            self.scope.pop();
        }
    }

    fn emit_imports(&mut self, node: &TSNode, file_id: &str) {
        let mut targets: Vec<String> = Vec::new();

        if node.kind() == "import_from_statement" {
            if let Some(module) = node.child_by_field_name("module_name") {
                targets.push(self.text(&module).to_string());
            }
        } else {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "dotted_name" => targets.push(self.text(&child).to_string()),
                    "aliased_import" => {
                        if let Some(name) = child.child_by_field_name("name") {
                            targets.push(self.text(&name).to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        for target in targets {
            if target.is_empty() {
                continue;
            }
            let target_id = format!("module:{}:{}", self.repo_id, target);
            let edge = Edge::new(
                EdgeKind::Imports,
                file_id,
                target_id,
                self.file_path,
                // Unknown until the graph stage resolves the module in-repo
                "",
                EdgeAttrs::Import {
                    path: target.clone(),
                },
            );
            self.doc.edges.push(edge);
        }
    }

    fn emit_scope_variable(&mut self, assignment: &TSNode, parent_id: &str, var_kind: &str) {
        let left = match assignment.child_by_field_name("left") {
            Some(l) if l.kind() == "identifier" => l,
            _ => return,
        };
        let name = self.text(&left).to_string();
        if name.is_empty() {
            return;
        }

        let span = left.to_span();
        let id = node_id(NodeKind::Variable, self.repo_id, self.file_path, None, &name, &span);
        // Re-assignments of the same module variable keep the first node
        if self.doc.nodes.iter().any(|n| n.name == name
            && n.kind == NodeKind::Variable
            && n.parent_id.as_deref() == Some(parent_id))
        {
            return;
        }

        let declared_type = assignment
            .child_by_field_name("type")
            .map(|t| type_id(self.repo_id, self.text(&t).trim()));

        let mut builder = NodeBuilder::new(
            id.clone(),
            NodeKind::Variable,
            name.clone(),
            self.fqn_for(&name),
            self.file_path,
            span,
            self.language,
        )
        .parent_id(parent_id)
        .attr("var_kind", var_kind);
        if let Some(t) = declared_type {
            builder = builder.declared_type_id(t);
        }
        self.doc.nodes.push(builder.build());
        self.contains_edge(parent_id, &id);
    }

    /// Returns (name, span, declared_type_id) triples, type IDs, and raw
    /// parameter strings
    fn collect_parameters(
        &self,
        func_node: &TSNode,
        _func_id: &str,
    ) -> (Vec<(String, Span, Option<String>)>, Vec<String>, Vec<String>) {
        let mut params = Vec::new();
        let mut type_ids = Vec::new();
        let mut raw = Vec::new();

        let parameters = match func_node.child_by_field_name("parameters") {
            Some(p) => p,
            None => return (params, type_ids, raw),
        };

        let mut cursor = parameters.walk();
        for param in parameters.children(&mut cursor) {
            let (name_node, type_node) = match param.kind() {
                "identifier" => (Some(param), None),
                "typed_parameter" => {
                    let name = param.child(0).filter(|c| c.kind() == "identifier");
                    (name, param.child_by_field_name("type"))
                }
                "default_parameter" | "typed_default_parameter" => (
                    param.child_by_field_name("name"),
                    param.child_by_field_name("type"),
                ),
                "required_parameter" | "optional_parameter" => (
                    param.child_by_field_name("pattern"),
                    param.child_by_field_name("type"),
                ),
                _ => (None, None),
            };

            let name_node = match name_node {
                Some(n) => n,
                None => continue,
            };
            let name = self.text(&name_node).to_string();
            if name.is_empty() {
                continue;
            }

            let declared_type = type_node.map(|t| {
                let text = self.text(&t).trim().trim_start_matches(':').trim().to_string();
                type_id(self.repo_id, &text)
            });
            if let Some(t) = &declared_type {
                type_ids.push(t.clone());
            }
            raw.push(self.text(&param).trim().to_string());
            params.push((name, name_node.to_span(), declared_type));
        }

        (params, type_ids, raw)
    }

    /// Call sites `(callee_name, line, arg_count)` within a body, skipping
    /// nested definition scopes
    fn collect_call_sites(&self, body: &TSNode) -> Vec<(String, u32, u32)> {
        let mut sites = Vec::new();
        let mut stack = vec![*body];

        while let Some(node) = stack.pop() {
            if matches!(
                node.kind(),
                "function_definition" | "class_definition" | "decorated_definition" | "lambda"
            ) {
                continue;
            }
            if node.kind() == "call" {
                if let Some(callee) = node.child_by_field_name("function") {
                    let callee_name = self.text(&callee).to_string();
                    let arg_count = node
                        .child_by_field_name("arguments")
                        .map(|args| {
                            let mut c = args.walk();
                            args.children(&mut c).filter(|a| a.is_named()).count() as u32
                        })
                        .unwrap_or(0);
                    sites.push((callee_name, node.start_position().row as u32 + 1, arg_count));
                }
            }
            let mut cursor = node.walk();
            let mut children: Vec<TSNode> = node.children(&mut cursor).collect();
            // Stack-based DFS visits in reverse; keep source order
            children.reverse();
            stack.extend(children);
        }

        sites
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::{parse_source, LanguageId, SourceFile};

    fn build(code: &str) -> IRDocument {
        let registry = Arc::new(ParserRegistry::with_defaults());
        let source = SourceFile::new("a.py", LanguageId::Python, code);
        let parsed = parse_source(&source).unwrap();
        IRBuilder::new(registry).build_file(&parsed, "r").unwrap()
    }

    #[test]
    fn test_trivial_function_ir() {
        let doc = build("def f(x):\n    return x + 1\n");
        let func = doc
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Function)
            .unwrap();
        assert_eq!(func.fqn, "f");
        assert_eq!(func.name, "f");
        assert!(func.signature_id.is_some());

        let param = doc
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Variable && n.name == "x")
            .unwrap();
        assert_eq!(param.attr_str("var_kind"), Some("parameter"));
        assert_eq!(param.parent_id.as_deref(), Some(func.id.as_str()));
    }

    #[test]
    fn test_method_fqn_and_kind() {
        let doc = build("class Svc:\n    def run(self):\n        pass\n");
        let method = doc
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Method)
            .unwrap();
        assert_eq!(method.fqn, "Svc.run");
        assert!(method.id.starts_with("method:r:a.py:Svc:run:"));
    }

    #[test]
    fn test_nested_function_fqn() {
        let doc = build("def outer():\n    def inner():\n        pass\n");
        let inner = doc.nodes.iter().find(|n| n.name == "inner").unwrap();
        assert_eq!(inner.fqn, "outer.inner");
        assert_eq!(inner.kind, NodeKind::Function);
    }

    #[test]
    fn test_typed_parameter_declares_type() {
        let doc = build("def f(x: int) -> str:\n    return str(x)\n");
        let param = doc
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Variable && n.name == "x")
            .unwrap();
        assert_eq!(param.declared_type_id.as_deref(), Some("type:r:int"));

        let sig = &doc.signatures[0];
        assert_eq!(sig.parameter_type_ids, vec!["type:r:int"]);
        assert_eq!(sig.return_type_id.as_deref(), Some("type:r:str"));
    }

    #[test]
    fn test_imports_emit_edges() {
        let doc = build("import os\nfrom collections import OrderedDict\n");
        let imports: Vec<&Edge> = doc
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Imports)
            .collect();
        assert_eq!(imports.len(), 2);
        assert!(imports
            .iter()
            .any(|e| e.attrs == EdgeAttrs::Import { path: "os".into() }));
    }

    #[test]
    fn test_call_sites_recorded() {
        let doc = build("def f():\n    g(1)\n    h(2, 3)\n");
        let func = doc.nodes.iter().find(|n| n.name == "f").unwrap();
        let sites = func.attrs.get("call_sites").unwrap().as_array().unwrap();
        assert_eq!(sites.len(), 2);
    }

    #[test]
    fn test_class_bases_recorded() {
        let doc = build("class Impl(Base):\n    pass\n");
        let class = doc.nodes.iter().find(|n| n.name == "Impl").unwrap();
        let bases = class.attrs.get("base_classes").unwrap().as_array().unwrap();
        assert_eq!(bases[0], "Base");
    }

    #[test]
    fn test_module_path_conversion() {
        assert_eq!(module_path_for("src/app/services/user.py"), "app.services.user");
        assert_eq!(module_path_for("app/models.py"), "app.models");
        assert_eq!(module_path_for("main.py"), "main");
    }

    #[test]
    fn test_build_document_sorted_and_failures_isolated() {
        let registry = Arc::new(ParserRegistry::with_defaults());
        let builder = IRBuilder::new(registry);
        let files = vec![
            parse_source(&SourceFile::new("b.py", LanguageId::Python, "def b():\n    pass\n"))
                .unwrap(),
            parse_source(&SourceFile::new("a.py", LanguageId::Python, "def a():\n    pass\n"))
                .unwrap(),
        ];
        let (doc, failed) = builder.build_document(&files, "r", "s");
        assert!(failed.is_empty());
        let file_nodes: Vec<&str> = doc
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::File)
            .map(|n| n.file_path.as_str())
            .collect();
        assert_eq!(file_nodes, vec!["a.py", "b.py"]);
    }
}
