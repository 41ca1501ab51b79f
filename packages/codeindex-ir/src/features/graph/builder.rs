//! Graph builder
//!
//! Structural + semantic IR → symbol graph. Cross-file edges are resolved
//! only here, after all per-file IR exists: call sites, base classes, and
//! imports recorded by the IR builder become typed edges against resolved
//! targets.

use std::collections::HashMap;

use super::document::GraphDocument;
use crate::features::semantic_ir::expression::ExprKind;
use crate::features::semantic_ir::SemanticIrSnapshot;
use crate::shared::models::{Edge, EdgeAttrs, EdgeKind, IRDocument, Node, NodeKind, Result};

pub struct GraphBuilder;

impl GraphBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the full symbol graph for a document. The semantic snapshot,
    /// when present, refines edge typing (REFERENCES_TYPE, READS/WRITES).
    pub fn build_full(
        &self,
        ir_doc: &IRDocument,
        semantic: Option<&SemanticIrSnapshot>,
    ) -> Result<GraphDocument> {
        self.build(ir_doc, semantic, None)
    }

    /// Incremental build: the document covers only the changed files, so
    /// cross-file targets resolve through the existing graph as a fallback.
    pub fn build_incremental(
        &self,
        ir_doc: &IRDocument,
        semantic: Option<&SemanticIrSnapshot>,
        existing: &GraphDocument,
    ) -> Result<GraphDocument> {
        self.build(ir_doc, semantic, Some(existing))
    }

    fn build(
        &self,
        ir_doc: &IRDocument,
        semantic: Option<&SemanticIrSnapshot>,
        existing: Option<&GraphDocument>,
    ) -> Result<GraphDocument> {
        let mut doc = GraphDocument::new(&ir_doc.repo_id, &ir_doc.snapshot_id);

        for node in &ir_doc.nodes {
            doc.insert_node(node.clone());
        }

        // Document symbols first; existing-graph symbols from untouched
        // files serve as fallback targets
        let rebuilt_files: std::collections::HashSet<&str> =
            ir_doc.nodes.iter().map(|n| n.file_path.as_str()).collect();
        let fallback_nodes: Vec<&Node> = existing
            .map(|g| {
                g.graph_nodes
                    .values()
                    .filter(|n| !rebuilt_files.contains(n.file_path.as_str()))
                    .collect()
            })
            .unwrap_or_default();
        let resolver = SymbolResolver::new(ir_doc.nodes.iter().chain(fallback_nodes));

        // Structural edges carry over; imports retarget to in-repo files
        for edge in &ir_doc.edges {
            match edge.kind {
                EdgeKind::Imports => {
                    if let EdgeAttrs::Import { path } = &edge.attrs {
                        if let Some(target) = resolver.resolve_module(path) {
                            doc.push_edge(Edge::new(
                                EdgeKind::Imports,
                                edge.source_id.clone(),
                                target.id.clone(),
                                edge.source_file.clone(),
                                target.file_path.clone(),
                                edge.attrs.clone(),
                            ));
                            continue;
                        }
                    }
                    doc.push_edge(edge.clone());
                }
                _ => doc.push_edge(edge.clone()),
            }
        }

        self.emit_call_edges(&mut doc, ir_doc, &resolver);
        self.emit_inheritance_edges(&mut doc, ir_doc, &resolver);

        if let Some(snapshot) = semantic {
            self.emit_type_reference_edges(&mut doc, ir_doc, snapshot, &resolver);
            self.emit_read_write_edges(&mut doc, ir_doc, snapshot, &resolver);
        }

        tracing::debug!(
            nodes = doc.graph_nodes.len(),
            edges = doc.graph_edges.len(),
            "graph_build_completed"
        );

        Ok(doc)
    }

    /// CALLS edges from the call sites recorded on callable nodes
    fn emit_call_edges(&self, doc: &mut GraphDocument, ir_doc: &IRDocument, resolver: &SymbolResolver) {
        for node in &ir_doc.nodes {
            if !node.kind.is_callable() {
                continue;
            }
            let call_sites = match node.attrs.get("call_sites").and_then(|v| v.as_array()) {
                Some(sites) => sites,
                None => continue,
            };

            for site in call_sites {
                let (callee, line, arg_count) = match (
                    site.get(0).and_then(|v| v.as_str()),
                    site.get(1).and_then(|v| v.as_u64()),
                    site.get(2).and_then(|v| v.as_u64()),
                ) {
                    (Some(c), Some(l), Some(a)) => (c, l as u32, a as u32),
                    _ => continue,
                };

                if let Some(target) = resolver.resolve_callable(callee, &node.file_path) {
                    doc.push_edge(Edge::new(
                        EdgeKind::Calls,
                        node.id.clone(),
                        target.id.clone(),
                        node.file_path.clone(),
                        target.file_path.clone(),
                        EdgeAttrs::Call { line, arg_count },
                    ));
                }
            }
        }
    }

    /// INHERITS / IMPLEMENTS edges from recorded base-class lists
    fn emit_inheritance_edges(
        &self,
        doc: &mut GraphDocument,
        ir_doc: &IRDocument,
        resolver: &SymbolResolver,
    ) {
        for node in &ir_doc.nodes {
            if !node.kind.is_type() {
                continue;
            }
            let bases = match node.attrs.get("base_classes").and_then(|v| v.as_array()) {
                Some(b) => b,
                None => continue,
            };

            for (index, base) in bases.iter().enumerate() {
                let base_name = match base.as_str() {
                    Some(b) => b,
                    None => continue,
                };
                if let Some(target) = resolver.resolve_type(base_name, &node.file_path) {
                    let kind = if target.kind == NodeKind::Interface {
                        EdgeKind::Implements
                    } else {
                        EdgeKind::Inherits
                    };
                    doc.push_edge(Edge::new(
                        kind,
                        node.id.clone(),
                        target.id.clone(),
                        node.file_path.clone(),
                        target.file_path.clone(),
                        EdgeAttrs::Inherit {
                            index: index as u32,
                        },
                    ));
                }
            }
        }
    }

    /// REFERENCES_TYPE edges from declared annotations to in-repo classes,
    /// guided by the semantic type table
    fn emit_type_reference_edges(
        &self,
        doc: &mut GraphDocument,
        ir_doc: &IRDocument,
        snapshot: &SemanticIrSnapshot,
        _resolver: &SymbolResolver,
    ) {
        let declared_by: HashMap<&str, &str> = snapshot
            .types
            .iter()
            .filter_map(|t| {
                t.declared_by_node_id
                    .as_deref()
                    .map(|owner| (t.id.as_str(), owner))
            })
            .collect();

        for node in &ir_doc.nodes {
            let type_id = match &node.declared_type_id {
                Some(t) => t,
                None => continue,
            };
            if let Some(owner_id) = declared_by.get(type_id.as_str()) {
                if let Some(owner) = doc.get_node(owner_id).cloned() {
                    doc.push_edge(Edge::new(
                        EdgeKind::ReferencesType,
                        node.id.clone(),
                        owner.id,
                        node.file_path.clone(),
                        owner.file_path,
                        EdgeAttrs::None,
                    ));
                }
            }
        }
    }

    /// READS / WRITES edges from functions to module-level variables
    fn emit_read_write_edges(
        &self,
        doc: &mut GraphDocument,
        ir_doc: &IRDocument,
        snapshot: &SemanticIrSnapshot,
        _resolver: &SymbolResolver,
    ) {
        // module variables by (file, name)
        let module_vars: HashMap<(&str, &str), &Node> = ir_doc
            .nodes
            .iter()
            .filter(|n| {
                n.kind == NodeKind::Variable && n.attr_str("var_kind") == Some("module")
            })
            .map(|n| ((n.file_path.as_str(), n.name.as_str()), n))
            .collect();
        if module_vars.is_empty() {
            return;
        }

        // functions by fqn, for expression attribution
        let functions_by_fqn: HashMap<&str, &Node> = ir_doc
            .nodes
            .iter()
            .filter(|n| n.kind.is_callable())
            .map(|n| (n.fqn.as_str(), n))
            .collect();

        let mut seen: std::collections::HashSet<(String, String, EdgeKind)> =
            std::collections::HashSet::new();

        for expr in &snapshot.expressions {
            let func = match expr
                .function_fqn
                .as_deref()
                .and_then(|fqn| functions_by_fqn.get(fqn))
            {
                Some(f) => *f,
                None => continue,
            };

            if expr.kind == ExprKind::NameLoad {
                for name in &expr.reads_vars {
                    if let Some(var) = module_vars.get(&(expr.file_path.as_str(), name.as_str())) {
                        if seen.insert((func.id.clone(), var.id.clone(), EdgeKind::Reads)) {
                            doc.push_edge(Edge::new(
                                EdgeKind::Reads,
                                func.id.clone(),
                                var.id.clone(),
                                func.file_path.clone(),
                                var.file_path.clone(),
                                EdgeAttrs::None,
                            ));
                        }
                    }
                }
            }

            if let Some(name) = &expr.defines_var {
                if let Some(var) = module_vars.get(&(expr.file_path.as_str(), name.as_str())) {
                    if seen.insert((func.id.clone(), var.id.clone(), EdgeKind::Writes)) {
                        doc.push_edge(Edge::new(
                            EdgeKind::Writes,
                            func.id.clone(),
                            var.id.clone(),
                            func.file_path.clone(),
                            var.file_path.clone(),
                            EdgeAttrs::None,
                        ));
                    }
                }
            }
        }
    }
}

/// Name → node resolution over one document. Same-file definitions win over
/// definitions elsewhere; lookups are deterministic (sorted candidates).
struct SymbolResolver<'a> {
    callables_by_name: HashMap<&'a str, Vec<&'a Node>>,
    types_by_name: HashMap<&'a str, Vec<&'a Node>>,
    files_by_module: HashMap<&'a str, &'a Node>,
}

impl<'a> SymbolResolver<'a> {
    fn new(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut callables_by_name: HashMap<&str, Vec<&Node>> = HashMap::new();
        let mut types_by_name: HashMap<&str, Vec<&Node>> = HashMap::new();
        let mut files_by_module: HashMap<&str, &Node> = HashMap::new();

        for node in nodes {
            match node.kind {
                NodeKind::Function | NodeKind::Method => {
                    callables_by_name.entry(&node.name).or_default().push(node);
                }
                NodeKind::Class | NodeKind::Interface => {
                    types_by_name.entry(&node.name).or_default().push(node);
                }
                NodeKind::File => {
                    files_by_module.insert(&node.fqn, node);
                }
                _ => {}
            }
        }

        for list in callables_by_name.values_mut() {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }
        for list in types_by_name.values_mut() {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }

        Self {
            callables_by_name,
            types_by_name,
            files_by_module,
        }
    }

    fn resolve_callable(&self, callee: &str, from_file: &str) -> Option<&'a Node> {
        // `obj.method` resolves on the method name
        let name = callee.rsplit('.').next().unwrap_or(callee);
        let candidates = self.callables_by_name.get(name)?;
        candidates
            .iter()
            .find(|n| n.file_path == from_file)
            .or_else(|| candidates.first())
            .copied()
    }

    fn resolve_type(&self, name: &str, from_file: &str) -> Option<&'a Node> {
        let name = name.rsplit('.').next().unwrap_or(name);
        let candidates = self.types_by_name.get(name)?;
        candidates
            .iter()
            .find(|n| n.file_path == from_file)
            .or_else(|| candidates.first())
            .copied()
    }

    fn resolve_module(&self, module_path: &str) -> Option<&'a Node> {
        self.files_by_module.get(module_path).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir::IRBuilder;
    use crate::features::parsing::{parse_source, LanguageId, ParserRegistry, SourceFile, SourceMap};
    use crate::features::semantic_ir::SemanticIrBuilder;
    use std::sync::Arc;

    fn build_graph(files: &[(&str, &str)]) -> GraphDocument {
        let registry = Arc::new(ParserRegistry::with_defaults());
        let ir_builder = IRBuilder::new(registry.clone());

        let mut parsed_files = Vec::new();
        let mut source_map = SourceMap::new();
        for (path, code) in files {
            let parsed =
                parse_source(&SourceFile::new(*path, LanguageId::Python, *code)).unwrap();
            source_map.insert(path.to_string(), parsed.clone());
            parsed_files.push(parsed);
        }

        let (doc, _) = ir_builder.build_document(&parsed_files, "r", "s");
        let semantic_builder = SemanticIrBuilder::new(registry);
        let (snapshot, _) = semantic_builder.build_full(&doc, &source_map).unwrap();

        GraphBuilder::new().build_full(&doc, Some(&snapshot)).unwrap()
    }

    #[test]
    fn test_cross_file_call_edge() {
        let graph = build_graph(&[
            ("a.py", "from b import g\n\ndef f():\n    g()\n"),
            ("b.py", "def g():\n    return 1\n"),
        ]);

        let call = graph
            .graph_edges
            .iter()
            .find(|e| e.kind == EdgeKind::Calls)
            .expect("CALLS edge");
        assert_eq!(call.source_file, "a.py");
        assert_eq!(call.target_file, "b.py");
    }

    #[test]
    fn test_import_retargets_to_file_node() {
        let graph = build_graph(&[
            ("a.py", "import b\n"),
            ("b.py", "x = 1\n"),
        ]);

        let import = graph
            .graph_edges
            .iter()
            .find(|e| e.kind == EdgeKind::Imports)
            .unwrap();
        assert_eq!(import.target_file, "b.py");
        assert!(import.target_id.starts_with("file:r:b.py"));
    }

    #[test]
    fn test_inherits_edge_with_index() {
        let graph = build_graph(&[(
            "a.py",
            "class Base:\n    pass\n\nclass Impl(Base):\n    pass\n",
        )]);

        let inherit = graph
            .graph_edges
            .iter()
            .find(|e| e.kind == EdgeKind::Inherits)
            .unwrap();
        assert_eq!(inherit.attrs, EdgeAttrs::Inherit { index: 0 });
    }

    #[test]
    fn test_same_file_call_preferred() {
        let graph = build_graph(&[
            ("a.py", "def g():\n    pass\n\ndef f():\n    g()\n"),
            ("b.py", "def g():\n    pass\n"),
        ]);

        let call = graph
            .graph_edges
            .iter()
            .find(|e| e.kind == EdgeKind::Calls)
            .unwrap();
        assert_eq!(call.target_file, "a.py");
    }

    #[test]
    fn test_reads_writes_module_variables() {
        let graph = build_graph(&[(
            "a.py",
            "counter = 0\n\ndef bump():\n    counter = counter + 1\n",
        )]);

        assert!(graph.graph_edges.iter().any(|e| e.kind == EdgeKind::Writes));
    }

    #[test]
    fn test_incremental_resolves_against_existing_graph() {
        // Full graph over both files, then rebuild only a.py: the CALLS
        // edge into b.py must survive via the existing-graph fallback
        let full = build_graph(&[
            ("a.py", "from b import g\n\ndef f():\n    g()\n"),
            ("b.py", "def g():\n    return 1\n"),
        ]);

        let registry = Arc::new(ParserRegistry::with_defaults());
        let parsed =
            parse_source(&SourceFile::new("a.py", LanguageId::Python, "from b import g\n\ndef f():\n    g()\n"))
                .unwrap();
        let mut source_map = SourceMap::new();
        source_map.insert("a.py".to_string(), parsed.clone());

        let (partial_doc, _) = IRBuilder::new(registry.clone()).build_document(
            std::slice::from_ref(&parsed),
            "r",
            "s",
        );
        let (snapshot, _) = SemanticIrBuilder::new(registry)
            .build_full(&partial_doc, &source_map)
            .unwrap();

        let rebuilt = GraphBuilder::new()
            .build_incremental(&partial_doc, Some(&snapshot), &full)
            .unwrap();

        let call = rebuilt
            .graph_edges
            .iter()
            .find(|e| e.kind == EdgeKind::Calls)
            .expect("CALLS edge resolved through fallback");
        assert_eq!(call.target_file, "b.py");
    }

    #[test]
    fn test_determinism_same_input_same_edges() {
        let files = &[
            ("a.py", "from b import g\n\ndef f():\n    g()\n"),
            ("b.py", "def g():\n    return 1\n"),
        ];
        let g1 = build_graph(files);
        let g2 = build_graph(files);

        let mut e1: Vec<String> = g1.graph_edges.iter().map(|e| format!("{:?}", e.identity())).collect();
        let mut e2: Vec<String> = g2.graph_edges.iter().map(|e| format!("{:?}", e.identity())).collect();
        e1.sort();
        e2.sort();
        assert_eq!(e1, e2);
        assert_eq!(
            g1.graph_nodes.keys().collect::<std::collections::BTreeSet<_>>(),
            g2.graph_nodes.keys().collect::<std::collections::BTreeSet<_>>()
        );
    }
}
