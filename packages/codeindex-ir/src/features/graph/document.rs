//! Graph document
//!
//! The shared in-memory symbol graph: nodes in a flat arena keyed by stable
//! ID, edges referencing IDs (never direct links), plus an edge-by-id index
//! for validation paths.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::shared::models::{Edge, Node, NodeKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    pub repo_id: String,
    pub snapshot_id: String,
    /// Flat arena keyed by stable node ID
    pub graph_nodes: HashMap<String, Node>,
    pub graph_edges: Vec<Edge>,
    #[serde(skip)]
    edge_index: HashMap<String, usize>,
}

impl GraphDocument {
    pub fn new(repo_id: impl Into<String>, snapshot_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            snapshot_id: snapshot_id.into(),
            graph_nodes: HashMap::new(),
            graph_edges: Vec::new(),
            edge_index: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.graph_nodes.is_empty()
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.graph_nodes.get(id)
    }

    pub fn edge_by_id(&self, edge_id: &str) -> Option<&Edge> {
        self.edge_index
            .get(edge_id)
            .and_then(|&i| self.graph_edges.get(i))
    }

    pub fn insert_node(&mut self, node: Node) {
        self.graph_nodes.insert(node.id.clone(), node);
    }

    pub fn push_edge(&mut self, edge: Edge) {
        self.edge_index
            .insert(edge.id.clone(), self.graph_edges.len());
        self.graph_edges.push(edge);
    }

    /// Rebuild the edge index (after deserialization or bulk edits)
    pub fn rebuild_edge_index(&mut self) {
        self.edge_index = self
            .graph_edges
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
    }

    pub fn node_ids_for_files(&self, files: &HashSet<String>) -> HashSet<String> {
        self.graph_nodes
            .values()
            .filter(|n| files.contains(&n.file_path))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Remove all nodes of the given files along with their outbound edges.
    /// Inbound edges from other files survive (they get marked, not
    /// deleted). Returns the removed node count.
    pub fn remove_nodes_for_files(&mut self, files: &HashSet<String>) -> usize {
        let before = self.graph_nodes.len();
        self.graph_nodes.retain(|_, n| !files.contains(&n.file_path));
        self.graph_edges.retain(|e| !files.contains(&e.source_file));
        self.rebuild_edge_index();
        before - self.graph_nodes.len()
    }

    /// Remove outbound edges of the given files, keeping the nodes so
    /// inbound edges retain their endpoints. Returns the removed edge count.
    pub fn remove_outbound_edges_for_files(&mut self, files: &HashSet<String>) -> usize {
        let before = self.graph_edges.len();
        self.graph_edges.retain(|e| !files.contains(&e.source_file));
        self.rebuild_edge_index();
        before - self.graph_edges.len()
    }

    /// Remove module-level nodes with no remaining children
    pub fn remove_orphan_file_nodes(&mut self) -> usize {
        let referenced: HashSet<&str> = self
            .graph_nodes
            .values()
            .filter_map(|n| n.parent_id.as_deref())
            .collect();

        let orphans: Vec<String> = self
            .graph_nodes
            .values()
            .filter(|n| matches!(n.kind, NodeKind::File | NodeKind::Module))
            .filter(|n| !referenced.contains(n.id.as_str()))
            .filter(|n| {
                // A file node with no CONTAINS edge left is orphaned
                !self
                    .graph_edges
                    .iter()
                    .any(|e| e.source_id == n.id || e.target_id == n.id)
            })
            .map(|n| n.id.clone())
            .collect();

        for id in &orphans {
            self.graph_nodes.remove(id);
        }
        orphans.len()
    }

    /// Merge another document. On ID collision the incoming node/edge
    /// replaces the stored attributes (upsert-as-replace).
    pub fn upsert(&mut self, other: &GraphDocument) {
        for node in other.graph_nodes.values() {
            self.graph_nodes.insert(node.id.clone(), node.clone());
        }
        for edge in &other.graph_edges {
            if let Some(&i) = self.edge_index.get(&edge.id) {
                self.graph_edges[i] = edge.clone();
            } else {
                self.edge_index
                    .insert(edge.id.clone(), self.graph_edges.len());
                self.graph_edges.push(edge.clone());
            }
        }
    }

    /// Rewrite the file-path locators after a rename; node IDs stay as the
    /// new build produced them, edges get their file markers updated
    pub fn rewrite_file_path(&mut self, old_path: &str, new_path: &str) {
        for node in self.graph_nodes.values_mut() {
            if node.file_path == old_path {
                node.file_path = new_path.to_string();
            }
        }
        for edge in &mut self.graph_edges {
            if edge.source_file == old_path {
                edge.source_file = new_path.to_string();
            }
            if edge.target_file == old_path {
                edge.target_file = new_path.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{EdgeAttrs, EdgeKind, NodeBuilder, Span};

    fn node(id: &str, file: &str) -> Node {
        NodeBuilder::new(
            id,
            NodeKind::Function,
            "f",
            "f",
            file,
            Span::new(1, 0, 2, 0),
            "python",
        )
        .build()
    }

    fn edge(kind: EdgeKind, source: &str, target: &str, sf: &str, tf: &str) -> Edge {
        Edge::new(kind, source, target, sf, tf, EdgeAttrs::None)
    }

    #[test]
    fn test_remove_nodes_keeps_inbound_edges() {
        let mut doc = GraphDocument::new("r", "s");
        doc.insert_node(node("f1", "a.py"));
        doc.insert_node(node("g1", "b.py"));
        doc.push_edge(edge(EdgeKind::Calls, "f1", "g1", "a.py", "b.py"));

        let removed = doc.remove_nodes_for_files(&HashSet::from(["b.py".to_string()]));
        assert_eq!(removed, 1);
        // The inbound CALLS edge from a.py survives for stale marking
        assert_eq!(doc.graph_edges.len(), 1);
        assert!(doc.get_node("g1").is_none());
    }

    #[test]
    fn test_remove_outbound_edges_keeps_nodes() {
        let mut doc = GraphDocument::new("r", "s");
        doc.insert_node(node("f1", "a.py"));
        doc.insert_node(node("g1", "b.py"));
        doc.push_edge(edge(EdgeKind::Calls, "f1", "g1", "a.py", "b.py"));

        let removed = doc.remove_outbound_edges_for_files(&HashSet::from(["a.py".to_string()]));
        assert_eq!(removed, 1);
        assert!(doc.get_node("f1").is_some());
    }

    #[test]
    fn test_upsert_replaces_on_collision() {
        let mut doc = GraphDocument::new("r", "s");
        let mut n = node("f1", "a.py");
        n.attrs.insert("v".into(), serde_json::json!(1));
        doc.insert_node(n);

        let mut other = GraphDocument::new("r", "s");
        let mut n2 = node("f1", "a.py");
        n2.attrs.insert("v".into(), serde_json::json!(2));
        other.insert_node(n2);

        doc.upsert(&other);
        assert_eq!(doc.graph_nodes.len(), 1);
        assert_eq!(doc.get_node("f1").unwrap().attrs["v"], serde_json::json!(2));
    }

    #[test]
    fn test_edge_by_id_lookup() {
        let mut doc = GraphDocument::new("r", "s");
        let e = edge(EdgeKind::Calls, "f1", "g1", "a.py", "b.py");
        let id = e.id.clone();
        doc.push_edge(e);
        assert!(doc.edge_by_id(&id).is_some());
        assert!(doc.edge_by_id("missing").is_none());
    }

    #[test]
    fn test_rewrite_file_path() {
        let mut doc = GraphDocument::new("r", "s");
        doc.insert_node(node("f1", "a.py"));
        doc.push_edge(edge(EdgeKind::Calls, "f1", "g1", "a.py", "b.py"));

        doc.rewrite_file_path("a.py", "src/a.py");
        assert_eq!(doc.get_node("f1").unwrap().file_path, "src/a.py");
        assert_eq!(doc.graph_edges[0].source_file, "src/a.py");
    }
}
