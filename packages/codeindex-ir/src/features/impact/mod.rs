//! Graph impact analysis
//!
//! Detects symbol-level changes between two graph snapshots and computes
//! the affected closure over reference edges with a bounded BFS.

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::features::graph::GraphDocument;
use crate::shared::models::EdgeKind;

pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const DEFAULT_MAX_AFFECTED: usize = 500;

/// How a symbol changed between snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolChangeType {
    Modified,
    Deleted,
    SignatureChanged,
}

/// One changed symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolChange {
    pub symbol_id: String,
    pub fqn: String,
    pub file_path: String,
    pub change_type: SymbolChangeType,
}

/// Result of impact analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImpactResult {
    pub direct_affected: HashSet<String>,
    pub transitive_affected: HashSet<String>,
    pub affected_files: HashSet<String>,
    /// change root → one affected path (for explanations)
    pub impact_chains: HashMap<String, Vec<String>>,
}

/// Classify each symbol of the changed files as MODIFIED, DELETED, or
/// SIGNATURE_CHANGED (signature hash or declared types differ).
pub fn detect_symbol_changes(
    old_graph: &GraphDocument,
    new_graph: &GraphDocument,
    changed_files: &HashSet<String>,
) -> Vec<SymbolChange> {
    let mut changes = Vec::new();

    for node in old_graph.graph_nodes.values() {
        if !changed_files.contains(&node.file_path) {
            continue;
        }

        match new_graph.get_node(&node.id) {
            None => changes.push(SymbolChange {
                symbol_id: node.id.clone(),
                fqn: node.fqn.clone(),
                file_path: node.file_path.clone(),
                change_type: SymbolChangeType::Deleted,
            }),
            Some(new_node) => {
                let change_type = if node.signature_id != new_node.signature_id
                    || node.declared_type_id != new_node.declared_type_id
                {
                    SymbolChangeType::SignatureChanged
                } else {
                    SymbolChangeType::Modified
                };
                changes.push(SymbolChange {
                    symbol_id: node.id.clone(),
                    fqn: node.fqn.clone(),
                    file_path: node.file_path.clone(),
                    change_type,
                });
            }
        }
    }

    // Symbols added by the change are MODIFIED from the callers' view
    for node in new_graph.graph_nodes.values() {
        if changed_files.contains(&node.file_path) && old_graph.get_node(&node.id).is_none() {
            changes.push(SymbolChange {
                symbol_id: node.id.clone(),
                fqn: node.fqn.clone(),
                file_path: node.file_path.clone(),
                change_type: SymbolChangeType::Modified,
            });
        }
    }

    changes.sort_by(|a, b| a.symbol_id.cmp(&b.symbol_id));
    changes
}

/// Bounded-BFS impact analyzer over reference edges.
pub struct GraphImpactAnalyzer {
    max_depth: usize,
    max_affected: usize,
}

impl GraphImpactAnalyzer {
    pub fn new(max_depth: usize, max_affected: usize) -> Self {
        Self {
            max_depth,
            max_affected,
        }
    }

    /// Direct: symbols with a reference edge into the change set.
    /// Transitive: BFS over the same edges up to `max_depth`, capped at
    /// `max_affected` symbols total.
    pub fn analyze_impact(&self, graph: &GraphDocument, changes: &[SymbolChange]) -> ImpactResult {
        let mut result = ImpactResult::default();
        if changes.is_empty() {
            return result;
        }

        // Reverse reference graph: target → source means "source depends on
        // target"
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
        let mut reverse: DiGraph<&str, EdgeKind> = DiGraph::new();

        for edge in &graph.graph_edges {
            if !matches!(
                edge.kind,
                EdgeKind::Calls
                    | EdgeKind::ReferencesSymbol
                    | EdgeKind::ReferencesType
                    | EdgeKind::Inherits
                    | EdgeKind::Implements
            ) {
                continue;
            }
            let target = *indices
                .entry(edge.target_id.as_str())
                .or_insert_with(|| reverse.add_node(edge.target_id.as_str()));
            let source = *indices
                .entry(edge.source_id.as_str())
                .or_insert_with(|| reverse.add_node(edge.source_id.as_str()));
            reverse.add_edge(target, source, edge.kind);
        }

        // BFS from every change root
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, usize, String)> = VecDeque::new();

        for change in changes {
            if let Some(&idx) = indices.get(change.symbol_id.as_str()) {
                queue.push_back((idx, 0, change.symbol_id.clone()));
                visited.insert(idx);
            }
        }

        while let Some((idx, depth, root)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }
            if result.transitive_affected.len() >= self.max_affected {
                tracing::warn!(
                    max_affected = self.max_affected,
                    "impact_analysis_truncated"
                );
                break;
            }

            let mut neighbors: Vec<NodeIndex> = reverse.neighbors(idx).collect();
            neighbors.sort();
            for neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let symbol_id = reverse[neighbor].to_string();

                if depth == 0 {
                    result.direct_affected.insert(symbol_id.clone());
                }
                result.transitive_affected.insert(symbol_id.clone());

                result
                    .impact_chains
                    .entry(root.clone())
                    .or_default()
                    .push(symbol_id.clone());

                if let Some(node) = graph.get_node(&symbol_id) {
                    result.affected_files.insert(node.file_path.clone());
                }

                queue.push_back((neighbor, depth + 1, root.clone()));
            }
        }

        tracing::info!(
            direct = result.direct_affected.len(),
            transitive = result.transitive_affected.len(),
            files = result.affected_files.len(),
            "impact_analysis_completed"
        );

        result
    }
}

impl Default for GraphImpactAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH, DEFAULT_MAX_AFFECTED)
    }
}
