//! Query helpers for higher layers
//!
//! Symbol lookup by FQN, bounded graph slices, and data-flow reachability.
//! Input validation happens at this boundary; malformed IDs are rejected
//! with a structured error before any stage code runs.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::features::data_flow::DfgSnapshot;
use crate::features::graph::GraphDocument;
use crate::shared::models::{Edge, IndexError, Node, Result};
use crate::shared::utils::id_gen::parse_node_id;

/// Direction for graph slices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceDirection {
    /// Edges out of the roots (what the roots depend on)
    Forward,
    /// Edges into the roots (what depends on the roots)
    Backward,
}

/// A bounded neighborhood of the symbol graph
#[derive(Debug, Clone, Default)]
pub struct GraphSlice {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Find symbols by exact FQN. Multiple files can define the same FQN;
/// results are sorted by node ID for determinism.
pub fn symbols_by_fqn<'a>(graph: &'a GraphDocument, fqn: &str) -> Vec<&'a Node> {
    let mut nodes: Vec<&Node> = graph
        .graph_nodes
        .values()
        .filter(|n| n.fqn == fqn)
        .collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    nodes
}

/// BFS neighborhood of `root_id` up to `max_depth` edges away.
pub fn graph_slice(
    graph: &GraphDocument,
    root_id: &str,
    direction: SliceDirection,
    max_depth: usize,
) -> Result<GraphSlice> {
    if parse_node_id(root_id).filter(|p| p.is_valid()).is_none() {
        return Err(IndexError::validation(format!("malformed node id: {}", root_id)));
    }
    if graph.get_node(root_id).is_none() {
        return Err(IndexError::validation(format!("unknown node: {}", root_id)));
    }

    // Adjacency over edge indices
    let mut adjacency: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, edge) in graph.graph_edges.iter().enumerate() {
        let key = match direction {
            SliceDirection::Forward => edge.source_id.as_str(),
            SliceDirection::Backward => edge.target_id.as_str(),
        };
        adjacency.entry(key).or_default().push(i);
    }

    let mut slice = GraphSlice::default();
    let mut visited_nodes: HashSet<&str> = HashSet::new();
    let mut visited_edges: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

    visited_nodes.insert(root_id);
    queue.push_back((root_id, 0));

    while let Some((node_id, depth)) = queue.pop_front() {
        if let Some(node) = graph.get_node(node_id) {
            slice.nodes.push(node.clone());
        }
        if depth >= max_depth {
            continue;
        }

        if let Some(edge_indices) = adjacency.get(node_id) {
            for &i in edge_indices {
                if !visited_edges.insert(i) {
                    continue;
                }
                let edge = &graph.graph_edges[i];
                slice.edges.push(edge.clone());

                let next = match direction {
                    SliceDirection::Forward => edge.target_id.as_str(),
                    SliceDirection::Backward => edge.source_id.as_str(),
                };
                if visited_nodes.insert(next) {
                    queue.push_back((next, depth + 1));
                }
            }
        }
    }

    slice.nodes.sort_by(|a, b| a.id.cmp(&b.id));
    slice.edges.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(slice)
}

/// Is there a data-flow path from `source_var_id` to `sink_var_id`?
/// Follows alias/assign/return_value/param_to_arg edges forward.
pub fn dfg_reachable(dfg: &DfgSnapshot, source_var_id: &str, sink_var_id: &str) -> bool {
    if source_var_id == sink_var_id {
        return true;
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &dfg.edges {
        adjacency
            .entry(edge.from_variable_id.as_str())
            .or_default()
            .push(edge.to_variable_id.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    visited.insert(source_var_id);
    queue.push_back(source_var_id);

    while let Some(current) = queue.pop_front() {
        if let Some(nexts) = adjacency.get(current) {
            for next in nexts {
                if *next == sink_var_id {
                    return true;
                }
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }

    false
}
