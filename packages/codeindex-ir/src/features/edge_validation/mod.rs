//! Edge validator with stale marking
//!
//! Lazy consistency layer for cross-file backward edges under incremental
//! indexing:
//!
//! 1. Stale marking: edges referencing symbols in changed files are marked
//!    stale, not deleted.
//! 2. Lazy validation: edges are (re)validated on the query path.
//! 3. Cleanup: entries past their TTL are reaped.
//!
//! Stale information is advisory; queries may still return a stale edge,
//! flagged. State is in-memory per validator instance, keyed by repo;
//! backends wanting durability can snapshot `get_stale_edges` output.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::features::graph::GraphDocument;

pub const DEFAULT_STALE_TTL_HOURS: f64 = 24.0;

/// Edge status on the validation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    Valid,
    Stale,
    Invalid,
    Pending,
}

/// Why an edge was marked stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    TargetModified,
    TargetDeleted,
}

/// A stale-marked edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleEdgeInfo {
    pub edge_id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_kind: String,
    pub marked_at: DateTime<Utc>,
    pub reason: StaleReason,
    pub source_file: Option<String>,
    pub target_file: Option<String>,
}

/// Validation outcome for one edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub edge_id: String,
    pub status: EdgeStatus,
    pub message: Option<String>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationResult {
    fn new(edge_id: &str, status: EdgeStatus, message: Option<&str>) -> Self {
        Self {
            edge_id: edge_id.to_string(),
            status,
            message: message.map(String::from),
            validated_at: Utc::now(),
        }
    }
}

/// Aggregate stale statistics for a repo
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaleStats {
    pub total_stale: usize,
    pub by_reason: HashMap<String, usize>,
    pub by_kind: HashMap<String, usize>,
    pub source_files_affected: usize,
}

pub struct EdgeValidator {
    stale_ttl_hours: f64,
    /// repo_id → {edge_id → StaleEdgeInfo}
    stale_cache: DashMap<String, HashMap<String, StaleEdgeInfo>>,
}

impl EdgeValidator {
    pub fn new(stale_ttl_hours: f64) -> Self {
        Self {
            stale_ttl_hours,
            stale_cache: DashMap::new(),
        }
    }

    /// Mark cross-file backward edges into changed files as stale.
    ///
    /// An edge qualifies when its kind is a cross-file reference kind, its
    /// target sits in a changed file, and its source file is unchanged and
    /// different from the target file (changed sources get rebuilt anyway).
    pub fn mark_stale_edges(
        &self,
        repo_id: &str,
        changed_files: &HashSet<String>,
        graph: &GraphDocument,
    ) -> Vec<StaleEdgeInfo> {
        let changed_symbol_ids: HashSet<&str> = graph
            .graph_nodes
            .values()
            .filter(|n| changed_files.contains(&n.file_path))
            .map(|n| n.id.as_str())
            .collect();

        if changed_symbol_ids.is_empty() {
            return Vec::new();
        }

        let now = Utc::now();
        let mut marked = Vec::new();

        for edge in &graph.graph_edges {
            if !changed_symbol_ids.contains(edge.target_id.as_str()) {
                continue;
            }
            if !edge.kind.is_cross_file_reference() {
                continue;
            }
            if edge.source_file == edge.target_file {
                continue;
            }
            if changed_files.contains(&edge.source_file) {
                continue;
            }

            let info = StaleEdgeInfo {
                edge_id: edge.id.clone(),
                source_id: edge.source_id.clone(),
                target_id: edge.target_id.clone(),
                edge_kind: edge.kind.as_str().to_string(),
                marked_at: now,
                reason: StaleReason::TargetModified,
                source_file: Some(edge.source_file.clone()),
                target_file: Some(edge.target_file.clone()),
            };

            self.stale_cache
                .entry(repo_id.to_string())
                .or_default()
                .insert(edge.id.clone(), info.clone());
            marked.push(info);
        }

        tracing::info!(
            repo_id,
            changed_files = changed_files.len(),
            stale_count = marked.len(),
            "stale_edges_marked"
        );

        marked
    }

    /// Mark inbound edges of deleted symbols as invalid
    /// (`reason = target_deleted`).
    pub fn mark_deleted_symbol_edges(
        &self,
        repo_id: &str,
        deleted_symbol_ids: &HashSet<String>,
        graph: &GraphDocument,
    ) -> Vec<StaleEdgeInfo> {
        let now = Utc::now();
        let mut marked = Vec::new();

        for edge in &graph.graph_edges {
            if !deleted_symbol_ids.contains(&edge.target_id) {
                continue;
            }

            let source_file = graph
                .get_node(&edge.source_id)
                .map(|n| n.file_path.clone());

            let info = StaleEdgeInfo {
                edge_id: edge.id.clone(),
                source_id: edge.source_id.clone(),
                target_id: edge.target_id.clone(),
                edge_kind: edge.kind.as_str().to_string(),
                marked_at: now,
                reason: StaleReason::TargetDeleted,
                source_file,
                target_file: None,
            };

            self.stale_cache
                .entry(repo_id.to_string())
                .or_default()
                .insert(edge.id.clone(), info.clone());
            marked.push(info);
        }

        tracing::info!(repo_id, invalid_count = marked.len(), "deleted_symbol_edges_marked");

        marked
    }

    /// Lazy validation on the query path.
    ///
    /// Non-stale edges are VALID. For stale edges: a still-existing target
    /// with reason `target_modified` revalidates to VALID and drops the
    /// stale record; a missing target or `target_deleted` is INVALID.
    pub fn validate_edges(
        &self,
        repo_id: &str,
        edge_ids: &[String],
        graph: &GraphDocument,
    ) -> HashMap<String, ValidationResult> {
        let mut results = HashMap::new();
        let mut cache = self.stale_cache.entry(repo_id.to_string()).or_default();

        for edge_id in edge_ids {
            let stale_info = match cache.get(edge_id) {
                Some(info) => info.clone(),
                None => {
                    results.insert(
                        edge_id.clone(),
                        ValidationResult::new(edge_id, EdgeStatus::Valid, None),
                    );
                    continue;
                }
            };

            let edge = match graph.edge_by_id(edge_id) {
                Some(e) => e,
                None => {
                    results.insert(
                        edge_id.clone(),
                        ValidationResult::new(edge_id, EdgeStatus::Invalid, Some("edge_not_found")),
                    );
                    continue;
                }
            };

            // A deletion-marked edge stays invalid even if a node with the
            // same ID is later recreated
            if stale_info.reason == StaleReason::TargetDeleted {
                results.insert(
                    edge_id.clone(),
                    ValidationResult::new(edge_id, EdgeStatus::Invalid, Some("target_was_deleted")),
                );
                continue;
            }

            if graph.get_node(&edge.target_id).is_none() {
                results.insert(
                    edge_id.clone(),
                    ValidationResult::new(edge_id, EdgeStatus::Invalid, Some("target_deleted")),
                );
                continue;
            }

            if graph.get_node(&edge.source_id).is_none() {
                results.insert(
                    edge_id.clone(),
                    ValidationResult::new(edge_id, EdgeStatus::Invalid, Some("source_deleted")),
                );
                continue;
            }

            // Target still exists after modification: edge is good again
            cache.remove(edge_id);
            results.insert(
                edge_id.clone(),
                ValidationResult::new(edge_id, EdgeStatus::Valid, Some("revalidated")),
            );
        }

        results
    }

    pub fn is_edge_stale(&self, repo_id: &str, edge_id: &str) -> bool {
        self.stale_cache
            .get(repo_id)
            .map(|cache| cache.contains_key(edge_id))
            .unwrap_or(false)
    }

    pub fn get_stale_edges(&self, repo_id: &str) -> Vec<StaleEdgeInfo> {
        self.stale_cache
            .get(repo_id)
            .map(|cache| cache.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Files whose outbound edges contain stale entries; candidates for
    /// follow-up reindexing
    pub fn get_stale_source_files(&self, repo_id: &str) -> HashSet<String> {
        self.stale_cache
            .get(repo_id)
            .map(|cache| {
                cache
                    .values()
                    .filter_map(|info| info.source_file.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reap entries past the TTL; validates against the graph when one is
    /// supplied; `force` drops everything. Returns the removed count.
    pub fn cleanup_stale_edges(
        &self,
        repo_id: &str,
        graph: Option<&GraphDocument>,
        force: bool,
    ) -> usize {
        let mut removed = 0;
        let now = Utc::now();
        let ttl = Duration::seconds((self.stale_ttl_hours * 3600.0) as i64);

        let to_remove: Vec<String> = {
            let cache = match self.stale_cache.get(repo_id) {
                Some(c) => c,
                None => return 0,
            };

            cache
                .iter()
                .filter(|(_, info)| {
                    if force {
                        return true;
                    }
                    if now - info.marked_at > ttl {
                        return true;
                    }
                    if let Some(g) = graph {
                        // Missing target means the entry can never revalidate
                        if g.edge_by_id(&info.edge_id)
                            .map(|e| g.get_node(&e.target_id).is_none())
                            .unwrap_or(true)
                        {
                            return true;
                        }
                    }
                    false
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        if let Some(mut cache) = self.stale_cache.get_mut(repo_id) {
            for edge_id in to_remove {
                if cache.remove(&edge_id).is_some() {
                    removed += 1;
                }
            }
        }

        tracing::info!(repo_id, removed_count = removed, "stale_edges_cleaned");
        removed
    }

    /// Drop stale entries touching a file after it has been reindexed.
    /// Returns the removed count.
    pub fn clear_stale_for_file(&self, repo_id: &str, file_path: &str) -> usize {
        let mut cache = match self.stale_cache.get_mut(repo_id) {
            Some(c) => c,
            None => return 0,
        };

        let to_remove: Vec<String> = cache
            .iter()
            .filter(|(_, info)| {
                info.source_file.as_deref() == Some(file_path)
                    || info.target_file.as_deref() == Some(file_path)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for edge_id in &to_remove {
            cache.remove(edge_id);
        }
        to_remove.len()
    }

    pub fn stats(&self, repo_id: &str) -> StaleStats {
        let cache = match self.stale_cache.get(repo_id) {
            Some(c) => c,
            None => return StaleStats::default(),
        };

        let mut stats = StaleStats {
            total_stale: cache.len(),
            ..Default::default()
        };
        let mut source_files = HashSet::new();

        for info in cache.values() {
            let reason = match info.reason {
                StaleReason::TargetModified => "target_modified",
                StaleReason::TargetDeleted => "target_deleted",
            };
            *stats.by_reason.entry(reason.to_string()).or_insert(0) += 1;
            *stats.by_kind.entry(info.edge_kind.clone()).or_insert(0) += 1;
            if let Some(f) = &info.source_file {
                source_files.insert(f.clone());
            }
        }

        stats.source_files_affected = source_files.len();
        stats
    }
}

impl Default for EdgeValidator {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_TTL_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Edge, EdgeAttrs, EdgeKind, NodeBuilder, NodeKind, Span};

    fn graph_with_call() -> GraphDocument {
        let mut doc = GraphDocument::new("r", "s");
        doc.insert_node(
            NodeBuilder::new("f1", NodeKind::Function, "f", "f", "a.py", Span::new(1, 0, 2, 0), "python")
                .build(),
        );
        doc.insert_node(
            NodeBuilder::new("g1", NodeKind::Function, "g", "g", "b.py", Span::new(1, 0, 2, 0), "python")
                .build(),
        );
        doc.push_edge(Edge::new(
            EdgeKind::Calls,
            "f1",
            "g1",
            "a.py",
            "b.py",
            EdgeAttrs::Call { line: 3, arg_count: 0 },
        ));
        doc
    }

    #[test]
    fn test_mark_stale_on_target_modification() {
        let validator = EdgeValidator::default();
        let graph = graph_with_call();

        let marked = validator.mark_stale_edges(
            "r",
            &HashSet::from(["b.py".to_string()]),
            &graph,
        );
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].reason, StaleReason::TargetModified);
        assert!(validator.is_edge_stale("r", &marked[0].edge_id));
    }

    #[test]
    fn test_same_file_edges_not_marked() {
        let validator = EdgeValidator::default();
        let mut graph = GraphDocument::new("r", "s");
        graph.insert_node(
            NodeBuilder::new("f1", NodeKind::Function, "f", "f", "a.py", Span::new(1, 0, 2, 0), "python")
                .build(),
        );
        graph.insert_node(
            NodeBuilder::new("g1", NodeKind::Function, "g", "g", "a.py", Span::new(4, 0, 5, 0), "python")
                .build(),
        );
        graph.push_edge(Edge::new(
            EdgeKind::Calls,
            "f1",
            "g1",
            "a.py",
            "a.py",
            EdgeAttrs::Call { line: 2, arg_count: 0 },
        ));

        let marked =
            validator.mark_stale_edges("r", &HashSet::from(["a.py".to_string()]), &graph);
        assert!(marked.is_empty());
    }

    #[test]
    fn test_revalidation_when_target_survives() {
        let validator = EdgeValidator::default();
        let graph = graph_with_call();
        let edge_id = graph.graph_edges[0].id.clone();

        validator.mark_stale_edges("r", &HashSet::from(["b.py".to_string()]), &graph);

        let results = validator.validate_edges("r", &[edge_id.clone()], &graph);
        assert_eq!(results[&edge_id].status, EdgeStatus::Valid);
        assert_eq!(results[&edge_id].message.as_deref(), Some("revalidated"));
        assert!(!validator.is_edge_stale("r", &edge_id));
    }

    #[test]
    fn test_deleted_target_is_invalid() {
        let validator = EdgeValidator::default();
        let mut graph = graph_with_call();
        let edge_id = graph.graph_edges[0].id.clone();

        validator.mark_deleted_symbol_edges("r", &HashSet::from(["g1".to_string()]), &graph);

        // Target node removed, edge still addressable
        graph.graph_nodes.remove("g1");

        let results = validator.validate_edges("r", &[edge_id.clone()], &graph);
        assert_eq!(results[&edge_id].status, EdgeStatus::Invalid);
        assert_eq!(
            results[&edge_id].message.as_deref(),
            Some("target_was_deleted")
        );
    }

    #[test]
    fn test_modified_then_vanished_target_is_invalid() {
        let validator = EdgeValidator::default();
        let mut graph = graph_with_call();
        let edge_id = graph.graph_edges[0].id.clone();

        validator.mark_stale_edges("r", &HashSet::from(["b.py".to_string()]), &graph);
        graph.graph_nodes.remove("g1");

        let results = validator.validate_edges("r", &[edge_id.clone()], &graph);
        assert_eq!(results[&edge_id].status, EdgeStatus::Invalid);
        assert_eq!(results[&edge_id].message.as_deref(), Some("target_deleted"));
    }

    #[test]
    fn test_target_deleted_reason_sticks_even_if_recreated() {
        let validator = EdgeValidator::default();
        let graph = graph_with_call();
        let edge_id = graph.graph_edges[0].id.clone();

        validator.mark_deleted_symbol_edges("r", &HashSet::from(["g1".to_string()]), &graph);

        // Node with the same ID exists again, but it went through deletion
        let results = validator.validate_edges("r", &[edge_id.clone()], &graph);
        assert_eq!(results[&edge_id].status, EdgeStatus::Invalid);
        assert_eq!(
            results[&edge_id].message.as_deref(),
            Some("target_was_deleted")
        );
    }

    #[test]
    fn test_cleanup_force_removes_all() {
        let validator = EdgeValidator::default();
        let graph = graph_with_call();
        validator.mark_stale_edges("r", &HashSet::from(["b.py".to_string()]), &graph);

        let removed = validator.cleanup_stale_edges("r", None, true);
        assert_eq!(removed, 1);
        assert!(validator.get_stale_edges("r").is_empty());
    }

    #[test]
    fn test_stale_source_files_and_stats() {
        let validator = EdgeValidator::default();
        let graph = graph_with_call();
        validator.mark_stale_edges("r", &HashSet::from(["b.py".to_string()]), &graph);

        assert_eq!(
            validator.get_stale_source_files("r"),
            HashSet::from(["a.py".to_string()])
        );

        let stats = validator.stats("r");
        assert_eq!(stats.total_stale, 1);
        assert_eq!(stats.by_reason["target_modified"], 1);
        assert_eq!(stats.by_kind["CALLS"], 1);
        assert_eq!(stats.source_files_affected, 1);
    }

    #[test]
    fn test_clear_stale_for_file() {
        let validator = EdgeValidator::default();
        let graph = graph_with_call();
        validator.mark_stale_edges("r", &HashSet::from(["b.py".to_string()]), &graph);

        let cleared = validator.clear_stale_for_file("r", "a.py");
        assert_eq!(cleared, 1);
        assert!(validator.get_stale_edges("r").is_empty());
    }
}
