//! Incremental chunk refresh
//!
//! Computes the chunk delta between the stored set and a fresh build:
//! added, updated (same symbol, span moved), deleted, renamed (path-only
//! change), and drifted (same span, content changed).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::chunk::Chunk;

/// Chunk delta for an incremental run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub added: Vec<Chunk>,
    /// Same (file, kind, fqn) with a moved span: old id → new chunk
    pub updated: Vec<(String, Chunk)>,
    pub deleted: Vec<String>,
    /// Renames keep IDs modulo the path component: old id → new chunk
    pub renamed: Vec<(String, Chunk)>,
    /// Same span, different content hash
    pub drifted: Vec<Chunk>,
}

impl ChunkDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.renamed.is_empty()
            && self.drifted.is_empty()
    }

    /// Chunks that need (re)ingestion into the indexes
    pub fn chunks_to_save(&self) -> Vec<&Chunk> {
        self.added
            .iter()
            .chain(self.updated.iter().map(|(_, c)| c))
            .chain(self.renamed.iter().map(|(_, c)| c))
            .chain(self.drifted.iter())
            .collect()
    }

    /// Chunk IDs the indexes must drop before ingestion
    pub fn ids_to_delete(&self) -> Vec<String> {
        self.deleted
            .iter()
            .cloned()
            .chain(self.updated.iter().map(|(old, _)| old.clone()))
            .chain(self.renamed.iter().map(|(old, _)| old.clone()))
            .collect()
    }
}

pub struct ChunkIncrementalRefresher;

impl ChunkIncrementalRefresher {
    pub fn new() -> Self {
        Self
    }

    /// Diff old vs new chunks for the files touched by this run.
    ///
    /// `renamed_paths` are `(old_path, new_path)` pairs from the change set;
    /// a rename is one logical operation, never an add+delete.
    pub fn compute_delta(
        &self,
        old_chunks: &[Chunk],
        new_chunks: &[Chunk],
        deleted_files: &HashSet<String>,
        renamed_paths: &[(String, String)],
    ) -> ChunkDelta {
        let mut delta = ChunkDelta::default();

        let rename_map: HashMap<&str, &str> = renamed_paths
            .iter()
            .map(|(old, new)| (old.as_str(), new.as_str()))
            .collect();

        let old_by_id: HashMap<&str, &Chunk> =
            old_chunks.iter().map(|c| (c.chunk_id.as_str(), c)).collect();
        let new_by_id: HashMap<&str, &Chunk> =
            new_chunks.iter().map(|c| (c.chunk_id.as_str(), c)).collect();

        // (file, kind, fqn) → old chunk, to detect moved spans
        let old_by_symbol: HashMap<(&str, &str, &str), &Chunk> = old_chunks
            .iter()
            .map(|c| ((c.file_path.as_str(), c.kind.as_str(), c.fqn.as_str()), c))
            .collect();

        let mut matched_old: HashSet<&str> = HashSet::new();

        for new_chunk in new_chunks {
            // Same ID: unchanged or drifted
            if let Some(old) = old_by_id.get(new_chunk.chunk_id.as_str()) {
                matched_old.insert(old.chunk_id.as_str());
                if old.content_hash != new_chunk.content_hash {
                    delta.drifted.push(new_chunk.clone());
                }
                continue;
            }

            // Rename: the chunk existed under the old path with the same
            // kind, span, and content
            let renamed_source = rename_map
                .iter()
                .find(|(_, new_path)| **new_path == new_chunk.file_path)
                .map(|(old_path, _)| *old_path)
                .and_then(|old_path| {
                    old_chunks.iter().find(|old| {
                        old.file_path == old_path
                            && old.kind == new_chunk.kind
                            && old.span == new_chunk.span
                            && old.content_hash == new_chunk.content_hash
                    })
                });
            if let Some(old) = renamed_source {
                matched_old.insert(old.chunk_id.as_str());
                delta.renamed.push((old.chunk_id.clone(), new_chunk.clone()));
                continue;
            }

            // Span moved: same symbol identity, new ID
            let symbol_key = (
                new_chunk.file_path.as_str(),
                new_chunk.kind.as_str(),
                new_chunk.fqn.as_str(),
            );
            if let Some(old) = old_by_symbol.get(&symbol_key) {
                if !matched_old.contains(old.chunk_id.as_str()) {
                    matched_old.insert(old.chunk_id.as_str());
                    delta.updated.push((old.chunk_id.clone(), new_chunk.clone()));
                    continue;
                }
            }

            delta.added.push(new_chunk.clone());
        }

        // Deletions: unmatched old chunks in deleted files, and unmatched
        // chunks of files that were rebuilt
        let rebuilt_files: HashSet<&str> = new_chunks
            .iter()
            .map(|c| c.file_path.as_str())
            .collect();
        for old in old_chunks {
            if matched_old.contains(old.chunk_id.as_str()) {
                continue;
            }
            if new_by_id.contains_key(old.chunk_id.as_str()) {
                continue;
            }
            let was_renamed_away = rename_map.contains_key(old.file_path.as_str());
            if deleted_files.contains(&old.file_path)
                || rebuilt_files.contains(old.file_path.as_str())
                || was_renamed_away
            {
                delta.deleted.push(old.chunk_id.clone());
            }
        }

        tracing::info!(
            added = delta.added.len(),
            updated = delta.updated.len(),
            deleted = delta.deleted.len(),
            renamed = delta.renamed.len(),
            drifted = delta.drifted.len(),
            "chunk_delta_computed"
        );

        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::chunking::chunk::ChunkKind;
    use crate::shared::models::Span;
    use pretty_assertions::assert_eq;

    fn chunk(file: &str, kind: ChunkKind, fqn: &str, span: Span, hash: &str) -> Chunk {
        let id = format!(
            "chunk:r:{}:{}:{}-{}",
            kind.as_str(),
            file,
            span.start_line,
            span.end_line
        );
        Chunk::new(id, "r", "s", file, kind, fqn, span, hash)
    }

    #[test]
    fn test_added_chunk() {
        let old = vec![];
        let new = vec![chunk("a.py", ChunkKind::Function, "f", Span::new(1, 0, 2, 0), "h1")];
        let delta =
            ChunkIncrementalRefresher::new().compute_delta(&old, &new, &HashSet::new(), &[]);
        assert_eq!(delta.added.len(), 1);
        assert!(delta.deleted.is_empty());
    }

    #[test]
    fn test_drifted_same_span_new_content() {
        let span = Span::new(1, 0, 2, 0);
        let old = vec![chunk("a.py", ChunkKind::Function, "f", span, "h1")];
        let new = vec![chunk("a.py", ChunkKind::Function, "f", span, "h2")];
        let delta =
            ChunkIncrementalRefresher::new().compute_delta(&old, &new, &HashSet::new(), &[]);
        assert_eq!(delta.drifted.len(), 1);
        assert!(delta.added.is_empty());
        assert!(delta.deleted.is_empty());
    }

    #[test]
    fn test_updated_span_moved() {
        let old = vec![chunk("a.py", ChunkKind::Function, "f", Span::new(1, 0, 2, 0), "h1")];
        let new = vec![chunk("a.py", ChunkKind::Function, "f", Span::new(5, 0, 6, 0), "h1")];
        let delta =
            ChunkIncrementalRefresher::new().compute_delta(&old, &new, &HashSet::new(), &[]);
        assert_eq!(delta.updated.len(), 1);
        assert!(delta.added.is_empty());
        // Old ID gets dropped from the indexes
        assert_eq!(delta.ids_to_delete().len(), 1);
    }

    #[test]
    fn test_rename_preserves_content_hash() {
        let span = Span::new(1, 0, 2, 0);
        let old = vec![chunk("a.py", ChunkKind::Function, "f", span, "h1")];
        let new = vec![chunk("src/a.py", ChunkKind::Function, "f", span, "h1")];

        let delta = ChunkIncrementalRefresher::new().compute_delta(
            &old,
            &new,
            &HashSet::new(),
            &[("a.py".to_string(), "src/a.py".to_string())],
        );
        assert_eq!(delta.renamed.len(), 1);
        assert!(delta.added.is_empty());
        assert_eq!(delta.renamed[0].1.content_hash, "h1");
    }

    #[test]
    fn test_deleted_file_chunks() {
        let old = vec![chunk("b.py", ChunkKind::Function, "g", Span::new(1, 0, 2, 0), "h1")];
        let delta = ChunkIncrementalRefresher::new().compute_delta(
            &old,
            &[],
            &HashSet::from(["b.py".to_string()]),
            &[],
        );
        assert_eq!(delta.deleted.len(), 1);
    }

    #[test]
    fn test_unrelated_files_untouched() {
        let old = vec![chunk("keep.py", ChunkKind::Function, "k", Span::new(1, 0, 2, 0), "h1")];
        let new = vec![chunk("a.py", ChunkKind::Function, "f", Span::new(1, 0, 2, 0), "h2")];
        let delta =
            ChunkIncrementalRefresher::new().compute_delta(&old, &new, &HashSet::new(), &[]);
        // keep.py was not rebuilt or deleted: its chunk survives
        assert!(delta.deleted.is_empty());
    }
}
