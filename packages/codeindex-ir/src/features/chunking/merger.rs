//! Chunk merger
//!
//! Yields the effective chunk view for editor sessions: overlay chunks
//! shadow any base chunk whose file and span overlap an overlay in that
//! file; non-shadowed base chunks pass through.

use std::collections::HashMap;

use super::chunk::Chunk;

pub struct ChunkMerger;

impl ChunkMerger {
    pub fn new() -> Self {
        Self
    }

    /// Overlays win; non-shadowed base chunks are kept.
    pub fn merge(&self, base_chunks: Vec<Chunk>, overlay_chunks: Vec<Chunk>) -> Vec<Chunk> {
        if overlay_chunks.is_empty() {
            return base_chunks;
        }

        let mut overlay_by_file: HashMap<&str, Vec<&Chunk>> = HashMap::new();
        for chunk in &overlay_chunks {
            overlay_by_file
                .entry(chunk.file_path.as_str())
                .or_default()
                .push(chunk);
        }

        let mut shadowed_count = 0;
        let non_shadowed: Vec<Chunk> = base_chunks
            .into_iter()
            .filter(|base| {
                let overlays = match overlay_by_file.get(base.file_path.as_str()) {
                    Some(o) => o,
                    None => return true,
                };
                if is_shadowed(base, overlays) {
                    shadowed_count += 1;
                    false
                } else {
                    true
                }
            })
            .collect();

        tracing::debug!(
            overlay_count = overlay_chunks.len(),
            shadowed_count,
            "chunks_merged"
        );

        let mut merged = overlay_chunks;
        merged.extend(non_shadowed);
        merged
    }

    /// Base chunks hidden by the given overlays (for diff views)
    pub fn shadowed_chunks<'a>(
        &self,
        base_chunks: &'a [Chunk],
        overlay_chunks: &[Chunk],
    ) -> Vec<&'a Chunk> {
        let mut overlay_by_file: HashMap<&str, Vec<&Chunk>> = HashMap::new();
        for chunk in overlay_chunks {
            overlay_by_file
                .entry(chunk.file_path.as_str())
                .or_default()
                .push(chunk);
        }

        base_chunks
            .iter()
            .filter(|base| {
                overlay_by_file
                    .get(base.file_path.as_str())
                    .map(|overlays| is_shadowed(base, overlays))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Shadowing: explicit base_chunk_id match, or overlapping line ranges in
/// the same file
fn is_shadowed(base: &Chunk, overlays: &[&Chunk]) -> bool {
    overlays.iter().any(|overlay| {
        overlay.base_chunk_id.as_deref() == Some(base.chunk_id.as_str())
            || base.span.overlaps_lines(&overlay.span)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::chunking::chunk::ChunkKind;
    use crate::shared::models::Span;

    fn base(id: &str, file: &str, span: Span) -> Chunk {
        Chunk::new(id, "r", "s", file, ChunkKind::Function, "f", span, "h")
    }

    fn overlay(id: &str, file: &str, span: Span, base_id: Option<&str>) -> Chunk {
        let mut c = Chunk::new(id, "r", "s", file, ChunkKind::Function, "f", span, "h2");
        c.set_overlay("session1", base_id.map(String::from));
        c
    }

    #[test]
    fn test_no_overlays_passthrough() {
        let merger = ChunkMerger::new();
        let bases = vec![base("b1", "a.py", Span::new(1, 0, 5, 0))];
        let merged = merger.merge(bases.clone(), vec![]);
        assert_eq!(merged, bases);
    }

    #[test]
    fn test_overlapping_overlay_shadows_base() {
        let merger = ChunkMerger::new();
        let bases = vec![
            base("b1", "a.py", Span::new(1, 0, 5, 0)),
            base("b2", "a.py", Span::new(10, 0, 15, 0)),
        ];
        let overlays = vec![overlay("o1", "a.py", Span::new(3, 0, 6, 0), None)];

        let merged = merger.merge(bases, overlays);
        let ids: Vec<&str> = merged.iter().map(|c| c.chunk_id.as_str()).collect();
        assert!(ids.contains(&"o1"));
        assert!(!ids.contains(&"b1"));
        assert!(ids.contains(&"b2"));
    }

    #[test]
    fn test_base_chunk_id_exact_replacement() {
        let merger = ChunkMerger::new();
        let bases = vec![base("b1", "a.py", Span::new(1, 0, 5, 0))];
        // Disjoint span but explicit base link still shadows
        let overlays = vec![overlay("o1", "a.py", Span::new(20, 0, 25, 0), Some("b1"))];

        let merged = merger.merge(bases, overlays);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].chunk_id, "o1");
    }

    #[test]
    fn test_other_files_untouched() {
        let merger = ChunkMerger::new();
        let bases = vec![base("b1", "other.py", Span::new(1, 0, 5, 0))];
        let overlays = vec![overlay("o1", "a.py", Span::new(1, 0, 5, 0), None)];

        let merged = merger.merge(bases, overlays);
        assert_eq!(merged.len(), 2);
    }
}
