//! Overlay store
//!
//! Editor sessions supply unsaved buffers as overlay chunks keyed by
//! `(session_id, file_path)`. Overlays shadow base chunks via the merger
//! and are promoted to base when the editor saves the file.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::chunk::Chunk;

#[derive(Default)]
pub struct OverlayStore {
    /// (session_id, file_path) → overlay chunks
    overlays: Mutex<HashMap<(String, String), Vec<Chunk>>>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the overlays for a (session, file) with the given chunks.
    /// Chunks are stamped with the overlay metadata.
    pub fn put_overlay(&self, session_id: &str, file_path: &str, mut chunks: Vec<Chunk>) {
        for chunk in &mut chunks {
            if !chunk.is_overlay {
                chunk.set_overlay(session_id, chunk.base_chunk_id.clone());
            }
        }
        self.overlays
            .lock()
            .insert((session_id.to_string(), file_path.to_string()), chunks);
    }

    pub fn get_overlays_for_file(&self, session_id: &str, file_path: &str) -> Vec<Chunk> {
        self.overlays
            .lock()
            .get(&(session_id.to_string(), file_path.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_session_overlays(&self, session_id: &str) -> Vec<Chunk> {
        let overlays = self.overlays.lock();
        let mut result: Vec<Chunk> = overlays
            .iter()
            .filter(|((sid, _), _)| sid == session_id)
            .flat_map(|(_, chunks)| chunks.iter().cloned())
            .collect();
        result.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        result
    }

    /// On editor save: remove the overlays and return them stripped of
    /// overlay metadata, ready for the base store.
    pub fn promote(&self, session_id: &str, file_path: &str) -> Vec<Chunk> {
        let mut overlays = self.overlays.lock();
        let chunks = overlays
            .remove(&(session_id.to_string(), file_path.to_string()))
            .unwrap_or_default();

        chunks
            .into_iter()
            .map(|mut chunk| {
                chunk.is_overlay = false;
                chunk.overlay_session_id = None;
                chunk.base_chunk_id = None;
                chunk
            })
            .collect()
    }

    /// Drop every overlay of a session (editor closed without saving).
    /// Returns the discarded chunk count.
    pub fn discard(&self, session_id: &str) -> usize {
        let mut overlays = self.overlays.lock();
        let keys: Vec<(String, String)> = overlays
            .keys()
            .filter(|(sid, _)| sid == session_id)
            .cloned()
            .collect();

        let mut count = 0;
        for key in keys {
            if let Some(chunks) = overlays.remove(&key) {
                count += chunks.len();
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::chunking::chunk::ChunkKind;
    use crate::shared::models::Span;

    fn chunk(id: &str) -> Chunk {
        Chunk::new(id, "r", "s", "a.py", ChunkKind::Function, "f", Span::new(1, 0, 2, 0), "h")
    }

    #[test]
    fn test_put_stamps_overlay_metadata() {
        let store = OverlayStore::new();
        store.put_overlay("sess", "a.py", vec![chunk("c1")]);

        let overlays = store.get_overlays_for_file("sess", "a.py");
        assert_eq!(overlays.len(), 1);
        assert!(overlays[0].is_overlay);
        assert_eq!(overlays[0].overlay_session_id.as_deref(), Some("sess"));
    }

    #[test]
    fn test_promote_strips_overlay_metadata() {
        let store = OverlayStore::new();
        store.put_overlay("sess", "a.py", vec![chunk("c1")]);

        let promoted = store.promote("sess", "a.py");
        assert_eq!(promoted.len(), 1);
        assert!(!promoted[0].is_overlay);
        assert!(store.get_overlays_for_file("sess", "a.py").is_empty());
    }

    #[test]
    fn test_discard_session() {
        let store = OverlayStore::new();
        store.put_overlay("sess", "a.py", vec![chunk("c1")]);
        store.put_overlay("sess", "b.py", vec![chunk("c2")]);
        store.put_overlay("other", "a.py", vec![chunk("c3")]);

        assert_eq!(store.discard("sess"), 2);
        assert!(store.get_overlays_for_file("sess", "a.py").is_empty());
        assert_eq!(store.get_overlays_for_file("other", "a.py").len(), 1);
    }
}
