//! Chunk ID generator with collision resolution
//!
//! ID format: `chunk:{repo_id}:{kind}:{file_path}:{start}-{end}[:{hash8}]`
//!
//! The base ID is deterministic over (repo, file, span, kind). Collisions
//! (two chunks of the same kind on the same span) append the first 8 chars
//! of the content hash.
//!
//! Thread safety: `parking_lot::Mutex` guards the seen set so the Rayon
//! fan-out can share one generator.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::shared::models::Span;

/// Context for generating a chunk ID
#[derive(Debug, Clone)]
pub struct ChunkIdContext<'a> {
    pub repo_id: &'a str,
    pub kind: &'a str,
    pub file_path: &'a str,
    pub span: Span,
    /// Content hash for collision resolution (first 8 chars used)
    pub content_hash: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ChunkIdGenerator {
    seen: Arc<Mutex<HashSet<String>>>,
}

impl ChunkIdGenerator {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Compose the base ID without touching the seen set
    pub fn base_id(ctx: &ChunkIdContext) -> String {
        format!(
            "chunk:{}:{}:{}:{}-{}",
            ctx.repo_id, ctx.kind, ctx.file_path, ctx.span.start_line, ctx.span.end_line
        )
    }

    pub fn generate(&self, ctx: &ChunkIdContext) -> String {
        let base = Self::base_id(ctx);

        let mut seen = self.seen.lock();
        if !seen.contains(&base) {
            seen.insert(base.clone());
            return base;
        }

        let suffix = ctx
            .content_hash
            .map(|h| &h[..8.min(h.len())])
            .unwrap_or("");
        let candidate = format!("{}:{}", base, suffix);
        seen.insert(candidate.clone());
        candidate
    }

    /// Reset the seen set (between files in incremental refresh)
    pub fn reset(&self) {
        self.seen.lock().clear();
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.seen.lock().contains(chunk_id)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ChunkIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
