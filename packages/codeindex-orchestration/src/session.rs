//! Index session context
//!
//! Tracks processed files and impact candidates within one job so the
//! in-job impact pass never reprocesses files and stays within its cap.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct IndexSessionContext {
    max_impact_reindex_files: usize,
    processed_files: HashSet<String>,
    impact_candidates: HashSet<String>,
}

impl IndexSessionContext {
    pub fn new(max_impact_reindex_files: usize) -> Self {
        Self {
            max_impact_reindex_files,
            processed_files: HashSet::new(),
            impact_candidates: HashSet::new(),
        }
    }

    pub fn mark_file_processed(&mut self, file_path: &str) {
        self.processed_files.insert(file_path.to_string());
        self.impact_candidates.remove(file_path);
    }

    pub fn is_processed(&self, file_path: &str) -> bool {
        self.processed_files.contains(file_path)
    }

    pub fn set_impact_candidates(&mut self, candidates: impl IntoIterator<Item = String>) {
        for candidate in candidates {
            if !self.processed_files.contains(&candidate) {
                self.impact_candidates.insert(candidate);
            }
        }
    }

    /// Candidates for the second pass, capped and sorted for determinism
    pub fn take_impact_batch(&mut self) -> Vec<String> {
        let mut batch: Vec<String> = self.impact_candidates.iter().cloned().collect();
        batch.sort();
        batch.truncate(self.max_impact_reindex_files);
        for file in &batch {
            self.impact_candidates.remove(file);
        }
        batch
    }

    pub fn has_impact_candidates(&self) -> bool {
        !self.impact_candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_files_excluded_from_candidates() {
        let mut ctx = IndexSessionContext::new(10);
        ctx.mark_file_processed("a.py");
        ctx.set_impact_candidates(vec!["a.py".to_string(), "b.py".to_string()]);
        assert_eq!(ctx.take_impact_batch(), vec!["b.py".to_string()]);
    }

    #[test]
    fn test_batch_capped_and_sorted() {
        let mut ctx = IndexSessionContext::new(2);
        ctx.set_impact_candidates(vec![
            "c.py".to_string(),
            "a.py".to_string(),
            "b.py".to_string(),
        ]);
        let batch = ctx.take_impact_batch();
        assert_eq!(batch, vec!["a.py".to_string(), "b.py".to_string()]);
        assert!(ctx.has_impact_candidates());
    }
}
