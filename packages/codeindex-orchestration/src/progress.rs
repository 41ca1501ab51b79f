//! Job progress and checkpoints
//!
//! Coarse checkpoints plus a completed-files set; resume skips whole stages
//! by checkpoint and files by the set. Persistence goes through the
//! ProgressStore port, durable enough to survive process restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

/// Coarse execution checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexJobCheckpoint {
    Started,
    ChangedFilesComputed,
    ParsingCompleted,
    IrBuildCompleted,
    ChunksStored,
    IndexesUpdated,
    Completed,
}

/// Per-job progress record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: String,
    pub checkpoint: IndexJobCheckpoint,
    pub completed_files: Vec<String>,
    /// file path → error message
    pub failed_files: HashMap<String, String>,
    pub created_at: DateTime<Utc>,

    // Cooperative cancellation support
    pub processing_file: Option<String>,
    pub total_files: usize,
    pub paused_at: Option<DateTime<Utc>>,
}

impl JobProgress {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            checkpoint: IndexJobCheckpoint::Started,
            completed_files: Vec::new(),
            failed_files: HashMap::new(),
            created_at: Utc::now(),
            processing_file: None,
            total_files: 0,
            paused_at: None,
        }
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        (self.completed_files.len() as f64 / self.total_files as f64) * 100.0
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn pause(&mut self) {
        self.paused_at = Some(Utc::now());
        self.processing_file = None;
    }

    pub fn resume(&mut self) {
        self.paused_at = None;
    }

    pub fn mark_file_completed(&mut self, file_path: &str) {
        if !self.completed_files.iter().any(|f| f == file_path) {
            self.completed_files.push(file_path.to_string());
        }
    }

    pub fn mark_file_failed(&mut self, file_path: &str, error: impl Into<String>) {
        self.failed_files.insert(file_path.to_string(), error.into());
    }

    pub fn can_skip_file(&self, file_path: &str) -> bool {
        self.completed_files.iter().any(|f| f == file_path)
    }

    /// Stage skipping on resume: everything at or before the recorded
    /// checkpoint is done
    pub fn stage_completed(&self, checkpoint: IndexJobCheckpoint) -> bool {
        self.checkpoint >= checkpoint
    }

    pub fn advance(&mut self, checkpoint: IndexJobCheckpoint) {
        if checkpoint > self.checkpoint {
            self.checkpoint = checkpoint;
        }
    }
}

/// Durable progress persistence port
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn persist(&self, progress: &JobProgress) -> Result<()>;

    async fn load(&self, job_id: &str) -> Result<Option<JobProgress>>;

    async fn delete(&self, job_id: &str) -> Result<()>;
}

/// In-memory progress store (tests and single-process runs)
#[derive(Default)]
pub struct InMemoryProgressStore {
    records: Arc<Mutex<HashMap<String, JobProgress>>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn persist(&self, progress: &JobProgress) -> Result<()> {
        self.records
            .lock()
            .insert(progress.job_id.clone(), progress.clone());
        Ok(())
    }

    async fn load(&self, job_id: &str) -> Result<Option<JobProgress>> {
        Ok(self.records.lock().get(job_id).cloned())
    }

    async fn delete(&self, job_id: &str) -> Result<()> {
        self.records.lock().remove(job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        let mut progress = JobProgress::new("job1");
        assert_eq!(progress.progress_percent(), 0.0);
        progress.total_files = 4;
        progress.mark_file_completed("a.py");
        assert_eq!(progress.progress_percent(), 25.0);
    }

    #[test]
    fn test_completed_files_dedupe_and_skip() {
        let mut progress = JobProgress::new("job1");
        progress.mark_file_completed("a.py");
        progress.mark_file_completed("a.py");
        assert_eq!(progress.completed_files.len(), 1);
        assert!(progress.can_skip_file("a.py"));
        assert!(!progress.can_skip_file("b.py"));
    }

    #[test]
    fn test_checkpoint_ordering() {
        let mut progress = JobProgress::new("job1");
        progress.advance(IndexJobCheckpoint::ParsingCompleted);
        assert!(progress.stage_completed(IndexJobCheckpoint::ChangedFilesComputed));
        assert!(!progress.stage_completed(IndexJobCheckpoint::ChunksStored));

        // Advancing backwards is a no-op
        progress.advance(IndexJobCheckpoint::Started);
        assert_eq!(progress.checkpoint, IndexJobCheckpoint::ParsingCompleted);
    }

    #[tokio::test]
    async fn test_in_memory_store_roundtrip() {
        let store = InMemoryProgressStore::new();
        let mut progress = JobProgress::new("job1");
        progress.mark_file_completed("a.py");

        store.persist(&progress).await.unwrap();
        let loaded = store.load("job1").await.unwrap().unwrap();
        assert_eq!(loaded.completed_files, vec!["a.py"]);

        store.delete("job1").await.unwrap();
        assert!(store.load("job1").await.unwrap().is_none());
    }
}
