//! Index job model
//!
//! The unit of coordinated work: single writer per (repo_id, snapshot_id),
//! leased locks, checkpointed retries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;

/// What triggered the job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    GitCommit,
    FsEvent,
    Manual,
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    AcquiringLock,
    LockFailed,
    Running,
    Completed,
    Failed,
    /// Merged into an equivalent running job
    Deduped,
    /// Replaced by a broader queued job
    Superseded,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::Deduped
                | JobStatus::Superseded
                | JobStatus::Cancelled
        )
    }
}

/// One indexing job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexJob {
    pub id: String,
    pub repo_id: String,
    pub snapshot_id: String,

    /// None = whole repository
    pub scope_paths: Option<Vec<String>>,

    pub trigger: TriggerType,
    pub status: JobStatus,
    pub status_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    // Counters
    pub changed_files_count: usize,
    pub indexed_chunks_count: usize,
    pub errors_count: usize,

    // Retry
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,

    // Lease
    pub lock_holder: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,

    pub incremental: bool,
}

impl IndexJob {
    pub fn new(
        repo_id: impl Into<String>,
        snapshot_id: impl Into<String>,
        trigger: TriggerType,
        scope_paths: Option<Vec<String>>,
        incremental: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            repo_id: repo_id.into(),
            snapshot_id: snapshot_id.into(),
            scope_paths,
            trigger,
            status: JobStatus::Queued,
            status_reason: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            changed_files_count: 0,
            indexed_chunks_count: 0,
            errors_count: 0,
            retry_count: 0,
            max_retries: 3,
            last_error: None,
            lock_holder: None,
            lock_expires_at: None,
            incremental,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed && self.retry_count < self.max_retries
    }

    pub fn key(&self) -> (String, String) {
        (self.repo_id.clone(), self.snapshot_id.clone())
    }

    /// Scope containment: a `None` scope covers everything; a concrete
    /// scope is a subset when every path falls under the other's paths.
    pub fn scope_is_subset_of(&self, other: &IndexJob) -> bool {
        match (&self.scope_paths, &other.scope_paths) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(mine), Some(theirs)) => mine.iter().all(|path| {
                theirs
                    .iter()
                    .any(|prefix| path == prefix || path.starts_with(&format!("{}/", prefix)))
            }),
        }
    }

    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.lock_expires_at.map(|t| t < now).unwrap_or(false)
    }
}

/// Job persistence port
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save(&self, job: &IndexJob) -> Result<()>;

    async fn get(&self, job_id: &str) -> Result<Option<IndexJob>>;

    async fn list(&self, repo_id: Option<&str>, status: Option<JobStatus>)
        -> Result<Vec<IndexJob>>;
}

/// In-memory job store (tests and single-process runs)
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Arc<Mutex<HashMap<String, IndexJob>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: &IndexJob) -> Result<()> {
        self.jobs.lock().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<IndexJob>> {
        Ok(self.jobs.lock().get(job_id).cloned())
    }

    async fn list(
        &self,
        repo_id: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<Vec<IndexJob>> {
        let jobs = self.jobs.lock();
        let mut result: Vec<IndexJob> = jobs
            .values()
            .filter(|j| repo_id.map(|r| j.repo_id == r).unwrap_or(true))
            .filter(|j| status.map(|s| j.status == s).unwrap_or(true))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }
}
