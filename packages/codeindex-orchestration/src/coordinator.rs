//! Job coordinator
//!
//! Single-writer guarantee per (repo_id, snapshot_id) with leased locks,
//! submission coalescing (dedup/supersede), checkpointed execution through
//! the orchestrator, and bounded retries with backoff.
//!
//! Coalescing protocol on submission:
//! 1. RUNNING job with the same key and the new scope ⊆ running scope
//!    → new job is DEDUPED
//! 2. QUEUED job with the same key and wider-or-equal scope
//!    → new job is SUPERSEDED
//! 3. older QUEUED job with the same key and narrower scope
//!    → old job is SUPERSEDED, new job enqueues
//! 4. otherwise enqueue

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::job::{IndexJob, JobStatus, JobStore, TriggerType};
use crate::models::IndexingStatus;
use crate::orchestrator::{IndexRequest, PipelineOrchestrator};
use crate::progress::{JobProgress, ProgressStore};

pub const DEFAULT_LEASE_TTL_SECS: i64 = 120;

pub struct JobCoordinator {
    instance_id: String,
    lease_ttl_secs: i64,
    orchestrator: Arc<PipelineOrchestrator>,
    job_store: Arc<dyn JobStore>,
    progress_store: Option<Arc<dyn ProgressStore>>,

    /// Jobs known to this coordinator instance, by id
    jobs: Mutex<HashMap<String, IndexJob>>,
    /// Cancellation tokens of running jobs
    running: Mutex<HashMap<String, CancellationToken>>,
    /// Lock holders per (repo, snapshot) key
    locks: Mutex<HashMap<(String, String), String>>,
}

impl JobCoordinator {
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        job_store: Arc<dyn JobStore>,
        progress_store: Option<Arc<dyn ProgressStore>>,
    ) -> Self {
        Self {
            instance_id: format!("coordinator-{}", Uuid::new_v4()),
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
            orchestrator,
            job_store,
            progress_store,
            jobs: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Submit a job, applying the coalescing protocol. The returned job's
    /// status tells the caller what happened.
    pub async fn submit(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        trigger: TriggerType,
        scope_paths: Option<Vec<String>>,
        incremental: bool,
    ) -> Result<IndexJob> {
        let mut new_job = IndexJob::new(repo_id, snapshot_id, trigger, scope_paths, incremental);

        let mut superseded_old: Vec<IndexJob> = Vec::new();
        {
            let mut jobs = self.jobs.lock();

            // Rule 1: dedupe into an equivalent running job
            let running_covers = jobs.values().any(|existing| {
                existing.status == JobStatus::Running
                    && existing.key() == new_job.key()
                    && new_job.scope_is_subset_of(existing)
            });
            if running_covers {
                new_job.status = JobStatus::Deduped;
                new_job.status_reason = Some("covered by running job".into());
                jobs.insert(new_job.id.clone(), new_job.clone());
            } else {
                // Rule 2: a queued job already covers the new scope
                let queued_covers = jobs.values().any(|existing| {
                    existing.status == JobStatus::Queued
                        && existing.key() == new_job.key()
                        && new_job.scope_is_subset_of(existing)
                });
                if queued_covers {
                    new_job.status = JobStatus::Superseded;
                    new_job.status_reason = Some("queued job with wider scope exists".into());
                    jobs.insert(new_job.id.clone(), new_job.clone());
                } else {
                    // Rule 3: the new job covers older queued jobs
                    for existing in jobs.values_mut() {
                        if existing.status == JobStatus::Queued
                            && existing.key() == new_job.key()
                            && existing.scope_is_subset_of(&new_job)
                        {
                            existing.status = JobStatus::Superseded;
                            existing.status_reason =
                                Some(format!("superseded by {}", new_job.id));
                            existing.finished_at = Some(Utc::now());
                            superseded_old.push(existing.clone());
                        }
                    }
                    // Rule 4: enqueue
                    jobs.insert(new_job.id.clone(), new_job.clone());
                }
            }
        }

        self.job_store.save(&new_job).await?;
        for job in &superseded_old {
            self.job_store.save(job).await?;
        }

        tracing::info!(
            job_id = %new_job.id,
            repo_id,
            snapshot_id,
            status = ?new_job.status,
            superseded = superseded_old.len(),
            "job_submitted"
        );

        Ok(new_job)
    }

    pub fn get(&self, job_id: &str) -> Option<IndexJob> {
        self.jobs.lock().get(job_id).cloned()
    }

    pub fn list(&self, repo_id: Option<&str>, status: Option<JobStatus>) -> Vec<IndexJob> {
        let jobs = self.jobs.lock();
        let mut result: Vec<IndexJob> = jobs
            .values()
            .filter(|j| repo_id.map(|r| j.repo_id == r).unwrap_or(true))
            .filter(|j| status.map(|s| j.status == s).unwrap_or(true))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        result
    }

    /// Execute a queued job: ACQUIRING_LOCK → RUNNING → COMPLETED|FAILED.
    /// Retries stay the caller's loop: a FAILED job with retries left can
    /// be resubmitted through `execute` again.
    pub async fn execute(&self, job_id: &str, repo_path: &Path) -> Result<IndexJob> {
        let mut job = self
            .get(job_id)
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;

        if job.status != JobStatus::Queued {
            return Err(OrchestratorError::InvalidStateTransition {
                from: format!("{:?}", job.status),
                to: "running".to_string(),
            });
        }

        // Acquire the (repo, snapshot) lease
        job.status = JobStatus::AcquiringLock;
        self.save(&mut job).await?;

        if !self.try_acquire_lock(&job) {
            job.status = JobStatus::LockFailed;
            job.status_reason = Some("lease held by another job".into());
            job.retry_count += 1;
            self.save(&mut job).await?;
            return Ok(job);
        }

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job.lock_holder = Some(self.instance_id.clone());
        job.lock_expires_at = Some(Utc::now() + Duration::seconds(self.lease_ttl_secs));
        self.save(&mut job).await?;

        let cancel = CancellationToken::new();
        self.running.lock().insert(job.id.clone(), cancel.clone());

        // Resume from persisted progress when present
        let progress = match &self.progress_store {
            Some(store) => store.load(&job.id).await.ok().flatten(),
            None => None,
        };
        let progress = progress.unwrap_or_else(|| JobProgress::new(&job.id));

        let request = IndexRequest {
            repo_path: repo_path.to_path_buf(),
            repo_id: job.repo_id.clone(),
            snapshot_id: job.snapshot_id.clone(),
            incremental: job.incremental,
            force: false,
            last_commit: None,
            progress: Some(progress),
            cancel: Some(cancel.clone()),
            progress_callback: None,
        };

        let timeout =
            std::time::Duration::from_secs(self.orchestrator.config().task_timeout_secs);
        let outcome = tokio::time::timeout(
            timeout,
            self.orchestrator.index_repository(request),
        )
        .await;

        self.running.lock().remove(&job.id);
        self.release_lock(&job);

        match outcome {
            Ok(Ok(result)) => {
                job.changed_files_count = result.files_processed;
                job.indexed_chunks_count = result.chunks_created;
                job.errors_count = result.errors.len();

                match result.status {
                    IndexingStatus::Completed | IndexingStatus::Partial => {
                        job.status = JobStatus::Completed;
                        job.finished_at = Some(Utc::now());
                        if let Some(store) = &self.progress_store {
                            let _ = store.delete(&job.id).await;
                        }
                    }
                    IndexingStatus::InProgress => {
                        // Cancelled mid-run; checkpoints stay valid
                        job.status = JobStatus::Cancelled;
                        job.status_reason = Some("cancelled".into());
                        job.finished_at = Some(Utc::now());
                    }
                    _ => {
                        job.status = JobStatus::Failed;
                        job.last_error = result.errors.last().cloned();
                        job.retry_count += 1;
                        job.finished_at = Some(Utc::now());
                    }
                }
            }
            Ok(Err(e)) => {
                job.status = JobStatus::Failed;
                job.last_error = Some(e.to_string());
                job.retry_count += 1;
                job.finished_at = Some(Utc::now());
            }
            Err(_) => {
                job.status = JobStatus::Failed;
                job.last_error = Some(format!("timed out after {}s", timeout.as_secs()));
                job.retry_count += 1;
                job.finished_at = Some(Utc::now());
            }
        }

        self.save(&mut job).await?;
        tracing::info!(job_id = %job.id, status = ?job.status, "job_finished");
        Ok(job)
    }

    /// Requeue a failed job for retry; backoff is the caller's scheduler
    /// concern.
    pub async fn retry(&self, job_id: &str) -> Result<IndexJob> {
        let mut job = self
            .get(job_id)
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;

        if !job.can_retry() && job.status != JobStatus::LockFailed {
            return Err(OrchestratorError::InvalidStateTransition {
                from: format!("{:?}", job.status),
                to: "queued".to_string(),
            });
        }

        job.status = JobStatus::Queued;
        job.status_reason = Some(format!("retry {}", job.retry_count));
        job.started_at = None;
        job.finished_at = None;
        self.save(&mut job).await?;
        Ok(job)
    }

    /// Request cooperative cancellation of a running job, or mark a queued
    /// one cancelled outright.
    pub async fn cancel(&self, job_id: &str) -> Result<bool> {
        if let Some(token) = self.running.lock().get(job_id) {
            token.cancel();
            return Ok(true);
        }

        let mut job = match self.get(job_id) {
            Some(j) => j,
            None => return Ok(false),
        };
        if job.status.is_terminal() {
            return Ok(false);
        }
        job.status = JobStatus::Cancelled;
        job.status_reason = Some("cancelled before start".into());
        job.finished_at = Some(Utc::now());
        self.save(&mut job).await?;
        Ok(true)
    }

    /// Renew the lease of a running job; on a lost lease the job fails
    /// LOCK_FAILED and becomes retry-eligible.
    pub async fn renew_lease(&self, job_id: &str) -> Result<()> {
        let mut job = self
            .get(job_id)
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;

        if job.status != JobStatus::Running {
            return Ok(());
        }
        if job.lease_expired(Utc::now()) {
            job.status = JobStatus::LockFailed;
            job.status_reason = Some("lease expired".into());
            job.retry_count += 1;
            self.release_lock(&job);
            self.save(&mut job).await?;
            if let Some(token) = self.running.lock().get(job_id) {
                token.cancel();
            }
            return Err(OrchestratorError::LockFailed("lease expired".into()));
        }

        job.lock_expires_at = Some(Utc::now() + Duration::seconds(self.lease_ttl_secs));
        self.save(&mut job).await?;
        Ok(())
    }

    fn try_acquire_lock(&self, job: &IndexJob) -> bool {
        let mut locks = self.locks.lock();
        match locks.get(&job.key()) {
            Some(holder) if holder != &job.id => false,
            _ => {
                locks.insert(job.key(), job.id.clone());
                true
            }
        }
    }

    fn release_lock(&self, job: &IndexJob) {
        let mut locks = self.locks.lock();
        if locks.get(&job.key()).map(|h| h == &job.id).unwrap_or(false) {
            locks.remove(&job.key());
        }
    }

    async fn save(&self, job: &mut IndexJob) -> Result<()> {
        self.jobs.lock().insert(job.id.clone(), job.clone());
        self.job_store.save(job).await
    }
}
