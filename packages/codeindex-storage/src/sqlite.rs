//! SQLite-backed job and progress stores
//!
//! Durable enough to survive process restart; rows serialize the models as
//! JSON so schema evolution stays in the models. Connections are guarded by
//! a mutex: the coordinator writes from one task at a time and reads are
//! cheap.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

use codeindex_orchestration::error::{OrchestratorError, Result};
use codeindex_orchestration::job::{IndexJob, JobStatus, JobStore};
use codeindex_orchestration::progress::{JobProgress, ProgressStore};

fn storage_err(e: rusqlite::Error) -> OrchestratorError {
    OrchestratorError::serialization(format!("sqlite: {}", e))
}

pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS index_jobs (
                id TEXT PRIMARY KEY,
                repo_id TEXT NOT NULL,
                snapshot_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL
            )",
            [],
        )
        .map_err(storage_err)?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_jobs_repo ON index_jobs (repo_id, snapshot_id)",
            [],
        )
        .map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn status_str(status: JobStatus) -> &'static str {
        match status {
            JobStatus::Queued => "queued",
            JobStatus::AcquiringLock => "acquiring_lock",
            JobStatus::LockFailed => "lock_failed",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Deduped => "deduped",
            JobStatus::Superseded => "superseded",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn save(&self, job: &IndexJob) -> Result<()> {
        let payload =
            serde_json::to_string(job).map_err(OrchestratorError::serialization)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO index_jobs (id, repo_id, snapshot_id, status, created_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                payload = excluded.payload",
            rusqlite::params![
                job.id,
                job.repo_id,
                job.snapshot_id,
                Self::status_str(job.status),
                job.created_at.to_rfc3339(),
                payload,
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<IndexJob>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT payload FROM index_jobs WHERE id = ?1")
            .map_err(storage_err)?;
        let mut rows = stmt.query([job_id]).map_err(storage_err)?;

        match rows.next().map_err(storage_err)? {
            Some(row) => {
                let payload: String = row.get(0).map_err(storage_err)?;
                let job = serde_json::from_str(&payload)
                    .map_err(OrchestratorError::serialization)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        repo_id: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<Vec<IndexJob>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT payload FROM index_jobs ORDER BY created_at")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(storage_err)?;

        let mut jobs = Vec::new();
        for payload in rows {
            let payload = payload.map_err(storage_err)?;
            let job: IndexJob = serde_json::from_str(&payload)
                .map_err(OrchestratorError::serialization)?;
            if repo_id.map(|r| job.repo_id == r).unwrap_or(true)
                && status.map(|s| job.status == s).unwrap_or(true)
            {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }
}

pub struct SqliteProgressStore {
    conn: Mutex<Connection>,
}

impl SqliteProgressStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS job_progress (
                job_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            )",
            [],
        )
        .map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn persist(&self, progress: &JobProgress) -> Result<()> {
        let payload =
            serde_json::to_string(progress).map_err(OrchestratorError::serialization)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO job_progress (job_id, payload) VALUES (?1, ?2)
             ON CONFLICT(job_id) DO UPDATE SET payload = excluded.payload",
            rusqlite::params![progress.job_id, payload],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn load(&self, job_id: &str) -> Result<Option<JobProgress>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT payload FROM job_progress WHERE job_id = ?1")
            .map_err(storage_err)?;
        let mut rows = stmt.query([job_id]).map_err(storage_err)?;

        match rows.next().map_err(storage_err)? {
            Some(row) => {
                let payload: String = row.get(0).map_err(storage_err)?;
                let progress = serde_json::from_str(&payload)
                    .map_err(OrchestratorError::serialization)?;
                Ok(Some(progress))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, job_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM job_progress WHERE job_id = ?1", [job_id])
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeindex_orchestration::job::TriggerType;
    use codeindex_orchestration::progress::IndexJobCheckpoint;

    #[tokio::test]
    async fn test_job_store_roundtrip() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let job = IndexJob::new("r", "main", TriggerType::Manual, None, false);

        store.save(&job).await.unwrap();
        let loaded = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.repo_id, "r");
        assert_eq!(loaded.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_job_store_update_and_filter() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let mut job = IndexJob::new("r", "main", TriggerType::Manual, None, false);
        store.save(&job).await.unwrap();

        job.status = JobStatus::Completed;
        store.save(&job).await.unwrap();

        let completed = store
            .list(Some("r"), Some(JobStatus::Completed))
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        let queued = store.list(Some("r"), Some(JobStatus::Queued)).await.unwrap();
        assert!(queued.is_empty());
    }

    #[tokio::test]
    async fn test_progress_store_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("progress.db");

        {
            let store = SqliteProgressStore::open(&db_path).unwrap();
            let mut progress = JobProgress::new("job1");
            progress.mark_file_completed("a.py");
            progress.advance(IndexJobCheckpoint::ParsingCompleted);
            store.persist(&progress).await.unwrap();
        }

        let store = SqliteProgressStore::open(&db_path).unwrap();
        let loaded = store.load("job1").await.unwrap().unwrap();
        assert_eq!(loaded.completed_files, vec!["a.py"]);
        assert_eq!(loaded.checkpoint, IndexJobCheckpoint::ParsingCompleted);

        store.delete("job1").await.unwrap();
        assert!(store.load("job1").await.unwrap().is_none());
    }
}
