//! Durable job store.
//!
//! Every mutation of a job is serialized through that job's own lock and is
//! written to the [`JobPersistence`] backend before it becomes visible in
//! memory, so a failed write never leaves memory ahead of disk. Different jobs
//! mutate concurrently.

use crate::clock::Clock;
use crate::error::StoreError;
use crate::job::{Job, JobStatus, log_line};
use async_trait::async_trait;
use passbook_core::{BookingOutcome, JobId};
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::io::AsyncWriteExt;

/// Where job records and logs are kept.
#[async_trait]
pub trait JobPersistence: Send + Sync {
    /// Writes the full record atomically.
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    /// Appends one line to the job's log and flushes it.
    async fn append_log(&self, job_id: JobId, line: &str) -> Result<(), StoreError>;

    /// The job's durable log, if one exists.
    async fn read_logs(&self, job_id: JobId) -> Result<Option<Vec<String>>, StoreError>;

    /// Removes the record and its log.
    async fn remove(&self, job_id: JobId) -> Result<(), StoreError>;

    /// Every persisted job, logs included.
    async fn load(&self) -> Result<Vec<Job>, StoreError>;
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Persistence {
        reason: format!("{}: {e}", path.display()),
    }
}

/// One JSON record per job under `jobs/`, one log file per job under `logs/`.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    jobs_dir: PathBuf,
    logs_dir: PathBuf,
}

impl FilePersistence {
    /// Opens (creating if needed) the data directory.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the directories cannot be created.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let jobs_dir = root.join("jobs");
        let logs_dir = root.join("logs");
        for dir in [&jobs_dir, &logs_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_error(dir, e))?;
        }
        Ok(Self { jobs_dir, logs_dir })
    }

    fn record_path(&self, job_id: JobId) -> PathBuf {
        self.jobs_dir.join(format!("{job_id}.json"))
    }

    fn log_path(&self, job_id: JobId) -> PathBuf {
        self.logs_dir.join(format!("{job_id}.log"))
    }

    async fn read_record(&self, path: &Path) -> Result<Job, StoreError> {
        let body = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;
        let mut job: Job = serde_json::from_slice(&body).map_err(|e| StoreError::CorruptRecord {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        job.logs = self.read_logs(job.id).await?.unwrap_or_default();
        Ok(job)
    }
}

#[async_trait]
impl JobPersistence for FilePersistence {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let path = self.record_path(job.id);
        let staging = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(job).map_err(|e| StoreError::Persistence {
            reason: e.to_string(),
        })?;

        let mut file = tokio::fs::File::create(&staging)
            .await
            .map_err(|e| io_error(&staging, e))?;
        file.write_all(&body)
            .await
            .map_err(|e| io_error(&staging, e))?;
        file.sync_all().await.map_err(|e| io_error(&staging, e))?;
        drop(file);

        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn append_log(&self, job_id: JobId, line: &str) -> Result<(), StoreError> {
        let path = self.log_path(job_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        file.write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| io_error(&path, e))?;
        file.sync_data().await.map_err(|e| io_error(&path, e))
    }

    async fn read_logs(&self, job_id: JobId) -> Result<Option<Vec<String>>, StoreError> {
        let path = self.log_path(job_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => Ok(Some(
                body.lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn remove(&self, job_id: JobId) -> Result<(), StoreError> {
        for path in [self.record_path(job_id), self.log_path(job_id)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(&path, e)),
            }
        }
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Job>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.jobs_dir)
            .await
            .map_err(|e| io_error(&self.jobs_dir, e))?;
        let mut jobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.jobs_dir, e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match self.read_record(&path).await {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable job record"),
            }
        }
        Ok(jobs)
    }
}

/// In-process persistence for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    records: Mutex<HashMap<JobId, Job>>,
    logs: Mutex<HashMap<JobId, Vec<String>>>,
    failing: AtomicBool,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The record as last written.
    #[must_use]
    pub fn record(&self, job_id: JobId) -> Option<Job> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence {
                reason: "write refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl JobPersistence for MemoryPersistence {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut record = job.clone();
        record.logs.clear();
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.id, record);
        Ok(())
    }

    async fn append_log(&self, job_id: JobId, line: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job_id)
            .or_default()
            .push(line.to_string());
        Ok(())
    }

    async fn read_logs(&self, job_id: JobId) -> Result<Option<Vec<String>>, StoreError> {
        Ok(self
            .logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned())
    }

    async fn remove(&self, job_id: JobId) -> Result<(), StoreError> {
        self.check_writable()?;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Job>, StoreError> {
        let records: Vec<Job> = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut jobs = Vec::with_capacity(records.len());
        for mut job in records {
            job.logs = self.read_logs(job.id).await?.unwrap_or_default();
            jobs.push(job);
        }
        Ok(jobs)
    }
}

type Entry = Arc<tokio::sync::Mutex<Job>>;

/// The authoritative collection of jobs.
pub struct JobStore {
    persistence: Arc<dyn JobPersistence>,
    clock: Arc<dyn Clock>,
    jobs: RwLock<HashMap<JobId, Entry>>,
}

impl JobStore {
    /// Creates an empty store; call [`load_all`](Self::load_all) to rehydrate.
    #[must_use]
    pub fn new(persistence: Arc<dyn JobPersistence>, clock: Arc<dyn Clock>) -> Self {
        Self {
            persistence,
            clock,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, job_id: JobId) -> Result<Entry, StoreError> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::NotFound { job_id })
    }

    fn entries(&self) -> Vec<Entry> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Applies `change` to a copy of the job, persists it, then commits it.
    async fn mutate<F>(&self, job_id: JobId, change: F) -> Result<Job, Report<StoreError>>
    where
        F: FnOnce(&mut Job) -> Result<(), StoreError> + Send,
    {
        let entry = self.entry(job_id)?;
        let mut current = entry.lock().await;
        let mut next = current.clone();
        change(&mut next)?;
        self.persistence.save(&next).await?;
        *current = next.clone();
        Ok(next)
    }

    /// Adds a new job.
    ///
    /// # Errors
    ///
    /// Fails if the id is taken or the record cannot be persisted.
    pub async fn create(&self, job: Job) -> Result<Job, Report<StoreError>> {
        if self.entry(job.id).is_ok() {
            return Err(StoreError::AlreadyExists { job_id: job.id }.into());
        }
        self.persistence.save(&job).await?;

        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists { job_id: job.id }.into());
        }
        jobs.insert(job.id, Arc::new(tokio::sync::Mutex::new(job.clone())));
        Ok(job)
    }

    /// A snapshot of one job.
    pub async fn get(&self, job_id: JobId) -> Option<Job> {
        let entry = self.entry(job_id).ok()?;
        let job = entry.lock().await;
        Some(job.clone())
    }

    /// Snapshots of all jobs, newest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs = Vec::new();
        for entry in self.entries() {
            jobs.push(entry.lock().await.clone());
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        jobs
    }

    /// Moves a job to `status`.
    ///
    /// # Errors
    ///
    /// Fails for an unknown job, an illegal transition, or a failed write.
    pub async fn update_status(
        &self,
        job_id: JobId,
        status: JobStatus,
    ) -> Result<Job, Report<StoreError>> {
        self.mutate(job_id, |job| job.transition(status)).await
    }

    /// `pending -> running`, recording when execution began.
    ///
    /// # Errors
    ///
    /// Fails unless the job is pending.
    pub async fn start(
        &self,
        job_id: JobId,
        executed_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Job, Report<StoreError>> {
        self.mutate(job_id, |job| {
            job.transition(JobStatus::Running)?;
            job.executed_at = Some(executed_at);
            Ok(())
        })
        .await
    }

    /// Records the outcome without changing status.
    ///
    /// # Errors
    ///
    /// Fails for an unknown job, a terminal job, or a failed write.
    pub async fn set_result(
        &self,
        job_id: JobId,
        outcome: BookingOutcome,
    ) -> Result<Job, Report<StoreError>> {
        self.mutate(job_id, |job| {
            if job.status.is_terminal() {
                return Err(StoreError::InvalidTransition {
                    job_id,
                    from: job.status,
                    to: job.status,
                });
            }
            job.result = Some(outcome);
            Ok(())
        })
        .await
    }

    /// `running -> completed | failed` with the outcome, in one write.
    ///
    /// # Errors
    ///
    /// Fails unless the job is running.
    pub async fn finish(
        &self,
        job_id: JobId,
        outcome: BookingOutcome,
    ) -> Result<Job, Report<StoreError>> {
        let status = if outcome.success {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        self.mutate(job_id, |job| {
            job.transition(status)?;
            job.result = Some(outcome);
            Ok(())
        })
        .await
    }

    /// Cancels a pending job. Returns `false`, changing nothing, for any other
    /// status or an unknown id.
    ///
    /// # Errors
    ///
    /// Fails only if the cancellation cannot be persisted.
    pub async fn cancel(&self, job_id: JobId) -> Result<bool, Report<StoreError>> {
        let Ok(entry) = self.entry(job_id) else {
            return Ok(false);
        };
        let mut current = entry.lock().await;
        if current.status != JobStatus::Pending {
            return Ok(false);
        }
        let mut next = current.clone();
        next.transition(JobStatus::Cancelled)?;
        self.persistence.save(&next).await?;
        *current = next;
        Ok(true)
    }

    /// Deletes a terminal job and its log. Returns the removed job.
    ///
    /// # Errors
    ///
    /// Fails if the files cannot be removed.
    pub async fn purge(&self, job_id: JobId) -> Result<Option<Job>, Report<StoreError>> {
        let Ok(entry) = self.entry(job_id) else {
            return Ok(None);
        };
        let current = entry.lock().await;
        if !current.status.is_terminal() {
            return Ok(None);
        }
        self.persistence.remove(job_id).await?;
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
        Ok(Some(current.clone()))
    }

    /// Appends a timestamped line to the job's log.
    ///
    /// # Errors
    ///
    /// Fails for an unknown job or if the line cannot be flushed.
    pub async fn append_log(
        &self,
        job_id: JobId,
        message: &str,
    ) -> Result<(), Report<StoreError>> {
        let entry = self.entry(job_id)?;
        let mut current = entry.lock().await;
        let line = log_line(self.clock.now(), message);
        self.persistence.append_log(job_id, &line).await?;
        current.logs.push(line);
        Ok(())
    }

    /// The job's log, preferring the durable copy.
    ///
    /// # Errors
    ///
    /// Fails if the durable log exists but cannot be read.
    pub async fn logs(&self, job_id: JobId) -> Result<Option<Vec<String>>, Report<StoreError>> {
        if let Some(lines) = self.persistence.read_logs(job_id).await? {
            return Ok(Some(lines));
        }
        Ok(self.get(job_id).await.map(|job| job.logs))
    }

    /// Replaces the in-memory state with everything persisted.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot be listed.
    pub async fn load_all(&self) -> Result<Vec<Job>, Report<StoreError>> {
        let jobs = self.persistence.load().await?;
        let mut map = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        map.clear();
        for job in &jobs {
            map.insert(job.id, Arc::new(tokio::sync::Mutex::new(job.clone())));
        }
        Ok(jobs)
    }

    /// Rewrites every record.
    ///
    /// # Errors
    ///
    /// Stops at the first failed write.
    pub async fn persist_all(&self) -> Result<(), Report<StoreError>> {
        for entry in self.entries() {
            let job = entry.lock().await;
            self.persistence.save(&job).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::secret::SecretRef;
    use chrono::{Duration, NaiveDate, Utc};
    use passbook_core::BookingRequest;

    fn new_job() -> Job {
        let now = Utc::now();
        Job::new(
            JobId::new(),
            BookingRequest::new(
                "7521",
                NaiveDate::from_ymd_opt(2025, 12, 1).expect("date"),
                "52",
            ),
            SecretRef::new("mem:x"),
            now + Duration::hours(1),
            now,
        )
    }

    fn memory_store() -> (Arc<MemoryPersistence>, JobStore) {
        let persistence = Arc::new(MemoryPersistence::new());
        let store = JobStore::new(persistence.clone(), Arc::new(SystemClock));
        (persistence, store)
    }

    #[tokio::test]
    async fn lifecycle_to_completion() {
        let (persistence, store) = memory_store();
        let job = store.create(new_job()).await.expect("create");

        let started = store.start(job.id, Utc::now()).await.expect("start");
        assert_eq!(started.status, JobStatus::Running);
        assert!(started.executed_at.is_some());

        let outcome = BookingOutcome {
            success: true,
            confirmation_id: Some("PB-1".to_string()),
            error: None,
        };
        let done = store.finish(job.id, outcome.clone()).await.expect("finish");
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result, Some(outcome));
        assert_eq!(
            persistence.record(job.id).map(|r| r.status),
            Some(JobStatus::Completed)
        );
    }

    #[tokio::test]
    async fn set_result_keeps_status_until_finished() {
        let (persistence, store) = memory_store();
        let job = store.create(new_job()).await.expect("create");
        store.start(job.id, Utc::now()).await.expect("start");

        let outcome = BookingOutcome {
            success: false,
            confirmation_id: None,
            error: Some("session expired".to_string()),
        };
        let updated = store
            .set_result(job.id, outcome.clone())
            .await
            .expect("set result");
        assert_eq!(updated.status, JobStatus::Running);
        assert_eq!(updated.result, Some(outcome.clone()));
        assert_eq!(
            persistence.record(job.id).and_then(|r| r.result),
            Some(outcome.clone())
        );

        store.finish(job.id, outcome.clone()).await.expect("finish");
        assert!(store.set_result(job.id, outcome.clone()).await.is_err());
        assert!(store.set_result(JobId::new(), outcome).await.is_err());
    }

    #[tokio::test]
    async fn persist_all_rewrites_every_record() {
        let (persistence, store) = memory_store();
        let first = store.create(new_job()).await.expect("create");
        let second = store.create(new_job()).await.expect("create");
        store.start(second.id, Utc::now()).await.expect("start");
        persistence.remove(first.id).await.expect("drop record");
        persistence.remove(second.id).await.expect("drop record");

        store.persist_all().await.expect("persist all");

        assert_eq!(
            persistence.record(first.id).map(|r| r.status),
            Some(JobStatus::Pending)
        );
        assert_eq!(
            persistence.record(second.id).map(|r| r.status),
            Some(JobStatus::Running)
        );

        persistence.set_failing(true);
        assert!(store.persist_all().await.is_err());
    }

    #[tokio::test]
    async fn terminal_state_cannot_be_reverted() {
        let (_, store) = memory_store();
        let job = store.create(new_job()).await.expect("create");
        assert!(store.cancel(job.id).await.expect("cancel"));

        assert!(store.start(job.id, Utc::now()).await.is_err());
        assert!(
            store
                .update_status(job.id, JobStatus::Pending)
                .await
                .is_err()
        );
        assert_eq!(
            store.get(job.id).await.map(|j| j.status),
            Some(JobStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn cancel_only_affects_pending() {
        let (_, store) = memory_store();
        let job = store.create(new_job()).await.expect("create");
        store.start(job.id, Utc::now()).await.expect("start");

        assert!(!store.cancel(job.id).await.expect("cancel"));
        assert_eq!(
            store.get(job.id).await.map(|j| j.status),
            Some(JobStatus::Running)
        );
        assert!(!store.cancel(JobId::new()).await.expect("unknown id"));
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let (persistence, store) = memory_store();
        let job = store.create(new_job()).await.expect("create");

        persistence.set_failing(true);
        assert!(store.start(job.id, Utc::now()).await.is_err());
        assert!(store.append_log(job.id, "lost").await.is_err());
        persistence.set_failing(false);

        let current = store.get(job.id).await.expect("exists");
        assert_eq!(current.status, JobStatus::Pending);
        assert!(current.logs.is_empty());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (_, store) = memory_store();
        let mut older = new_job();
        older.created_at -= Duration::minutes(10);
        let older = store.create(older).await.expect("create");
        let newer = store.create(new_job()).await.expect("create");

        let ids: Vec<JobId> = store.list().await.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn purge_requires_terminal_state() {
        let (persistence, store) = memory_store();
        let job = store.create(new_job()).await.expect("create");
        assert!(store.purge(job.id).await.expect("purge").is_none());

        store.cancel(job.id).await.expect("cancel");
        assert!(store.purge(job.id).await.expect("purge").is_some());
        assert!(store.get(job.id).await.is_none());
        assert!(persistence.record(job.id).is_none());
    }

    #[tokio::test]
    async fn concurrent_appends_keep_every_line() {
        let (_, store) = memory_store();
        let store = Arc::new(store);
        let job = store.create(new_job()).await.expect("create");

        let mut tasks = Vec::new();
        for n in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .append_log(job.id, &format!("line {n}"))
                    .await
                    .expect("append");
            }));
        }
        for task in tasks {
            task.await.expect("join");
        }

        let logs = store.logs(job.id).await.expect("logs").expect("present");
        assert_eq!(logs.len(), 20);
        assert_eq!(store.get(job.id).await.expect("job").logs, logs);
    }

    #[tokio::test]
    async fn file_persistence_survives_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job = new_job();
        {
            let persistence = Arc::new(FilePersistence::open(dir.path()).await.expect("open"));
            let store = JobStore::new(persistence, Arc::new(SystemClock));
            store.create(job.clone()).await.expect("create");
            store
                .append_log(job.id, "Booking scheduled")
                .await
                .expect("log");
            store.start(job.id, Utc::now()).await.expect("start");
        }

        let persistence = Arc::new(FilePersistence::open(dir.path()).await.expect("reopen"));
        let store = JobStore::new(persistence, Arc::new(SystemClock));
        let loaded = store.load_all().await.expect("load");

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, job.id);
        assert_eq!(loaded[0].status, JobStatus::Running);
        assert_eq!(loaded[0].logs.len(), 1);
        assert!(loaded[0].logs[0].ends_with("] Booking scheduled"));
    }

    #[tokio::test]
    async fn corrupt_records_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persistence = FilePersistence::open(dir.path()).await.expect("open");
        let job = new_job();
        persistence.save(&job).await.expect("save");
        std::fs::write(dir.path().join("jobs").join("garbage.json"), b"{not json")
            .expect("write garbage");
        std::fs::write(dir.path().join("jobs").join("notes.txt"), b"ignored")
            .expect("write stray file");

        let loaded = persistence.load().await.expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, job.id);
    }

    #[tokio::test]
    async fn save_leaves_no_staging_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persistence = FilePersistence::open(dir.path()).await.expect("open");
        let job = new_job();
        persistence.save(&job).await.expect("save");
        persistence.save(&job).await.expect("overwrite");

        let names: Vec<String> = std::fs::read_dir(dir.path().join("jobs"))
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.json", job.id)]);
    }
}
