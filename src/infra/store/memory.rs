//! In-memory store adapter.
//!
//! A mutex-guarded row table for development and tests. Holding the mutex
//! across the find-then-lock sequence gives `claim_next` the same atomicity
//! the relational backend gets from a transaction.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::core::job::SchedulePayload;
use crate::infra::store::{
    ClaimRequest, JobId, JobRecord, RetryPolicy, StoreAdapter, StoreError,
};

struct MemoryInner {
    next_id: JobId,
    jobs: Vec<JobRecord>,
}

/// In-memory job store backed by a mutex-guarded vec.
pub struct MemoryStore {
    policy: RetryPolicy,
    inner: Mutex<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with the default retry policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    /// Create an empty store with an explicit retry policy.
    #[must_use]
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(MemoryInner {
                next_id: 1,
                jobs: Vec::new(),
            }),
        }
    }

    /// Number of records currently held, including failed ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().jobs.is_empty()
    }

    /// Fetch a snapshot of one record by id.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.inner.lock().jobs.iter().find(|j| j.id == id).cloned()
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn insert(&self, payload: SchedulePayload) -> Result<JobRecord, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let record = JobRecord {
            id: inner.next_id,
            handler: payload.handler,
            args: payload.args,
            queue: payload.queue,
            priority: payload.priority,
            run_at: payload.run_at,
            locked_at: None,
            locked_by: None,
            attempts: 0,
            last_error: None,
            failed_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.next_id += 1;
        inner.jobs.push(record.clone());
        Ok(record)
    }

    async fn claim_next(&self, req: &ClaimRequest) -> Result<Option<JobRecord>, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        // The mutex is held across find and update, so the claimability check
        // and the lock write form one atomic unit.
        let best = inner
            .jobs
            .iter_mut()
            .filter(|job| req.queue.as_deref().map_or(true, |q| job.queue == q))
            .filter(|job| job.claimable(&req.process_name, req.max_runtime, now))
            .min_by_key(|job| (job.priority, job.run_at));

        let Some(job) = best else {
            tracing::debug!(process = %req.process_name, "no claimable job");
            return Ok(None);
        };

        job.locked_at = Some(now);
        job.locked_by = Some(req.process_name.clone());
        job.attempts += 1;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn report_success(&self, id: JobId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        // Removing an already-removed record is a no-op, not an error.
        inner.jobs.retain(|job| job.id != id);
        Ok(())
    }

    async fn report_failure(&self, id: JobId, error: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        let policy = self.policy;
        let mut inner = self.inner.lock();
        if let Some(job) = inner.jobs.iter_mut().find(|job| job.id == id) {
            job.last_error = Some(error.to_string());
            job.updated_at = now;
            if policy.is_terminal(job.attempts) {
                job.failed_at = Some(now);
                tracing::warn!(job_id = id, attempts = job.attempts, "job terminally failed");
            }
        }
        Ok(())
    }
}
