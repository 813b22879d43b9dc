//! Store adapters.
//!
//! The store adapter is the only component that talks to the durable store.
//! It persists [`JobRecord`]s, atomically claims the next runnable one for a
//! worker, and records success or failure outcomes. All worker coordination
//! happens through the store's atomicity guarantees; there is no in-process
//! locking shared between workers.

pub mod memory;
pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::job::SchedulePayload;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Store-assigned job identifier, immutable for the life of the record.
pub type JobId = i64;

/// Errors produced by store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The adapter is pointed at a store with no matching schema, detected at
    /// adapter construction.
    #[error("schema error: {0}")]
    Schema(String),
    /// Backend-specific failure with context. Workers treat this as a failed
    /// claim attempt, not a fatal process error.
    #[error("backend error: {0}")]
    Backend(String),
}

/// A persisted job, the durable representation of one unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique, store-assigned identifier.
    pub id: JobId,
    /// Name of the handler to invoke.
    pub handler: String,
    /// Ordered arguments passed to the handler's `perform`.
    pub args: Vec<serde_json::Value>,
    /// Logical partition; workers may restrict themselves to one queue.
    pub queue: String,
    /// Lower value is higher priority, 1 is highest.
    pub priority: i32,
    /// The job must not be claimed before this time.
    pub run_at: DateTime<Utc>,
    /// When a worker claimed the row; `None` when unclaimed.
    pub locked_at: Option<DateTime<Utc>>,
    /// Claim identity of the owning worker process.
    pub locked_by: Option<String>,
    /// Number of claim attempts, incremented each time the row is claimed.
    pub attempts: u32,
    /// Diagnostic text from the most recent failure.
    pub last_error: Option<String>,
    /// Once set, the job is terminally failed and never claimed again.
    pub failed_at: Option<DateTime<Utc>>,
    /// Record creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Whether this row may be claimed by `process_name` at `now`.
    ///
    /// A row is claimable iff it has not terminally failed and either it is
    /// due with no live lock, or it is already owned by this same process
    /// (self-healing re-claim after a restart under the same identity).
    #[must_use]
    pub fn claimable(&self, process_name: &str, max_runtime: Duration, now: DateTime<Utc>) -> bool {
        if self.failed_at.is_some() {
            return false;
        }
        if self.locked_by.as_deref() == Some(process_name) {
            return true;
        }
        // A window too large for chrono saturates; a lock under a window
        // that predates representable time can never be stale.
        let window = chrono::Duration::from_std(max_runtime).unwrap_or(chrono::Duration::MAX);
        self.run_at <= now
            && self.locked_at.map_or(true, |locked| {
                now.checked_sub_signed(window)
                    .is_some_and(|stale_before| locked < stale_before)
            })
    }
}

/// Parameters for a single claim attempt.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    /// Claim identity written into `locked_by`, unique per worker process.
    pub process_name: String,
    /// Restrict the search to one queue; `None` claims from any queue.
    pub queue: Option<String>,
    /// Staleness window after which an existing lock is considered abandoned.
    pub max_runtime: Duration,
}

/// Decides when a failed job becomes terminal instead of being retried.
///
/// A job that fails with attempts still remaining keeps its lock; the lock
/// goes stale after `max_runtime` and the row is picked up again by a later
/// claim cycle, so the staleness window doubles as the retry backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Claim attempts after which a failure is terminal.
    pub max_attempts: u32,
}

/// Default number of claim attempts before a failing job is marked terminal.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Whether a job that failed on its `attempts`-th claim is terminal.
    #[must_use]
    pub const fn is_terminal(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Abstraction over durable job storage.
///
/// `claim_next` is the only synchronization primitive in the system: under N
/// concurrent calls racing for the same row, exactly one succeeds and the
/// rest observe zero rows affected and re-poll.
#[async_trait]
pub trait StoreAdapter: Send + Sync + 'static {
    /// Persist a new job with `attempts = 0` and no lock, error, or failure
    /// recorded. Identical payloads produce independent records; no
    /// deduplication is attempted. Returns the created record.
    async fn insert(&self, payload: SchedulePayload) -> Result<JobRecord, StoreError>;

    /// Find the best-ranked claimable row (`priority ASC, run_at ASC`) and
    /// atomically transition it to locked, re-checking claimability in the
    /// write predicate. Returns `None` when no claimable row exists.
    async fn claim_next(&self, req: &ClaimRequest) -> Result<Option<JobRecord>, StoreError>;

    /// Remove the record for a completed job. Idempotent: reporting success
    /// for an already-removed job is a no-op, not an error.
    async fn report_success(&self, id: JobId) -> Result<(), StoreError>;

    /// Record `last_error` for a failed job. Marks the job terminally failed
    /// when the retry policy says its attempts are exhausted; otherwise the
    /// still-held lock expires via the staleness window and the job is
    /// retried by a later claim cycle.
    async fn report_failure(&self, id: JobId, error: &str) -> Result<(), StoreError>;
}
