//! SQLite store adapter.
//!
//! The reference relational backend. `claim_next` runs its find and its
//! conditional lock write inside one `BEGIN IMMEDIATE` transaction, and the
//! update predicate repeats the claimability condition, so a claimer that
//! raced on the same row updates zero rows and searches again.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::core::job::SchedulePayload;
use crate::infra::store::{
    ClaimRequest, JobId, JobRecord, RetryPolicy, StoreAdapter, StoreError,
};

/// Physical table used when none is configured.
pub const DEFAULT_TABLE: &str = "background_jobs";

/// Construction options for [`SqliteStore`].
#[derive(Debug, Clone, Default)]
pub struct SqliteOptions {
    /// Physical table name. When set, the table must already exist; when
    /// unset, [`DEFAULT_TABLE`] is created on open.
    pub table: Option<String>,
    /// Retry policy applied by `report_failure`.
    pub policy: RetryPolicy,
}

/// SQLite-backed job store.
///
/// The connection is guarded by a mutex; every statement issued through it is
/// short, so adapter calls block only briefly.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
    policy: RetryPolicy,
}

/// Row values before millis/JSON decoding.
struct RawJob {
    id: JobId,
    handler: String,
    args: String,
    queue: String,
    priority: i32,
    run_at: i64,
    locked_at: Option<i64>,
    locked_by: Option<String>,
    attempts: u32,
    last_error: Option<String>,
    failed_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

const COLUMNS: &str = "id, handler, args, queue, priority, run_at, locked_at, \
                       locked_by, attempts, last_error, failed_at, created_at, updated_at";

impl SqliteStore {
    /// Open or create a job database at `path` with default options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::from_connection(conn, SqliteOptions::default())
    }

    /// Open an in-memory job database, for tests and inline workers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the database cannot be opened.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::from_connection(conn, SqliteOptions::default())
    }

    /// Build a store over an existing connection.
    ///
    /// The logical-to-physical table mapping is resolved here and fails fast:
    /// a configured table that does not exist (or an invalid identifier) is a
    /// [`StoreError::Schema`] at construction, not a runtime surprise.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Schema`] for a bad table mapping and
    /// [`StoreError::Backend`] for connection failures.
    pub fn from_connection(conn: Connection, options: SqliteOptions) -> Result<Self, StoreError> {
        let table = options.table.unwrap_or_else(|| DEFAULT_TABLE.to_string());
        if !is_valid_identifier(&table) {
            return Err(StoreError::Schema(format!(
                "`{table}` is not a valid table name"
            )));
        }

        if table == DEFAULT_TABLE {
            conn.execute_batch(&migration(&table)).map_err(backend)?;
        } else {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |row| row.get(0),
                )
                .optional()
                .map_err(backend)?;
            if exists.is_none() {
                return Err(StoreError::Schema(format!(
                    "no table named `{table}` in this database"
                )));
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            table,
            policy: options.policy,
        })
    }

    /// Number of records currently held, including failed ones.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the count query fails.
    pub fn len(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
                row.get(0)
            })
            .map_err(backend)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Fetch a snapshot of one record by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the lookup fails.
    pub fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM {} WHERE id = ?1", self.table),
                params![id],
                read_raw,
            )
            .optional()
            .map_err(backend)?;
        raw.map(RawJob::into_record).transpose()
    }

    fn fetch_locked(tx: &Transaction<'_>, table: &str, id: JobId) -> Result<JobRecord, StoreError> {
        tx.query_row(
            &format!("SELECT {COLUMNS} FROM {table} WHERE id = ?1"),
            params![id],
            read_raw,
        )
        .map_err(backend)?
        .into_record()
    }
}

#[async_trait]
impl StoreAdapter for SqliteStore {
    async fn insert(&self, payload: SchedulePayload) -> Result<JobRecord, StoreError> {
        let now = Utc::now();
        let args = serde_json::to_string(&payload.args)
            .map_err(|e| StoreError::Backend(format!("args not serializable: {e}")))?;

        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO {} (handler, args, queue, priority, run_at, attempts, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
                self.table
            ),
            params![
                payload.handler,
                args,
                payload.queue,
                payload.priority,
                payload.run_at.timestamp_millis(),
                now.timestamp_millis(),
            ],
        )
        .map_err(backend)?;

        Ok(JobRecord {
            id: conn.last_insert_rowid(),
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
        })
    }

    async fn claim_next(&self, req: &ClaimRequest) -> Result<Option<JobRecord>, StoreError> {
        let now_ms = Utc::now().timestamp_millis();
        let runtime_ms = i64::try_from(req.max_runtime.as_millis()).unwrap_or(i64::MAX);
        let stale_ms = now_ms.saturating_sub(runtime_ms);

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend)?;

        // The claimability predicate appears in both statements: the SELECT
        // ranks candidates, the UPDATE re-checks at write time. A writer that
        // lost the race changes zero rows and goes back to searching.
        let claimable = "failed_at IS NULL \
             AND (?1 IS NULL OR queue = ?1) \
             AND ((run_at <= ?2 AND (locked_at IS NULL OR locked_at < ?3)) OR locked_by = ?4)";

        let claimed = loop {
            let candidate: Option<JobId> = tx
                .query_row(
                    &format!(
                        "SELECT id FROM {} WHERE {claimable} \
                         ORDER BY priority ASC, run_at ASC LIMIT 1",
                        self.table
                    ),
                    params![req.queue, now_ms, stale_ms, req.process_name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(backend)?;

            let Some(id) = candidate else {
                break None;
            };

            let changed = tx
                .execute(
                    &format!(
                        "UPDATE {} SET locked_at = ?2, locked_by = ?4, \
                         attempts = attempts + 1, updated_at = ?2 \
                         WHERE id = ?5 AND {claimable}",
                        self.table
                    ),
                    params![req.queue, now_ms, stale_ms, req.process_name, id],
                )
                .map_err(backend)?;

            if changed == 1 {
                break Some(Self::fetch_locked(&tx, &self.table, id)?);
            }
            // Lost the race on this row; not an error, search again.
            tracing::debug!(job_id = id, process = %req.process_name, "claim race lost");
        };

        tx.commit().map_err(backend)?;
        Ok(claimed)
    }

    async fn report_success(&self, id: JobId) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        // Zero rows deleted means the job already completed; stay quiet.
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.table),
            params![id],
        )
        .map_err(backend)?;
        Ok(())
    }

    async fn report_failure(&self, id: JobId, error: &str) -> Result<(), StoreError> {
        let now_ms = Utc::now().timestamp_millis();
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend)?;

        let attempts: Option<u32> = tx
            .query_row(
                &format!("SELECT attempts FROM {} WHERE id = ?1", self.table),
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;

        if let Some(attempts) = attempts {
            let failed_at = if self.policy.is_terminal(attempts) {
                tracing::warn!(job_id = id, attempts, "job terminally failed");
                Some(now_ms)
            } else {
                None
            };
            tx.execute(
                &format!(
                    "UPDATE {} SET last_error = ?2, failed_at = ?3, updated_at = ?4 \
                     WHERE id = ?1",
                    self.table
                ),
                params![id, error, failed_at, now_ms],
            )
            .map_err(backend)?;
        }

        tx.commit().map_err(backend)?;
        Ok(())
    }
}

impl RawJob {
    fn into_record(self) -> Result<JobRecord, StoreError> {
        Ok(JobRecord {
            id: self.id,
            handler: self.handler,
            args: serde_json::from_str(&self.args)
                .map_err(|e| StoreError::Backend(format!("stored args unreadable: {e}")))?,
            queue: self.queue,
            priority: self.priority,
            run_at: from_millis(self.run_at)?,
            locked_at: self.locked_at.map(from_millis).transpose()?,
            locked_by: self.locked_by,
            attempts: self.attempts,
            last_error: self.last_error,
            failed_at: self.failed_at.map(from_millis).transpose()?,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        id: row.get(0)?,
        handler: row.get(1)?,
        args: row.get(2)?,
        queue: row.get(3)?,
        priority: row.get(4)?,
        run_at: row.get(5)?,
        locked_at: row.get(6)?,
        locked_by: row.get(7)?,
        attempts: row.get(8)?,
        last_error: row.get(9)?,
        failed_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {ms}")))
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn migration(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            handler TEXT NOT NULL,
            args TEXT NOT NULL,
            queue TEXT NOT NULL,
            priority INTEGER NOT NULL,
            run_at INTEGER NOT NULL,
            locked_at INTEGER,
            locked_by TEXT,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            failed_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_claim ON {table} (priority, run_at);
        CREATE INDEX IF NOT EXISTS idx_{table}_queue ON {table} (queue);"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn payload(handler: &str, priority: i32) -> SchedulePayload {
        SchedulePayload {
            handler: handler.to_string(),
            args: vec![serde_json::json!("foo"), serde_json::json!(42)],
            run_at: Utc::now(),
            queue: "default".to_string(),
            priority,
        }
    }

    fn claim(process: &str) -> ClaimRequest {
        ClaimRequest {
            process_name: process.to_string(),
            queue: None,
            max_runtime: Duration::from_secs(4 * 60 * 60),
        }
    }

    #[test]
    fn unknown_table_fails_at_construction() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteStore::from_connection(
            conn,
            SqliteOptions {
                table: Some("missing_jobs".to_string()),
                policy: RetryPolicy::default(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[test]
    fn invalid_table_name_fails_at_construction() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteStore::from_connection(
            conn,
            SqliteOptions {
                table: Some("jobs; DROP TABLE jobs".to_string()),
                policy: RetryPolicy::default(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[tokio::test]
    async fn insert_roundtrips_args() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = store.insert(payload("A", 50)).await.unwrap();
        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.handler, "A");
        assert_eq!(stored.args, vec![serde_json::json!("foo"), serde_json::json!(42)]);
        assert_eq!(stored.attempts, 0);
        assert!(stored.locked_at.is_none());
    }

    #[tokio::test]
    async fn claims_honor_priority_then_time() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(payload("A", 50)).await.unwrap();
        store.insert(payload("B", 10)).await.unwrap();
        store.insert(payload("C", 30)).await.unwrap();

        let mut order = Vec::new();
        while let Some(job) = store.claim_next(&claim("w1")).await.unwrap() {
            order.push(job.handler.clone());
            store.report_success(job.id).await.unwrap();
        }
        assert_eq!(order, ["B", "C", "A"]);
    }

    #[tokio::test]
    async fn claimed_row_is_invisible_to_other_workers() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(payload("A", 50)).await.unwrap();
        assert!(store.claim_next(&claim("w1")).await.unwrap().is_some());
        assert!(store.claim_next(&claim("w2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_lock_is_reclaimed() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(payload("A", 50)).await.unwrap();
        assert!(store.claim_next(&claim("w1")).await.unwrap().is_some());

        // Timestamps are millisecond-granular; let the lock age past zero.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let req = ClaimRequest {
            process_name: "w2".to_string(),
            queue: None,
            max_runtime: Duration::ZERO,
        };
        let reclaimed = store.claim_next(&req).await.unwrap().unwrap();
        assert_eq!(reclaimed.locked_by.as_deref(), Some("w2"));
        assert_eq!(reclaimed.attempts, 2);
    }

    #[tokio::test]
    async fn success_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = store.insert(payload("A", 50)).await.unwrap();
        store.report_success(job.id).await.unwrap();
        store.report_success(job.id).await.unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn failure_records_error_then_goes_terminal() {
        let store = SqliteStore::from_connection(
            Connection::open_in_memory().unwrap(),
            SqliteOptions {
                table: None,
                policy: RetryPolicy { max_attempts: 1 },
            },
        )
        .unwrap();

        let job = store.insert(payload("A", 50)).await.unwrap();
        store.claim_next(&claim("w1")).await.unwrap().unwrap();
        store.report_failure(job.id, "boom").await.unwrap();

        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.last_error.as_deref(), Some("boom"));
        assert!(stored.failed_at.is_some());
        assert!(store.claim_next(&claim("w1")).await.unwrap().is_none());
    }
}
