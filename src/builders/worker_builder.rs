//! Builders to construct stores and worker sets from configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{parse_worker_spec, RunnerConfig, StoreBackendConfig};
use crate::core::{JobRegistry, QueueError, Worker};
use crate::infra::store::sqlite::SqliteOptions;
use crate::infra::store::{MemoryStore, RetryPolicy, SqliteStore, StoreAdapter};

/// Build a store adapter from backend configuration.
///
/// # Errors
///
/// Returns [`QueueError::Store`] when the backend cannot be opened or its
/// table mapping is unresolvable.
pub fn build_store(
    cfg: &RunnerConfig,
) -> Result<Arc<dyn StoreAdapter>, QueueError> {
    let policy = RetryPolicy {
        max_attempts: cfg.max_attempts,
    };
    match &cfg.store {
        StoreBackendConfig::Memory => Ok(Arc::new(MemoryStore::with_policy(policy))),
        StoreBackendConfig::Sqlite { path, table } => {
            let conn = rusqlite::Connection::open(path).map_err(|e| {
                QueueError::Store(crate::infra::store::StoreError::Backend(e.to_string()))
            })?;
            let store = SqliteStore::from_connection(
                conn,
                SqliteOptions {
                    table: table.clone(),
                    policy,
                },
            )?;
            Ok(Arc::new(store))
        }
    }
}

/// Build one worker per configured slot, sharing an adapter and registry.
///
/// Each worker derives its process title from the slot and carries its own
/// shutdown token.
///
/// # Errors
///
/// Returns the config validation message wrapped in
/// [`QueueError::AdapterRequired`]-class errors from the worker builder, or
/// a [`QueueError::Store`] from backend construction.
pub fn build_workers(
    cfg: &RunnerConfig,
    adapter: Arc<dyn StoreAdapter>,
    registry: Arc<JobRegistry>,
) -> Result<Vec<Worker>, QueueError> {
    let slots = parse_worker_spec(&cfg.workers).map_err(|e| {
        QueueError::Store(crate::infra::store::StoreError::Backend(format!(
            "config invalid: {e}"
        )))
    })?;

    let mut workers = Vec::with_capacity(slots.len());
    for slot in slots {
        let mut builder = Worker::builder()
            .adapter(Arc::clone(&adapter))
            .registry(Arc::clone(&registry))
            .process_name(slot.title(&cfg.title_prefix))
            .wait_time(Duration::from_secs(cfg.wait_time_secs))
            .max_runtime(Duration::from_secs(cfg.max_runtime_secs))
            .workoff(cfg.workoff);
        if let Some(queue) = slot.queue {
            builder = builder.queue(queue);
        }
        workers.push(builder.build()?);
    }
    Ok(workers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(workers: &str) -> RunnerConfig {
        RunnerConfig::from_json_str(&format!(
            r#"{{"workers": "{workers}", "store": "memory"}}"#
        ))
        .unwrap()
    }

    #[test]
    fn builds_one_worker_per_slot() {
        let cfg = config("default:2,email:1");
        let adapter = build_store(&cfg).unwrap();
        let workers = build_workers(&cfg, adapter, Arc::new(JobRegistry::new())).unwrap();
        assert_eq!(workers.len(), 3);
        assert_eq!(workers[0].process_name(), "bw-worker.default.0");
        assert_eq!(workers[2].process_name(), "bw-worker.email.0");
    }

    #[test]
    fn sqlite_backend_with_missing_table_fails_fast() {
        let cfg = RunnerConfig::from_json_str(
            r#"{"store": {"sqlite": {"path": ":memory:", "table": "nope"}}}"#,
        )
        .unwrap();
        assert!(build_store(&cfg).is_err());
    }
}
