//! Execution of claimed job records.
//!
//! The executor owns no state beyond the single in-flight job: it resolves
//! the record's handler name against the registry, invokes `perform`, and
//! reports the outcome back through the store adapter. A failing job body is
//! captured and recorded, never rethrown; the worker loop above must keep
//! running regardless of individual job outcomes.

use std::sync::Arc;

use crate::core::error::QueueError;
use crate::core::registry::JobRegistry;
use crate::infra::store::{JobRecord, StoreAdapter};

/// Runs claimed jobs and reports their outcomes.
#[derive(Clone)]
pub struct Executor {
    adapter: Arc<dyn StoreAdapter>,
    registry: Arc<JobRegistry>,
}

impl Executor {
    /// Create an executor over an adapter and a handler registry.
    #[must_use]
    pub fn new(adapter: Arc<dyn StoreAdapter>, registry: Arc<JobRegistry>) -> Self {
        Self { adapter, registry }
    }

    /// Execute one claimed record and report success or failure.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::HandlerNotFound`] when the record names an
    /// unregistered handler (a configuration error, fatal to the worker) and
    /// [`QueueError::Store`] when reporting the outcome fails. A job body
    /// that raises is not an error here.
    pub async fn execute(&self, job: &JobRecord) -> Result<(), QueueError> {
        let handler =
            self.registry
                .get(&job.handler)
                .ok_or_else(|| QueueError::HandlerNotFound {
                    handler: job.handler.clone(),
                })?;

        tracing::info!(handler = %job.handler, job_id = job.id, "job started");

        match handler.perform(&job.args).await {
            Ok(()) => {
                tracing::info!(handler = %job.handler, job_id = job.id, "job succeeded");
                self.adapter.report_success(job.id).await?;
            }
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::warn!(
                    handler = %job.handler,
                    job_id = job.id,
                    error = %detail,
                    "job failed"
                );
                self.adapter.report_failure(job.id, &detail).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AppResult;
    use crate::core::job::{JobHandler, SchedulePayload};
    use crate::infra::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;

    struct OkJob;

    #[async_trait]
    impl JobHandler for OkJob {
        fn name(&self) -> &'static str {
            "OkJob"
        }

        async fn perform(&self, _args: &[serde_json::Value]) -> AppResult<()> {
            Ok(())
        }
    }

    struct FailingJob;

    #[async_trait]
    impl JobHandler for FailingJob {
        fn name(&self) -> &'static str {
            "FailingJob"
        }

        async fn perform(&self, _args: &[serde_json::Value]) -> AppResult<()> {
            anyhow::bail!("out of stock")
        }
    }

    fn payload(handler: &str) -> SchedulePayload {
        SchedulePayload {
            handler: handler.to_string(),
            args: vec![],
            run_at: Utc::now(),
            queue: "default".to_string(),
            priority: 50,
        }
    }

    #[tokio::test]
    async fn success_removes_the_record() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(JobRegistry::new().register(Arc::new(OkJob)));
        let job = store.insert(payload("OkJob")).await.unwrap();

        Executor::new(store.clone(), registry)
            .execute(&job)
            .await
            .unwrap();
        assert!(store.get(job.id).is_none());
    }

    #[tokio::test]
    async fn failure_is_captured_and_recorded() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(JobRegistry::new().register(Arc::new(FailingJob)));
        let job = store.insert(payload("FailingJob")).await.unwrap();

        // The job body raised, but execute itself succeeds.
        Executor::new(store.clone(), registry)
            .execute(&job)
            .await
            .unwrap();

        let stored = store.get(job.id).unwrap();
        assert!(stored.last_error.as_deref().unwrap().contains("out of stock"));
    }

    #[tokio::test]
    async fn unknown_handler_is_a_configuration_error() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(JobRegistry::new());
        let job = store.insert(payload("GhostJob")).await.unwrap();

        let err = Executor::new(store, registry).execute(&job).await.unwrap_err();
        assert!(matches!(err, QueueError::HandlerNotFound { ref handler } if handler == "GhostJob"));
    }
}
