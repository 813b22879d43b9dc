//! Enqueue surface for job definitions.
//!
//! A [`JobClient`] is the explicit configuration object that every enqueue
//! call goes through: it owns the store adapter reference and the global
//! scheduling defaults. `with_options` layers call-site options on a clone,
//! leaving the shared client untouched.

use std::sync::Arc;

use chrono::Utc;

use crate::core::error::QueueError;
use crate::core::job::{JobDefaults, JobHandler, ScheduleOptions};
use crate::infra::store::{JobRecord, StoreAdapter};

/// Client used by application code to enqueue jobs or run them inline.
#[derive(Clone)]
pub struct JobClient {
    adapter: Arc<dyn StoreAdapter>,
    defaults: JobDefaults,
    options: ScheduleOptions,
}

impl std::fmt::Debug for JobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobClient")
            .field("defaults", &self.defaults)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl JobClient {
    /// Create a client with default scheduling values.
    #[must_use]
    pub fn new(adapter: Arc<dyn StoreAdapter>) -> Self {
        Self {
            adapter,
            defaults: JobDefaults::default(),
            options: ScheduleOptions::default(),
        }
    }

    /// Start building a client, for callers wiring components from config.
    #[must_use]
    pub fn builder() -> JobClientBuilder {
        JobClientBuilder::default()
    }

    /// A copy of this client carrying call-site options for subsequent
    /// enqueues. The original client is not mutated.
    #[must_use]
    pub fn with_options(&self, options: ScheduleOptions) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            defaults: self.defaults.clone(),
            options,
        }
    }

    /// Build the schedule payload for `job` and persist it.
    ///
    /// Performs exactly one durable write; on failure nothing was persisted
    /// and the store cause is preserved in the returned error.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Scheduling`] when the insert fails.
    pub async fn enqueue(
        &self,
        job: &dyn JobHandler,
        args: Vec<serde_json::Value>,
    ) -> Result<JobRecord, QueueError> {
        let payload = self.options.payload(job, args, &self.defaults, Utc::now());
        tracing::info!(
            handler = %payload.handler,
            queue = %payload.queue,
            priority = payload.priority,
            run_at = %payload.run_at,
            "scheduling job"
        );

        let handler = payload.handler.clone();
        self.adapter
            .insert(payload)
            .await
            .map_err(|source| QueueError::Scheduling { handler, source })
    }

    /// Run `job` synchronously in the current process, bypassing persistence.
    ///
    /// # Errors
    ///
    /// Propagates [`QueueError::PerformNotImplemented`] unwrapped; any other
    /// failure from the job body is returned as [`QueueError::Perform`] with
    /// the cause preserved.
    pub async fn perform_now(
        &self,
        job: &dyn JobHandler,
        args: Vec<serde_json::Value>,
    ) -> Result<(), QueueError> {
        tracing::info!(handler = job.name(), "performing job inline");

        match job.perform(&args).await {
            Ok(()) => Ok(()),
            Err(err) => match err.downcast::<QueueError>() {
                Ok(config_err @ QueueError::PerformNotImplemented { .. }) => Err(config_err),
                Ok(other) => Err(QueueError::Perform {
                    handler: job.name().to_string(),
                    source: anyhow::Error::new(other),
                }),
                Err(err) => Err(QueueError::Perform {
                    handler: job.name().to_string(),
                    source: err,
                }),
            },
        }
    }
}

/// Builder for [`JobClient`].
#[derive(Default)]
pub struct JobClientBuilder {
    adapter: Option<Arc<dyn StoreAdapter>>,
    defaults: Option<JobDefaults>,
}

impl JobClientBuilder {
    /// Set the store adapter.
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn StoreAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Override the global scheduling defaults.
    #[must_use]
    pub fn defaults(mut self, defaults: JobDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AdapterRequired`] when no adapter was set.
    pub fn build(self) -> Result<JobClient, QueueError> {
        let adapter = self.adapter.ok_or(QueueError::AdapterRequired)?;
        Ok(JobClient {
            adapter,
            defaults: self.defaults.unwrap_or_default(),
            options: ScheduleOptions::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AppResult;
    use crate::infra::store::MemoryStore;
    use async_trait::async_trait;

    struct BrokenJob;

    #[async_trait]
    impl JobHandler for BrokenJob {
        fn name(&self) -> &'static str {
            "BrokenJob"
        }

        async fn perform(&self, _args: &[serde_json::Value]) -> AppResult<()> {
            anyhow::bail!("smtp connection refused")
        }
    }

    struct UnimplementedJob;

    #[async_trait]
    impl JobHandler for UnimplementedJob {
        fn name(&self) -> &'static str {
            "UnimplementedJob"
        }
    }

    #[test]
    fn builder_requires_adapter() {
        let err = JobClient::builder().build().unwrap_err();
        assert!(matches!(err, QueueError::AdapterRequired));
    }

    #[tokio::test]
    async fn perform_now_wraps_job_errors() {
        let client = JobClient::new(Arc::new(MemoryStore::new()));
        let err = client.perform_now(&BrokenJob, vec![]).await.unwrap_err();
        assert!(matches!(err, QueueError::Perform { ref handler, .. } if handler == "BrokenJob"));
    }

    #[tokio::test]
    async fn perform_now_passes_unimplemented_through() {
        let client = JobClient::new(Arc::new(MemoryStore::new()));
        let err = client
            .perform_now(&UnimplementedJob, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::PerformNotImplemented { .. }));
    }

    #[tokio::test]
    async fn perform_now_has_no_persistence_side_effect() {
        let store = Arc::new(MemoryStore::new());
        let client = JobClient::new(store.clone());
        let _ = client.perform_now(&BrokenJob, vec![]).await;
        assert_eq!(store.len(), 0);
    }
}
