//! Worker polling loop.
//!
//! One worker per OS process drives poll, claim, execute, sleep against the
//! store. Parallelism comes from running several such processes; the claim
//! operation in the store is the only synchronization between them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::error::QueueError;
use crate::core::executor::Executor;
use crate::core::registry::JobRegistry;
use crate::infra::store::{ClaimRequest, StoreAdapter};

/// Maximum time a job may hold its lock before the lock is considered
/// abandoned and the job reclaimable: 4 hours.
pub const DEFAULT_MAX_RUNTIME: Duration = Duration::from_secs(4 * 60 * 60);

/// Maximum idle interval between polls: 5 seconds.
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(5);

/// Cooperative stop signal for a worker.
///
/// Triggering the token lets the current loop iteration finish; it never
/// interrupts a job mid-execution. The token is checked between iterations
/// only.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    /// Create an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop after its current iteration.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Polls the store for claimable jobs and executes them one at a time.
pub struct Worker {
    adapter: Arc<dyn StoreAdapter>,
    executor: Executor,
    queue: Option<String>,
    process_name: String,
    max_runtime: Duration,
    wait_time: Duration,
    workoff: bool,
    shutdown: ShutdownToken,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("queue", &self.queue)
            .field("process_name", &self.process_name)
            .field("max_runtime", &self.max_runtime)
            .field("wait_time", &self.wait_time)
            .field("workoff", &self.workoff)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Start building a worker.
    #[must_use]
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::default()
    }

    /// Claim identity this worker writes into `locked_by`.
    #[must_use]
    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Token that stops this worker between iterations.
    #[must_use]
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Run the poll, claim, execute, sleep loop until stopped.
    ///
    /// Each iteration claims at most one job and executes it to completion.
    /// A successful claim re-polls immediately, so a backlog drains back to
    /// back; the worker sleeps only after an empty or failed poll, for
    /// `wait_time` minus the time the poll took. With `workoff` set, the
    /// first empty claim ends the loop (drain and exit); a failed claim is
    /// retried there too, never reported as a drained queue.
    ///
    /// # Errors
    ///
    /// Only configuration errors escape the loop: a claimed record naming an
    /// unregistered handler returns [`QueueError::HandlerNotFound`]. Job-body
    /// failures and transient store errors are logged and the loop continues.
    pub async fn run(&self) -> Result<(), QueueError> {
        tracing::info!(worker = %self.process_name, queue = self.queue.as_deref(), "starting work");

        loop {
            if self.shutdown.is_triggered() {
                tracing::info!(worker = %self.process_name, "shutdown requested, finishing work");
                break;
            }

            let started = Instant::now();
            let req = ClaimRequest {
                process_name: self.process_name.clone(),
                queue: self.queue.clone(),
                max_runtime: self.max_runtime,
            };

            match self.adapter.claim_next(&req).await {
                Ok(Some(job)) => {
                    if let Err(err) = self.executor.execute(&job).await {
                        match err {
                            QueueError::HandlerNotFound { .. } => return Err(err),
                            other => {
                                tracing::warn!(
                                    worker = %self.process_name,
                                    job_id = job.id,
                                    error = %other,
                                    "failed to report job outcome"
                                );
                            }
                        }
                    }
                    // More work may be waiting; poll again without sleeping.
                    continue;
                }
                Ok(None) => {
                    if self.workoff {
                        tracing::info!(worker = %self.process_name, "queue drained, exiting");
                        break;
                    }
                }
                Err(err) => {
                    // A failed claim attempt, not a fatal process error and
                    // not an empty queue.
                    tracing::warn!(worker = %self.process_name, error = %err, "claim failed");
                }
            }

            let elapsed = started.elapsed();
            if elapsed < self.wait_time {
                tokio::time::sleep(self.wait_time - elapsed).await;
            }
        }

        tracing::info!(worker = %self.process_name, "worker finished, shutting down");
        Ok(())
    }
}

/// Builder for [`Worker`].
#[derive(Default)]
pub struct WorkerBuilder {
    adapter: Option<Arc<dyn StoreAdapter>>,
    registry: Option<Arc<JobRegistry>>,
    queue: Option<String>,
    process_name: Option<String>,
    max_runtime: Option<Duration>,
    wait_time: Option<Duration>,
    workoff: bool,
    shutdown: Option<ShutdownToken>,
}

impl WorkerBuilder {
    /// Set the store adapter (required).
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn StoreAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Set the handler registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<JobRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Restrict this worker to one queue.
    #[must_use]
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Override the claim identity. Defaults to `bw-worker.{pid}`, which is
    /// unique per OS process.
    #[must_use]
    pub fn process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = Some(name.into());
        self
    }

    /// Override the lock staleness window.
    #[must_use]
    pub const fn max_runtime(mut self, max_runtime: Duration) -> Self {
        self.max_runtime = Some(max_runtime);
        self
    }

    /// Override the idle interval between polls.
    #[must_use]
    pub const fn wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = Some(wait_time);
        self
    }

    /// Drain all claimable jobs and exit instead of polling forever.
    #[must_use]
    pub const fn workoff(mut self, workoff: bool) -> Self {
        self.workoff = workoff;
        self
    }

    /// Use an externally-held shutdown token.
    #[must_use]
    pub fn shutdown_token(mut self, token: ShutdownToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the worker.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AdapterRequired`] when no adapter was set.
    pub fn build(self) -> Result<Worker, QueueError> {
        let adapter = self.adapter.ok_or(QueueError::AdapterRequired)?;
        let registry = self.registry.unwrap_or_default();
        Ok(Worker {
            executor: Executor::new(Arc::clone(&adapter), registry),
            adapter,
            queue: self.queue,
            process_name: self
                .process_name
                .unwrap_or_else(|| format!("bw-worker.{}", std::process::id())),
            max_runtime: self.max_runtime.unwrap_or(DEFAULT_MAX_RUNTIME),
            wait_time: self.wait_time.unwrap_or(DEFAULT_WAIT_TIME),
            workoff: self.workoff,
            shutdown: self.shutdown.unwrap_or_default(),
        })
    }
}
