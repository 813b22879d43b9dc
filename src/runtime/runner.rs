//! Multi-worker runner.
//!
//! The runner is the in-process supervisor: it spawns one task per configured
//! worker slot and relays termination signals. A first Ctrl-C triggers every
//! worker's shutdown token so each finishes its current job and stops
//! claiming; a second Ctrl-C returns immediately, leaving any in-flight job's
//! lock to expire through the staleness window and be reclaimed elsewhere.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::builders::{build_store, build_workers};
use crate::config::RunnerConfig;
use crate::core::{AppResult, JobRegistry, QueueError, ShutdownToken, Worker};

/// Supervises a set of workers in one process.
pub struct Runner {
    workers: Vec<Worker>,
}

impl Runner {
    /// Wrap already-built workers.
    #[must_use]
    pub fn new(workers: Vec<Worker>) -> Self {
        Self { workers }
    }

    /// Build a runner from configuration: load env files, open the store
    /// backend, and derive one worker per slot.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Store`] when the backend cannot be opened or
    /// the configuration is invalid.
    pub fn from_config(cfg: &RunnerConfig, registry: Arc<JobRegistry>) -> Result<Self, QueueError> {
        dotenvy::dotenv().ok();
        let adapter = build_store(cfg)?;
        let workers = build_workers(cfg, adapter, registry)?;
        Ok(Self { workers })
    }

    /// Shutdown tokens for every worker, in slot order.
    #[must_use]
    pub fn shutdown_tokens(&self) -> Vec<ShutdownToken> {
        self.workers.iter().map(Worker::shutdown_token).collect()
    }

    /// Run every worker to completion without signal relay.
    ///
    /// Intended for workoff mode and for callers that manage shutdown
    /// themselves through [`Self::shutdown_tokens`].
    ///
    /// # Errors
    ///
    /// Returns the first configuration error any worker hit.
    pub async fn drain(self) -> AppResult<()> {
        let handles = spawn_workers(self.workers);
        join_workers(handles).await
    }

    /// Run every worker, relaying interrupt signals until they finish.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error any worker hit; a signal-forced
    /// exit still resolves with `Ok(())` so the process can exit cleanly.
    pub async fn run(self) -> AppResult<()> {
        let tokens = self.shutdown_tokens();
        tracing::info!(workers = self.workers.len(), "starting job runner");

        let handles = spawn_workers(self.workers);
        let (done_tx, mut done_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let result = join_workers(handles).await;
            let _ = done_tx.send(result);
        });

        let mut interrupts = 0u32;
        loop {
            tokio::select! {
                result = &mut done_rx => {
                    tracing::info!("all workers finished, shutting down");
                    return result.unwrap_or(Ok(()));
                }
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    interrupts += 1;
                    if interrupts == 1 {
                        tracing::info!(
                            "interrupt received: finishing current jobs, \
                             press Ctrl-C again to exit immediately"
                        );
                        for token in &tokens {
                            token.trigger();
                        }
                    } else {
                        tracing::info!("interrupt received again, exiting immediately");
                        // Abandoned locks expire via max_runtime and are
                        // reclaimed by other workers.
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn spawn_workers(workers: Vec<Worker>) -> Vec<JoinHandle<Result<(), QueueError>>> {
    workers
        .into_iter()
        .map(|worker| tokio::spawn(async move { worker.run().await }))
        .collect()
}

async fn join_workers(handles: Vec<JoinHandle<Result<(), QueueError>>>) -> AppResult<()> {
    let mut result = Ok(());
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => result = Err(anyhow::Error::new(err)),
            Err(join_err) => result = Err(anyhow::Error::new(join_err)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_builds_slot_workers() {
        let cfg = RunnerConfig::from_json_str(
            r#"{"workers": "default:1,email:1", "store": "memory", "workoff": true}"#,
        )
        .unwrap();
        let runner = Runner::from_config(&cfg, Arc::new(JobRegistry::new())).unwrap();
        assert_eq!(runner.shutdown_tokens().len(), 2);
    }

    #[tokio::test]
    async fn drain_returns_once_workers_stop() {
        let cfg = RunnerConfig::from_json_str(
            r#"{"workers": "2", "store": "memory", "workoff": true}"#,
        )
        .unwrap();
        let runner = Runner::from_config(&cfg, Arc::new(JobRegistry::new())).unwrap();
        // Workoff workers against an empty store exit after one empty claim.
        runner.drain().await.unwrap();
    }
}
