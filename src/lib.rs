//! # Backwork
//!
//! A durable background-job queue for applications that already have a
//! transactional store and do not want to operate a message broker.
//!
//! Application code enqueues units of work (a handler name plus arguments) to
//! be executed later, possibly by a different process. Jobs are delivered at
//! least once, ordered by priority and scheduled time, and recovered after a
//! crash through lock expiry.
//!
//! ## Core Problem Solved
//!
//! Coordinating many worker processes over a shared job table with no native
//! queueing primitive:
//!
//! - **At-most-one executor per job**: claiming is a conditional write that
//!   re-checks claimability at write time, so racing workers cannot both win
//! - **Crash recovery**: a worker that dies mid-job leaves a lock that goes
//!   stale after `max_runtime`, at which point the job is claimable again
//! - **Priority + time ordering**: lower priority value wins (1 is highest);
//!   ties break on scheduled time
//! - **Delayed execution**: jobs can be deferred by a number of seconds or
//!   until an absolute time
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use backwork::core::{JobClient, JobHandler, JobRegistry, Worker};
//! use backwork::infra::store::MemoryStore;
//! use std::sync::Arc;
//!
//! struct WelcomeEmailJob;
//!
//! #[async_trait::async_trait]
//! impl JobHandler for WelcomeEmailJob {
//!     fn name(&self) -> &'static str { "WelcomeEmailJob" }
//!     async fn perform(&self, args: &[serde_json::Value]) -> anyhow::Result<()> {
//!         // send the email...
//!         Ok(())
//!     }
//! }
//!
//! // Enqueue a job
//! let store = Arc::new(MemoryStore::new());
//! let client = JobClient::new(store.clone());
//! client.enqueue(&WelcomeEmailJob, vec!["user@example.com".into()]).await?;
//!
//! // Elsewhere, a worker drains the queue
//! let registry = Arc::new(JobRegistry::new().register(Arc::new(WelcomeEmailJob)));
//! Worker::builder()
//!     .adapter(store)
//!     .registry(registry)
//!     .workoff(true)
//!     .build()?
//!     .run()
//!     .await?;
//! ```
//!
//! For multi-worker deployments see `runtime::Runner`, which spawns one
//! worker per configured slot and relays termination signals (first Ctrl-C
//! stops claiming new jobs, second exits immediately).

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Job-definition model, enqueue client, executor, and worker loop.
pub mod core;
/// Configuration models for workers, stores, and the runner.
pub mod config;
/// Builders to construct clients and workers from configuration.
pub mod builders;
/// Store adapters that persist and claim job records.
pub mod infra;
/// Multi-worker runner and signal relay.
pub mod runtime;
/// Shared utilities.
pub mod util;
