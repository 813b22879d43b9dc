//! Job-definition model: handler trait, schedule options, and payload
//! resolution.
//!
//! A job definition is an in-process value with no persistent identity of its
//! own; the [`JobRecord`](crate::infra::store::JobRecord) created from its
//! [`SchedulePayload`] is the durable representation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{AppResult, QueueError};

/// Queue used when neither the call site nor the handler names one.
pub const DEFAULT_QUEUE: &str = "default";

/// Priority used when neither the call site nor the handler names one.
/// Priorities range 1..=100 by convention, 1 being the highest.
pub const DEFAULT_PRIORITY: i32 = 50;

/// A named unit of work.
///
/// Implementations supply `perform` and may override the queue and priority
/// defaults. Handlers are registered once at startup and resolved by name
/// when a worker claims a record.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Name under which records for this job are stored and resolved.
    fn name(&self) -> &'static str;

    /// Handler-level queue default; `None` falls through to the global
    /// default.
    fn queue(&self) -> Option<&str> {
        None
    }

    /// Handler-level priority default; `None` falls through to the global
    /// default.
    fn priority(&self) -> Option<i32> {
        None
    }

    /// Execute the job body. The default body fails, so a handler that
    /// forgets to implement `perform` is rejected the first time it runs.
    async fn perform(&self, args: &[serde_json::Value]) -> AppResult<()> {
        let _ = args;
        Err(QueueError::PerformNotImplemented {
            handler: self.name().to_string(),
        }
        .into())
    }
}

/// Process-wide fallback values, the outermost layer of option resolution.
#[derive(Debug, Clone)]
pub struct JobDefaults {
    /// Fallback queue name.
    pub queue: String,
    /// Fallback priority.
    pub priority: i32,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            priority: DEFAULT_PRIORITY,
        }
    }
}

/// Call-site scheduling options.
///
/// Every field is optional; unset fields fall through to the handler's
/// defaults and then to [`JobDefaults`]. Resolution happens exactly once,
/// when the payload is built.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
    /// Override the queue for this call.
    pub queue: Option<String>,
    /// Override the priority for this call.
    pub priority: Option<i32>,
    /// Run after this many seconds from now.
    pub wait: Option<Duration>,
    /// Run at this absolute time.
    pub wait_until: Option<DateTime<Utc>>,
    /// Explicit scheduled time; takes precedence over `wait` and
    /// `wait_until`.
    pub run_at: Option<DateTime<Utc>>,
}

impl ScheduleOptions {
    /// Start from empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue override.
    #[must_use]
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Set the priority override.
    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Defer the job by `wait` from the time the payload is built.
    #[must_use]
    pub const fn wait(mut self, wait: Duration) -> Self {
        self.wait = Some(wait);
        self
    }

    /// Defer the job until an absolute time.
    #[must_use]
    pub const fn wait_until(mut self, at: DateTime<Utc>) -> Self {
        self.wait_until = Some(at);
        self
    }

    /// Pin the scheduled time exactly.
    #[must_use]
    pub const fn run_at(mut self, at: DateTime<Utc>) -> Self {
        self.run_at = Some(at);
        self
    }

    /// Resolve options against a handler and the global defaults, producing
    /// the payload handed to the store adapter.
    ///
    /// `run_at` precedence: explicit `run_at`, then `wait` (now + N), then
    /// `wait_until`, then `now`.
    #[must_use]
    pub fn payload(
        &self,
        handler: &dyn JobHandler,
        args: Vec<serde_json::Value>,
        defaults: &JobDefaults,
        now: DateTime<Utc>,
    ) -> SchedulePayload {
        let run_at = self.run_at.unwrap_or_else(|| {
            self.wait.map_or_else(
                || self.wait_until.unwrap_or(now),
                |wait| now + chrono::Duration::from_std(wait).unwrap_or_default(),
            )
        });

        let queue = self
            .queue
            .clone()
            .or_else(|| handler.queue().map(str::to_string))
            .unwrap_or_else(|| defaults.queue.clone());

        let priority = self
            .priority
            .or_else(|| handler.priority())
            .unwrap_or(defaults.priority);

        SchedulePayload {
            handler: handler.name().to_string(),
            args,
            run_at,
            queue,
            priority,
        }
    }
}

/// The ephemeral structure handed from a job definition to the store
/// adapter's insert operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePayload {
    /// Handler name stored on the record.
    pub handler: String,
    /// Ordered arguments for `perform`.
    pub args: Vec<serde_json::Value>,
    /// Resolved scheduled time.
    pub run_at: DateTime<Utc>,
    /// Resolved queue name.
    pub queue: String,
    /// Resolved priority.
    pub priority: i32,
}
