//! Job-definition model, enqueue client, executor, and worker loop.

pub mod client;
pub mod error;
pub mod executor;
pub mod job;
pub mod registry;
pub mod worker;

pub use client::{JobClient, JobClientBuilder};
pub use error::{AppResult, QueueError};
pub use executor::Executor;
pub use job::{
    JobDefaults, JobHandler, SchedulePayload, ScheduleOptions, DEFAULT_PRIORITY, DEFAULT_QUEUE,
};
pub use registry::JobRegistry;
pub use worker::{
    ShutdownToken, Worker, WorkerBuilder, DEFAULT_MAX_RUNTIME, DEFAULT_WAIT_TIME,
};
