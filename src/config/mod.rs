//! Configuration models for workers, stores, and the runner.

pub mod runner;

pub use runner::{parse_worker_spec, RunnerConfig, StoreBackendConfig, WorkerSlot};
