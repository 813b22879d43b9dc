//! Builders to construct queue components from configuration.

pub mod worker_builder;

pub use worker_builder::{build_store, build_workers};
