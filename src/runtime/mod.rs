//! Multi-worker runner and signal relay.

pub mod runner;

pub use runner::Runner;
