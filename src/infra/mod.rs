//! Infrastructure adapters for durable job storage.

pub mod store;
