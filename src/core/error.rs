//! Error types for queue operations.

use thiserror::Error;

use crate::infra::store::StoreError;

/// Errors produced by the job queue components.
///
/// Configuration errors (`AdapterRequired`, `PerformNotImplemented`,
/// `HandlerNotFound`) are fatal at the call site and never retried.
/// `Scheduling` and `Perform` wrap a failure from application or store code
/// with the original cause preserved.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A client or worker was built without a store adapter.
    #[error("a store adapter is required but none was configured")]
    AdapterRequired,
    /// The handler's `perform` was never implemented.
    #[error("handler `{handler}` does not implement `perform`")]
    PerformNotImplemented {
        /// Name of the offending handler.
        handler: String,
    },
    /// A claimed record names a handler missing from the registry.
    #[error("no handler registered under the name `{handler}`")]
    HandlerNotFound {
        /// Handler name stored on the record.
        handler: String,
    },
    /// Inserting a new job failed; the job was not persisted.
    #[error("failed to schedule `{handler}`")]
    Scheduling {
        /// Handler that was being scheduled.
        handler: String,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
    /// An inline `perform_now` invocation raised.
    #[error("`{handler}` raised while performing")]
    Perform {
        /// Handler that raised.
        handler: String,
        /// The error raised by the job body.
        #[source]
        source: anyhow::Error,
    },
    /// A store operation outside of scheduling failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Application-facing result using anyhow for job bodies and binaries.
pub type AppResult<T> = Result<T, anyhow::Error>;
