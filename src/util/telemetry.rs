//! Telemetry helpers for structured logging.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for a worker or runner process. Honors `RUST_LOG` and
/// falls back to `info` for this crate; does nothing when the host
/// application already installed a subscriber.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("backwork=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
