//! Handler registry mapping stored names to executable job definitions.
//!
//! Populated once at process startup; the executor resolves the handler name
//! on each claimed record against it. Unknown names are a configuration
//! error, not a per-job failure.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::job::JobHandler;

/// Name-to-handler lookup table.
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own name. Registering a second handler
    /// with the same name replaces the first.
    #[must_use]
    pub fn register(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(handler.name(), handler);
        self
    }

    /// Look up a handler by the name stored on a job record.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AppResult;
    use async_trait::async_trait;

    struct NoopJob;

    #[async_trait]
    impl JobHandler for NoopJob {
        fn name(&self) -> &'static str {
            "NoopJob"
        }

        async fn perform(&self, _args: &[serde_json::Value]) -> AppResult<()> {
            Ok(())
        }
    }

    #[test]
    fn lookup_by_name() {
        let registry = JobRegistry::new().register(Arc::new(NoopJob));
        assert!(registry.get("NoopJob").is_some());
        assert!(registry.get("MissingJob").is_none());
        assert_eq!(registry.len(), 1);
    }
}
