//! Runner and store configuration structures.

use serde::{Deserialize, Serialize};

use crate::infra::store::DEFAULT_MAX_ATTEMPTS;

/// Store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store for development/testing.
    Memory,
    /// SQLite database file.
    Sqlite {
        /// Database file path.
        path: String,
        /// Physical table name; the default table is created when unset.
        table: Option<String>,
    },
}

/// One worker slot derived from the worker-count spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSlot {
    /// Queue this worker is pinned to; `None` works every queue.
    pub queue: Option<String>,
    /// Index among the workers sharing the same queue.
    pub index: usize,
}

impl WorkerSlot {
    /// Process title for this slot: `{prefix}.{queue}.{index}`, or
    /// `{prefix}.{index}` when unpinned.
    #[must_use]
    pub fn title(&self, prefix: &str) -> String {
        self.queue.as_ref().map_or_else(
            || format!("{prefix}.{}", self.index),
            |queue| format!("{prefix}.{queue}.{}", self.index),
        )
    }
}

/// Parse a worker-count spec into slots.
///
/// Accepts a bare count (`"2"`) or comma-separated `queue:count` pairs
/// (`"default:2,email:1"`); a pair with no queue name (`":2"`) yields
/// unpinned workers.
///
/// # Errors
///
/// Returns a message naming the unparsable segment.
pub fn parse_worker_spec(spec: &str) -> Result<Vec<WorkerSlot>, String> {
    let normalized = if spec.parse::<usize>().is_ok() {
        format!(":{spec}")
    } else {
        spec.to_string()
    };

    let mut slots = Vec::new();
    for part in normalized.split(',') {
        let (queue, count) = part
            .split_once(':')
            .ok_or_else(|| format!("expected `queue:count`, got `{part}`"))?;
        let count: usize = count
            .parse()
            .map_err(|_| format!("invalid worker count in `{part}`"))?;
        let queue = (!queue.is_empty()).then(|| queue.to_string());
        for index in 0..count {
            slots.push(WorkerSlot {
                queue: queue.clone(),
                index,
            });
        }
    }

    if slots.is_empty() {
        return Err("worker spec yields no workers".to_string());
    }
    Ok(slots)
}

/// Root runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Worker-count spec, e.g. `"2"` or `"default:2,email:1"`.
    #[serde(default = "default_workers")]
    pub workers: String,
    /// Store backend selection.
    pub store: StoreBackendConfig,
    /// Maximum idle seconds between polls.
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: u64,
    /// Seconds after which a held lock is considered abandoned.
    #[serde(default = "default_max_runtime_secs")]
    pub max_runtime_secs: u64,
    /// Claim attempts before a failing job is marked terminal.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Drain all claimable jobs and exit instead of polling forever.
    #[serde(default)]
    pub workoff: bool,
    /// Prefix for derived worker process titles.
    #[serde(default = "default_title_prefix")]
    pub title_prefix: String,
}

fn default_workers() -> String {
    "1".to_string()
}

const fn default_wait_time_secs() -> u64 {
    5
}

const fn default_max_runtime_secs() -> u64 {
    4 * 60 * 60
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_title_prefix() -> String {
    "bw-worker".to_string()
}

impl RunnerConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        parse_worker_spec(&self.workers)?;
        if self.max_runtime_secs == 0 {
            return Err("max_runtime_secs must be greater than 0".into());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        if self.title_prefix.is_empty() {
            return Err("title_prefix must not be empty".into());
        }
        Ok(())
    }

    /// Parse runner configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a message for parse failures and invalid values.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_count_yields_unpinned_workers() {
        let slots = parse_worker_spec("2").unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(|s| s.queue.is_none()));
        assert_eq!(slots[1].index, 1);
    }

    #[test]
    fn queue_pairs_yield_pinned_workers() {
        let slots = parse_worker_spec("default:2,email:1").unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].queue.as_deref(), Some("default"));
        assert_eq!(slots[2].queue.as_deref(), Some("email"));
        assert_eq!(slots[2].index, 0);
    }

    #[test]
    fn titles_follow_queue_partitioning() {
        let slots = parse_worker_spec("email:1,:1").unwrap();
        assert_eq!(slots[0].title("bw-worker"), "bw-worker.email.0");
        assert_eq!(slots[1].title("bw-worker"), "bw-worker.0");
    }

    #[test]
    fn garbage_specs_are_rejected() {
        assert!(parse_worker_spec("default").is_err());
        assert!(parse_worker_spec("default:x").is_err());
        assert!(parse_worker_spec("0").is_err());
    }

    #[test]
    fn json_roundtrip_with_defaults() {
        let cfg = RunnerConfig::from_json_str(
            r#"{"store": {"sqlite": {"path": "jobs.db", "table": null}}}"#,
        )
        .unwrap();
        assert_eq!(cfg.workers, "1");
        assert_eq!(cfg.wait_time_secs, 5);
        assert_eq!(cfg.max_runtime_secs, 4 * 60 * 60);
        assert!(!cfg.workoff);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = RunnerConfig::from_json_str(
            r#"{"store": "memory", "max_runtime_secs": 0}"#,
        )
        .unwrap_err();
        assert!(err.contains("max_runtime_secs"));
    }
}
