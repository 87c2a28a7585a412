use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Queue used by tasks that do not name one.
pub const DEFAULT_QUEUE_NAME: &str = "default";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_limit(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

// ── Per-queue overrides ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum simultaneous executions on this queue.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
}

// ── Scheduler config ──────────────────────────────────────────

/// Registry-wide scheduler configuration, typically parsed from TOML.
///
/// ```toml
/// default_queue = "default"
/// default_concurrency_limit = 1
///
/// [queues.render]
/// concurrency_limit = 4
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Queue name assigned to tasks built without an explicit queue.
    #[serde(default = "default_queue")]
    pub default_queue: String,
    /// Concurrency limit for queues without an override.
    #[serde(default = "default_concurrency_limit")]
    pub default_concurrency_limit: usize,
    /// Per-queue overrides keyed by queue name.
    #[serde(default)]
    pub queues: HashMap<String, QueueConfig>,
}

fn default_queue() -> String {
    DEFAULT_QUEUE_NAME.to_string()
}

fn default_concurrency_limit() -> usize {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_queue: default_queue(),
            default_concurrency_limit: default_concurrency_limit(),
            queues: HashMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validated()
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Build config from environment variables (call `load_dotenv()` first).
    ///
    /// - `PTASK_DEFAULT_QUEUE`: default queue name
    /// - `PTASK_CONCURRENCY`: default concurrency limit
    /// - `PTASK_QUEUE_LIMITS`: comma-separated `name=limit` overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(queue) = env_opt("PTASK_DEFAULT_QUEUE") {
            config.default_queue = queue;
        }
        if let Some(raw) = env_opt("PTASK_CONCURRENCY") {
            config.default_concurrency_limit = parse_limit("PTASK_CONCURRENCY", &raw)?;
        }
        if let Some(raw) = env_opt("PTASK_QUEUE_LIMITS") {
            config.queues = parse_queue_limits(&raw)?;
        }

        Ok(config)
    }

    /// Concurrency limit for a queue, honoring per-queue overrides.
    pub fn limit_for(&self, queue: &str) -> usize {
        self.queues
            .get(queue)
            .map(|q| q.concurrency_limit)
            .unwrap_or(self.default_concurrency_limit)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Scheduler config:");
        tracing::info!("  default queue:       {}", self.default_queue);
        tracing::info!("  default concurrency: {}", self.default_concurrency_limit);
        let mut names: Vec<&String> = self.queues.keys().collect();
        names.sort();
        for name in names {
            tracing::info!("  queue {:<14} concurrency={}", name, self.queues[name].concurrency_limit);
        }
    }

    /// Return a JSON view for API responses or status dumps.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "default_queue": self.default_queue,
            "default_concurrency_limit": self.default_concurrency_limit,
            "queues": self.queues,
        })
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.default_concurrency_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "default_concurrency_limit".into(),
                value: "0".into(),
            });
        }
        if let Some((name, _)) = self.queues.iter().find(|(_, q)| q.concurrency_limit == 0) {
            return Err(ConfigError::InvalidValue {
                key: format!("queues.{}.concurrency_limit", name),
                value: "0".into(),
            });
        }
        Ok(self)
    }
}

/// Parse `name=limit,name=limit` into per-queue overrides.
fn parse_queue_limits(raw: &str) -> Result<HashMap<String, QueueConfig>, ConfigError> {
    let mut queues = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, limit) = pair.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
            key: "PTASK_QUEUE_LIMITS".into(),
            value: pair.to_string(),
        })?;
        let concurrency_limit = parse_limit("PTASK_QUEUE_LIMITS", limit)?;
        queues.insert(name.trim().to_string(), QueueConfig { concurrency_limit });
    }
    Ok(queues)
}
