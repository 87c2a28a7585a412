use std::path::Path;

use anyhow::{Context, Result};
use ptask_core::{load_dotenv, SchedulerConfig};
use tracing::debug;

/// Resolve scheduler config from a TOML file or, without one, the environment.
pub fn load(path: Option<&Path>) -> Result<SchedulerConfig> {
    load_dotenv();

    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading scheduler config file");
            SchedulerConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => {
            debug!("loading scheduler config from environment");
            SchedulerConfig::from_env().context("invalid scheduler environment")
        }
    }
}
