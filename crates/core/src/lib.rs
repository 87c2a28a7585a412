pub mod config;
pub mod error;

pub use config::{load_dotenv, QueueConfig, SchedulerConfig, DEFAULT_QUEUE_NAME};
pub use error::{ConfigError, TaskError};
