use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Demos for the prioritized, pausable task scheduler.
///
/// Scheduler settings come from `--config` when given, otherwise from
/// `PTASK_*` environment variables (a `.env` file is honored).
#[derive(Parser, Debug)]
#[command(name = "ptask", about = "Prioritized, pausable task scheduling demos")]
pub struct CliArgs {
    /// Path to a scheduler config TOML file
    #[arg(long, global = true, env = "PTASK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print queue stats as JSON when the demo finishes
    #[arg(long, global = true)]
    pub stats: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Square 1..=COUNT one step at a time, pausing and resuming midway
    Squares {
        /// How many numbers to square
        #[arg(long, default_value = "5")]
        count: u64,

        /// Pause after this many squares are produced
        #[arg(long, default_value = "3")]
        pause_after: usize,

        /// Milliseconds per step
        #[arg(long, default_value = "100")]
        step_ms: u64,

        /// Queue to run on (default: configured default queue)
        #[arg(long)]
        queue: Option<String>,
    },

    /// Run one task per priority and report the order they ran in
    Priorities {
        /// Comma-separated priorities, one task each
        #[arg(long, value_delimiter = ',', default_value = "1,3,2")]
        priorities: Vec<f64>,

        /// Milliseconds each task works for
        #[arg(long, default_value = "20")]
        work_ms: u64,

        /// Queue to run on (default: configured default queue)
        #[arg(long)]
        queue: Option<String>,
    },
}
