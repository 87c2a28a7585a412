mod cli;
mod config;
mod demos;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ptask_scheduler::QueueRegistry;
use tracing::info;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let config = config::load(args.config.as_deref()).context("failed to load configuration")?;
    config.log_summary();
    let registry = QueueRegistry::new(config);

    match args.command {
        Command::Squares {
            count,
            pause_after,
            step_ms,
            queue,
        } => {
            let squares = demos::squares(
                &registry,
                queue,
                count,
                pause_after,
                Duration::from_millis(step_ms),
            )
            .await?;
            println!("{squares:?}");
        }
        Command::Priorities {
            priorities,
            work_ms,
            queue,
        } => {
            let order =
                demos::priorities(&registry, queue, &priorities, Duration::from_millis(work_ms))
                    .await?;
            for (position, name) in order.iter().enumerate() {
                println!("{}. {name}", position + 1);
            }
        }
    }

    if args.stats {
        let stats: Vec<_> = registry
            .queue_names()
            .iter()
            .filter_map(|name| registry.stats(name))
            .collect();
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    info!("done");
    Ok(())
}
