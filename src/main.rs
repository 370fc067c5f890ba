// ABOUTME: Main entry point for the Dock Warden command-line front end

use anyhow::{Context, Result};
use bollard::Docker;
use clap::{Parser, Subcommand};
use dock_warden::docker::{connect, ContainerService};
use dock_warden::models::ContainerStats;
use dock_warden::DaemonConfig;
use futures_util::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(
    name = "dock-warden",
    version,
    about = "Manage containers on a remote Docker daemon over mutual TLS"
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, env = "DOCK_WARDEN_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the daemon answers over the authenticated channel
    Ping,
    /// List all containers, including stopped ones
    List,
    /// Show resource usage of a container
    Stats {
        id: String,
        /// Keep sampling every SECONDS until interrupted
        #[arg(long, value_name = "SECONDS")]
        watch: Option<u64>,
        /// Print raw numbers instead of formatted values
        #[arg(long)]
        raw: bool,
    },
    Start {
        id: String,
    },
    Stop {
        id: String,
    },
    /// Recreate a container from a fresh pull of its image
    Update {
        id: String,
    },
    /// Force-remove a container
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let config = DaemonConfig::load(cli.config.as_deref())?;

    let docker = connect(&config)
        .await
        .context("Error connecting to docker daemon")?;
    let service = ContainerService::new(docker, config.service_settings());

    run(cli.command, &service).await
}

async fn run(command: Command, service: &ContainerService<Docker>) -> Result<()> {
    match command {
        Command::Ping => success(),
        Command::List => {
            let containers = service.list_containers().await?;
            print_json(&serde_json::json!({ "containerList": containers }))
        }
        Command::Stats {
            id,
            watch: None,
            raw,
        } => {
            let stats = service.get_stats(&id).await?;
            print_stats(&stats, raw)
        }
        Command::Stats {
            id,
            watch: Some(seconds),
            raw,
        } => {
            let mut samples = Box::pin(service.watch_stats(&id, Duration::from_secs(seconds)));
            while let Some(sample) = samples.next().await {
                match sample {
                    Ok(stats) => print_stats(&stats, raw)?,
                    Err(e) if e.is_not_found() => return Err(e.into()),
                    Err(e) => warn!("Failed to sample stats of {}: {}", id, e),
                }
            }
            Ok(())
        }
        Command::Start { id } => {
            service.start_container(&id).await?;
            success()
        }
        Command::Stop { id } => {
            service.stop_container(&id).await?;
            success()
        }
        Command::Update { id } => {
            service.update_container(&id).await?;
            success()
        }
        Command::Delete { id } => {
            service.delete_container(&id).await?;
            success()
        }
    }
}

fn print_stats(stats: &ContainerStats, raw: bool) -> Result<()> {
    if raw {
        print_json(&serde_json::json!({ "stats": stats }))
    } else {
        print_json(&serde_json::json!({ "stats": stats.view() }))
    }
}

fn success() -> Result<()> {
    print_json(&serde_json::json!({ "message": "success" }))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", output);
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::prelude::*;

    // stdout carries the JSON output, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dock_warden=info".into()),
        )
        .init();
}
