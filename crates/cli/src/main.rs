use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod config;
mod pipelines;
mod sink;

use config::{CliConfig, DEFAULT_FILTER};
use pipelines::PipelineKind;

#[derive(Parser, Debug)]
#[command(name = "taskdag")]
#[command(about = "Run dependency-ordered test pipelines", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "taskdag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a pipeline to completion
    Run {
        #[arg(short, long, value_enum)]
        pipeline: PipelineKind,

        /// Re-attempts for a failing step
        #[arg(long)]
        max_retries: Option<u32>,

        /// Delay between attempts in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Print the final snapshot as JSON
        #[arg(long)]
        print_snapshot: bool,
    },
    /// List available pipelines
    List,
    /// Print the order a pipeline's steps would run in
    Plan {
        #[arg(short, long, value_enum)]
        pipeline: PipelineKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let loaded = CliConfig::read(&args.config)?;

    // Initialize tracing
    let filter = loaded
        .as_ref()
        .map(|config| config.logging.filter.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = match loaded {
        Some(config) => {
            tracing::debug!("Loaded configuration from {}", args.config.display());
            config
        }
        None => {
            tracing::info!("Configuration file not found, using defaults");
            CliConfig::default()
        }
    };

    match args.command {
        Command::List => {
            for kind in PipelineKind::ALL {
                println!("{:<10} {}", kind.name(), kind.description());
            }
        }
        Command::Plan { pipeline } => {
            let dag = pipeline.build(&config.demo)?;
            for (position, node) in dag.nodes()?.iter().enumerate() {
                let after: Vec<String> = dag
                    .dependencies(node.id())
                    .into_iter()
                    .filter_map(|id| dag.node(id).map(|n| n.name()))
                    .collect();
                if after.is_empty() {
                    println!("{}. {}", position + 1, node.name());
                } else {
                    println!("{}. {} (after {})", position + 1, node.name(), after.join(", "));
                }
            }
        }
        Command::Run {
            pipeline,
            max_retries,
            delay_ms,
            print_snapshot,
        } => {
            let options = config.run_options(max_retries, delay_ms);
            let dag = pipeline.build(&config.demo)?;

            tracing::info!("Running pipeline '{}'", dag.metadata().name);
            sink::attach(&dag);
            let logger = sink::spawn_event_logger(&dag);

            let summary = dag.start(options).await?;

            if tokio::time::timeout(Duration::from_secs(1), logger).await.is_err() {
                tracing::debug!("Event logger did not finish in time");
            }

            if print_snapshot {
                let snapshot = serde_json::to_string_pretty(&dag.serialize())
                    .context("Failed to serialize snapshot")?;
                println!("{}", snapshot);
            }

            if !summary.is_success() {
                anyhow::bail!(
                    "Pipeline '{}' did not pass: {} failed, {} unfinished",
                    pipeline.name(),
                    summary.failed,
                    summary.unfinished
                );
            }
        }
    }

    Ok(())
}
