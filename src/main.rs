use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cblock_writer::config::{validate_settings, Settings};
use cblock_writer::loader::{load_blocks, read_blocks};
use cblock_writer::{metrics, BlockBatchWriter, ClickHouseSink};

/// Block metadata writer for ClickHouse
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop the configured table if it exists
    Drop,
    /// Create the cblock table
    Create {
        /// Create the configured table instead of `cblock`
        #[arg(long)]
        target: bool,
    },
    /// Load newline-delimited JSON block records
    Load {
        /// Input file
        file: PathBuf,
        /// Drop and recreate the configured table before loading
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {:?}", e);
        std::process::exit(1);
    });
    validate_settings(&settings)?;

    let prometheus_handle = if settings.metrics.enabled {
        Some(metrics::setup_metrics_recorder()?)
    } else {
        None
    };

    let sink = ClickHouseSink::new(&settings.clickhouse);
    let mut writer = BlockBatchWriter::<ClickHouseSink>::new(settings.writer.table.clone(), Vec::new());
    if let Some(deadline) = settings.writer.deadline() {
        writer = writer.with_deadline(deadline);
    }

    match cli.command {
        Commands::Drop => {
            writer.drop_table(&sink).await?;
            info!("Dropped table {}", writer.table());
        }
        Commands::Create { target } => {
            if target {
                writer.create_target_table(&sink).await?;
                info!("Created table {}", writer.table());
            } else {
                writer.create_table(&sink).await?;
                info!("Created table cblock");
            }
        }
        Commands::Load { file, reset } => {
            let input = File::open(&file)
                .with_context(|| format!("failed to open {}", file.display()))?;
            let blocks = read_blocks(BufReader::new(input))?;
            info!("Read {} block records from {}", blocks.len(), file.display());

            if reset {
                writer.drop_table(&sink).await?;
                writer.create_target_table(&sink).await?;
                info!("Reset table {}", writer.table());
            }

            let summary = load_blocks(&sink, &settings.writer, blocks).await?;
            info!(
                "Loaded {} rows in {} batches into {}",
                summary.rows,
                summary.batches,
                writer.table()
            );
        }
    }

    if let Some(handle) = prometheus_handle {
        info!("Metrics:\n{}", handle.render());
    }

    Ok(())
}
