//! Command-line front end for chunked compose uploads.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::{Path, PathBuf};
use stitch_core::AppConfig;
use stitch_upload::{UploadRequest, Uploader, metrics};
use tokio::io::AsyncRead;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "stitch")]
#[command(version, about = "Upload streams of unknown length through object store compose")]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "STITCH_CONFIG",
        default_value = "config/stitch.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a file (or stdin) to a bucket
    Upload {
        /// Target bucket (defaults to `default_bucket` from config)
        #[arg(long)]
        bucket: Option<String>,

        /// Destination key within the bucket
        #[arg(long)]
        key: String,

        /// File to upload; reads stdin when omitted
        file: Option<PathBuf>,
    },
    /// Print upload metrics in Prometheus text format
    Metrics,
}

/// Load configuration from an optional TOML file, overridden by `STITCH_` env vars.
fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if path.exists() {
        tracing::debug!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path.display());
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("STITCH_").ignore(&["config"]).split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn open_input(file: Option<&Path>) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
    match file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdin())),
    }
}

async fn upload(
    config: &AppConfig,
    bucket: Option<String>,
    key: String,
    file: Option<PathBuf>,
) -> Result<()> {
    let bucket = bucket
        .or_else(|| config.default_bucket.clone())
        .context("no bucket given; pass --bucket or set default_bucket")?;

    let store = stitch_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(backend = store.backend_name(), "Storage backend initialized");

    let uploader = Uploader::new(&config.uploader).context("failed to create uploader")?;
    let contents = open_input(file.as_deref()).await?;

    let result = uploader
        .upload(store, UploadRequest::new(bucket, key, contents))
        .await;
    let chunk_size = uploader.chunk_size();
    let hits = uploader.compose_limit_hits();
    // Let queued part deletions finish before the runtime goes away.
    uploader.shutdown().await;

    let object = result.context("upload failed")?;
    println!("bucket: {}", object.bucket);
    println!("name: {}", object.name);
    println!("size: {}", object.size);
    println!("chunk_size: {chunk_size}");
    println!("compose_limit_hits: {hits}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli.config)?;
    metrics::register_metrics();

    match cli.command {
        Commands::Upload { bucket, key, file } => upload(&config, bucket, key, file).await,
        Commands::Metrics => {
            let text = metrics::encode().context("failed to encode metrics")?;
            print!("{text}");
            Ok(())
        }
    }
}
