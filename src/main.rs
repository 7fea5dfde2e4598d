use anyhow::{Context, Result};
use clap::Parser;
use siocreport::{config::JobConfig, etl::ReportEtl, storage};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Run the min/max survey report job once.
#[derive(Parser, Debug)]
struct Args {
    /// Job configuration file in YAML format
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    // ─── 2) load configuration ───────────────────────────────────────
    let args = Args::parse();
    let config = JobConfig::from_yaml_file(&args.config)?;
    info!(config = %args.config.display(), "report job started");

    // ─── 3) connect source and target buckets ────────────────────────
    let src_bucket = storage::open_bucket(&config.storage.src_bucket)
        .await
        .context("opening source bucket")?;
    let trg_bucket = storage::open_bucket(&config.storage.trg_bucket)
        .await
        .context("opening target bucket")?;

    // ─── 4) run the pipeline once ────────────────────────────────────
    let etl = ReportEtl::new(src_bucket, trg_bucket, config.source, config.target);
    etl.run().await?;

    info!("report job finished");
    Ok(())
}
