use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use fraudline_bootstrap::logging::init_logging;
use fraudline_bootstrap::{run, AppContext, RunOptions};
use fraudline_domain::PipelineMode;
use fraudline_infrastructure::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "fraudline")]
#[command(about = "Transaction fraud scoring pipeline", long_about = None)]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<String>,

    /// JSONL file of transactions to ingest, `-` for stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Override pipeline.mode (sync or async)
    #[arg(short, long)]
    mode: Option<PipelineMode>,

    /// Seconds to wait for queued work after the input is exhausted
    #[arg(long, default_value_t = 30)]
    drain_timeout: u64,

    /// Write the effective scoring rules to this YAML file and exit
    #[arg(long)]
    export_rules: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path).await?,
        None => AppConfig::load().await?,
    };
    let _guard = init_logging(&config.log)?;
    if let Some(mode) = args.mode {
        config.pipeline.mode = mode;
    }
    info!(mode = %config.pipeline.mode, "starting fraudline");

    let context = AppContext::from_config(config).await?;
    if let Some(path) = &args.export_rules {
        return context.export_rules(path).await;
    }
    let summary = run(
        context,
        RunOptions {
            input: args.input,
            drain_timeout: Duration::from_secs(args.drain_timeout),
        },
    )
    .await?;
    if summary.rejected > 0 {
        info!(rejected = summary.rejected, "some transactions were not processed");
    }
    Ok(())
}
