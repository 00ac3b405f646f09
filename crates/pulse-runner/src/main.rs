//! # pulse-runner
//!
//! Runs the market pipeline from a JSON config and logs every published
//! snapshot until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! pulse-runner config.json --log-level info --category future --filter btc
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use pulse_core::Category;
use pulse_core::config::PulseConfig;
use pulse_md::network::ManualNetwork;
use pulse_md::projector::project;
use tracing::{info, warn};

/// Market snapshot runner.
#[derive(Parser)]
#[command(name = "pulse-runner", about = "Market catalog and live price runner")]
struct Cli {
    /// Configuration file path (JSON). Built-in defaults when omitted.
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Category to list (spot or future). Overrides the config.
    #[arg(short, long)]
    category: Option<Category>,

    /// Only log instruments whose symbol contains this text.
    #[arg(short, long, default_value = "")]
    filter: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let mut config = match &cli.config {
        Some(path) => pulse_core::config::load_config(path)?,
        None => PulseConfig::default(),
    };
    if let Some(category) = cli.category {
        config.aggregator.default_category = category;
    }

    // 2. Initialize logging
    let log_dir = cli.log_dir.as_deref().or(config.meta.log_path.as_deref());
    pulse_core::logging::init_logging(&cli.log_level, log_dir, &config.meta.module_name)?;

    info!(
        "pulse-runner starting, config={}, log_level={}",
        cli.config.as_ref().map_or("<defaults>".into(), |p| p.display().to_string()),
        cli.log_level
    );

    // 3. Build the pipeline and start observing
    let network = Arc::new(ManualNetwork::default());
    let aggregator = pulse_md::registry::build_aggregator(&config, network)?;
    let mut subscription = aggregator.subscribe();

    info!("observing {}, press Ctrl+C to stop", aggregator.selected_category());

    // 4. Log snapshots until the shutdown signal
    loop {
        tokio::select! {
            snap = subscription.changed() => {
                let Some(snap) = snap else { break };
                let view = project(&snap, &cli.filter);
                match &view.error {
                    Some(msg) => warn!(
                        "[{}] {} instruments, loading={}, status: {msg}",
                        view.selected_category, view.instruments.len(), view.is_loading
                    ),
                    None => info!(
                        "[{}] {} instruments, loading={}",
                        view.selected_category, view.instruments.len(), view.is_loading
                    ),
                }
                for inst in view.instruments.iter().take(10) {
                    info!("  {:<16} {}", inst.symbol, inst.price);
                }
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("shutdown signal received");
                break;
            }
        }
    }

    // 5. Close the stream
    aggregator.disconnect();
    drop(subscription);
    info!("stopped, goodbye");
    Ok(())
}
