//! Kitchen child-process entry point.
//!
//! Not a user-facing binary: reception launches it with the kitchen's id and
//! tuning parameters. Exits 0 on a clean scheduler return, non-zero on a
//! fault.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use pizzeria_kitchen::{Kitchen, KitchenConfig};

/// Kitchen worker process for the pizzeria simulation.
#[derive(Parser, Debug)]
#[command(name = "pizzeria-kitchen")]
struct Args {
    /// Kitchen id assigned by reception.
    #[arg(long)]
    id: u32,

    /// Number of cooks in this kitchen.
    #[arg(long)]
    cooks: u32,

    /// Stock replenish interval in milliseconds.
    #[arg(long)]
    restock_ms: u64,

    /// Cooking-time multiplier.
    #[arg(long)]
    multiplier: f64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let kitchen = Kitchen::new(KitchenConfig {
        id: args.id,
        cooks: args.cooks,
        restock_interval: Duration::from_millis(args.restock_ms),
        time_multiplier: args.multiplier,
    })?;
    kitchen.run().await?;
    Ok(())
}
