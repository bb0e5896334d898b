//! The pizzeria reception binary.
//!
//! Reads order lines from stdin, distributes them across kitchen processes,
//! and reports status on demand. Exits 0 on a clean `exit`/EOF, 84 on an
//! argument error or fatal startup failure.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use pizzeria_reception::{KitchenManager, OrderParser};

const EXIT_FAILURE: i32 = 84;

/// Simulated pizzeria: reception takes orders and kitchens cook them.
#[derive(Parser, Debug)]
#[command(name = "pizzeria", version, about, long_about = None)]
struct Cli {
    /// Cooking-time multiplier; must be positive.
    time_multiplier: f64,

    /// Cooks per kitchen; must be positive.
    cooks_per_kitchen: u32,

    /// Stock replenish interval in milliseconds.
    stock_regen_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn validate(&self) -> Result<()> {
        if !(self.time_multiplier > 0.0 && self.time_multiplier.is_finite()) {
            anyhow::bail!("time multiplier must be a positive number");
        }
        if self.cooks_per_kitchen == 0 {
            anyhow::bail!("number of cooks must be a positive number");
        }
        Ok(())
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Help and version output is a clean exit, not an argument error.
            match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                | ErrorKind::DisplayVersion => std::process::exit(0),
                _ => std::process::exit(EXIT_FAILURE),
            }
        }
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(EXIT_FAILURE);
    }
}

#[tokio::main]
async fn run(cli: Cli) -> Result<()> {
    cli.validate()?;

    let manager = KitchenManager::new(
        cli.cooks_per_kitchen,
        Duration::from_millis(cli.stock_regen_ms),
        cli.time_multiplier,
    )
    .context("failed to start reception")?;
    let mut parser = OrderParser::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "exit" | "quit" => break,
            "status" => manager.display_status(),
            _ => match parser.parse(line) {
                Ok(orders) => {
                    manager.distribute_orders(&orders).await;
                    info!("order placed: {} pizzas", orders.len());
                }
                Err(e) => eprintln!("Error: {e}"),
            },
        }
    }

    manager.cleanup().await;
    Ok(())
}
