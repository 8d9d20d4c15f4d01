//! Grid engine - main entry point
//!
//! This binary provides two subcommands:
//! - backtest: Run a grid simulation over CSV candle data
//! - levels: Print the price ladder a configuration would generate

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "grid-engine")]
#[command(about = "Grid order and risk management engine for range-bound backtesting", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a grid backtest over CSV candle data
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/grid.json")]
        config: String,

        /// Path to OHLCV CSV data
        #[arg(short, long)]
        data: String,

        /// Market regime override (bullish, neutral, bearish)
        #[arg(long)]
        regime: Option<String>,

        /// Risk budget override
        #[arg(long)]
        budget: Option<f64>,
    },

    /// Print the generated price ladder for a configuration
    Levels {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/grid.json")]
        config: String,

        /// Current price the ladder is centered on
        #[arg(short, long)]
        price: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Keep the file-writer guard alive for the process lifetime
    let _guard = match &cli.log_file {
        Some(path) => {
            let appender = tracing_appender::rolling::never(".", path);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    };

    match cli.command {
        Commands::Backtest {
            config,
            data,
            regime,
            budget,
        } => commands::backtest::run(config, data, regime, budget),
        Commands::Levels { config, price } => commands::levels::run(config, price),
    }
}
