//! Backtest command implementation

use anyhow::Result;
use tracing::info;

use grid_engine::{data, GridBacktester, GridConfig, MarketRegime};

pub fn run(
    config_path: String,
    data_path: String,
    regime_override: Option<String>,
    budget_override: Option<f64>,
) -> Result<()> {
    info!("Starting grid backtest");

    let mut config = GridConfig::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(regime) = regime_override {
        let regime: MarketRegime = regime.parse().map_err(anyhow::Error::msg)?;
        info!("Overriding regime to: {:?}", regime);
        config.allocation.regime = regime;
    }

    if let Some(budget) = budget_override {
        info!("Overriding risk budget to: {:.2}", budget);
        config.allocation.risk_budget = budget;
    }

    let candles = data::load_csv(&data_path)?;
    info!("Loaded {} candles from: {}", candles.len(), data_path);

    let mut backtester = GridBacktester::new(config)?;
    let report = backtester.run(&candles);
    let stats = &report.statistics;

    println!("\n{}", "=".repeat(60));
    println!("GRID BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    if let (Some(start), Some(end)) = (report.start, report.end) {
        println!("  Period:          {} -> {}", start.date_naive(), end.date_naive());
    }
    println!("  Bars processed:  {}", report.bars_processed);
    println!("  Fills:           {}", report.fills);
    println!("  Round trips:     {}", stats.total_trades);
    println!("  Gross PnL:       {:.2}", stats.realized_pnl);
    println!("  Fees:            {:.2}", stats.total_fees);
    println!("  Net PnL:         {:.2}", stats.net_pnl);
    println!("  Buy volume:      {:.6}", stats.total_buy_volume);
    println!("  Sell volume:     {:.6}", stats.total_sell_volume);
    println!("  Open positions:  {}", stats.open_positions);
    println!("  Open value:      {:.2}", stats.open_position_value);
    println!("  Pending orders:  {}", stats.pending_orders);
    println!("{}", "=".repeat(60));

    Ok(())
}
