//! Grid-preview command implementation

use anyhow::Result;

use grid_engine::grid::{generate_level_prices, level_weights, split_budget};
use grid_engine::GridConfig;

pub fn run(config_path: String, price: f64) -> Result<()> {
    let config = GridConfig::from_file(&config_path)?;

    if !config.range.contains(price) {
        anyhow::bail!(
            "price {} outside configured range [{}, {}]",
            price,
            config.range.lower,
            config.range.upper
        );
    }

    let prices = generate_level_prices(
        config.range.lower,
        config.range.upper,
        config.levels.count,
        config.levels.mode,
    )?;

    let buys: Vec<usize> = (0..prices.len()).filter(|&i| prices[i] < price).collect();
    let sells: Vec<usize> = (0..prices.len()).filter(|&i| prices[i] > price).collect();

    let effective_budget = config.allocation.risk_budget * config.fees.leverage;
    let (buy_budget, sell_budget) = split_budget(effective_budget, config.allocation.regime);
    let buy_weights = level_weights(
        buys.len(),
        config.allocation.mode,
        config.allocation.edge_weight_factor,
    );
    let sell_weights = level_weights(
        sells.len(),
        config.allocation.mode,
        config.allocation.edge_weight_factor,
    );

    println!("\nGrid ladder around {:.2} ({:?} spacing)", price, config.levels.mode);
    println!("{}", "-".repeat(60));
    println!("{:>5} {:>6} {:>14} {:>10} {:>12}", "index", "side", "price", "weight", "notional");

    for (distance, &i) in sells.iter().enumerate().rev() {
        let notional = sell_budget * sell_weights[distance];
        println!(
            "{:>5} {:>6} {:>14.2} {:>10.4} {:>12.2}",
            i, "sell", prices[i], sell_weights[distance], notional
        );
    }
    println!("{:>5} {:>6} {:>14.2}   <- current price", "", "", price);
    for (distance, &i) in buys.iter().rev().enumerate() {
        let notional = buy_budget * buy_weights[distance];
        println!(
            "{:>5} {:>6} {:>14.2} {:>10.4} {:>12.2}",
            i, "buy", prices[i], buy_weights[distance], notional
        );
    }
    println!("{}", "-".repeat(60));

    Ok(())
}
