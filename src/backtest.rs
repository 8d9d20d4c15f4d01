//! Backtest driver
//!
//! Thin bar-loop harness around the grid engine: sets the grid up on the
//! first in-range bar, refreshes the volatility inputs each bar, drains
//! triggered orders, and fills them at their limit price. The engine holds
//! all the interesting state; this module only feeds it and collects a
//! summary.

use chrono::{DateTime, Utc};

use crate::engine::{EngineError, GridEngine, GridStatistics};
use crate::indicators;
use crate::{Candle, GridConfig};

/// Bars of history fed to the ATR snapshot each bar. Covers the ATR
/// period plus its own averaging window with warmup to spare.
const ATR_LOOKBACK: usize = 120;

/// Summary returned by a completed run
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub statistics: GridStatistics,
    pub bars_processed: usize,
    pub bars_skipped_before_setup: usize,
    pub fills: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

pub struct GridBacktester {
    engine: GridEngine,
    atr_period: usize,
}

impl GridBacktester {
    pub fn new(config: GridConfig) -> Result<Self, EngineError> {
        let atr_period = config
            .levels
            .adaptive
            .as_ref()
            .map(|a| a.atr_period)
            .unwrap_or(14);
        let engine = GridEngine::new(config)?;
        Ok(Self { engine, atr_period })
    }

    /// Run the simulation over a candle series.
    ///
    /// Setup happens on the first bar whose close is inside the configured
    /// range; bars before that are skipped. Each triggered order fills at
    /// its limit price on the bar that touched it.
    pub fn run(&mut self, candles: &[Candle]) -> BacktestReport {
        let mut bars_processed = 0;
        let mut bars_skipped = 0;
        let mut fills = 0;

        for (bar_index, candle) in candles.iter().enumerate() {
            // Volatility first: adaptive setup and the throttle both read it
            let window_start = (bar_index + 1).saturating_sub(ATR_LOOKBACK);
            if let Some((current, average)) =
                indicators::atr_snapshot(&candles[window_start..=bar_index], self.atr_period)
            {
                self.engine.set_volatility(current, average);
            }

            if !self.engine.is_setup() {
                match self.engine.setup_grid(candle.close, candle.datetime) {
                    Ok(()) => {
                        tracing::info!(
                            bar = bar_index,
                            price = format!("{:.2}", candle.close),
                            "Grid established"
                        );
                    }
                    Err(EngineError::PriceOutOfRange { .. }) => {
                        bars_skipped += 1;
                        continue;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "Grid setup failed");
                        break;
                    }
                }
            }

            self.engine.begin_bar(candle.datetime, bar_index);

            while let Some(order) = self.engine.check_order_triggers(
                candle.high,
                candle.low,
                bar_index,
            ) {
                self.engine
                    .on_order_filled(&order, Some(order.price), Some(candle.datetime));
                fills += 1;
            }

            bars_processed += 1;
        }

        BacktestReport {
            statistics: self.engine.get_statistics(),
            bars_processed,
            bars_skipped_before_setup: bars_skipped,
            fills,
            start: candles.first().map(|c| c.datetime),
            end: candles.last().map(|c| c.datetime),
        }
    }

    pub fn engine(&self) -> &GridEngine {
        &self.engine
    }
}
