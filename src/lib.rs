//! Grid Order & Risk Management Engine
//!
//! A research/backtesting toolkit for range-bound grid trading strategies:
//! generates a ladder of price levels inside a bounded range, simulates
//! resting limit orders against historical bars, tracks the resulting
//! positions and inventory, computes realized PnL, and applies risk
//! throttling to order sizing.
//!
//! The engine is single-threaded and bar-synchronous. A bar's high/low is
//! checked against all pending orders; each fill updates the position
//! ledger and the inventory tracker, which feed the risk throttle used to
//! size the next order.
//!
//! ## Example
//! ```
//! use grid_engine::{GridBacktester, GridConfig};
//! use grid_engine::config::RangeConfig;
//!
//! let mut config = GridConfig::default();
//! config.range = RangeConfig { lower: 90_000.0, upper: 110_000.0 };
//!
//! let mut backtester = GridBacktester::new(config).unwrap();
//! let report = backtester.run(&[]);
//! assert_eq!(report.bars_processed, 0);
//! ```

pub mod backtest;
pub mod config;
pub mod data;
pub mod engine;
pub mod grid;
pub mod indicators;
pub mod oms;
pub mod risk;
pub mod types;

pub use backtest::{BacktestReport, GridBacktester};
pub use config::{ConfigError, GridConfig};
pub use engine::{EngineError, EngineState, GridEngine, GridStatistics};
pub use risk::{RiskThrottle, ThrottleStatus};
pub use types::*;
