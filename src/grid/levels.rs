//! Grid level generation
//!
//! Turns a price range into a sorted ladder of level prices. Two families:
//! a fixed-count ladder (geometric or arithmetic spacing) and an adaptive
//! ladder whose spacing is derived from the current volatility estimate.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::config::{AdaptiveSpacingConfig, ConfigError, RangeConfig, SpacingMode};
use crate::Side;

/// One rung of the price ladder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLevel {
    pub price: f64,
    /// 0-based index from the lower range boundary
    pub index: usize,
    pub side: Side,
    /// Normalized across all levels on this side
    pub weight: f64,
}

/// Generate `count + 1` sorted prices spanning `[lower, upper]`.
///
/// Geometric: `price[i] = lower * (upper/lower)^(i/count)`, constant
/// percentage spacing. Arithmetic: `price[i] = lower + i*(upper-lower)/count`.
pub fn generate_level_prices(
    lower: f64,
    upper: f64,
    count: usize,
    mode: SpacingMode,
) -> Result<Vec<f64>, ConfigError> {
    if lower <= 0.0 {
        return Err(ConfigError::NonPositiveBound(lower));
    }
    if lower >= upper {
        return Err(ConfigError::InvalidRange { lower, upper });
    }
    if count == 0 {
        return Err(ConfigError::LevelCountOutOfRange {
            count,
            min: crate::config::MIN_GRID_LEVELS,
            max: crate::config::MAX_GRID_LEVELS,
        });
    }

    let n = count as f64;
    let prices = match mode {
        SpacingMode::Geometric => {
            let ratio = upper / lower;
            (0..=count)
                .map(|i| lower * ratio.powf(i as f64 / n))
                .collect()
        }
        SpacingMode::Arithmetic => {
            let step = (upper - lower) / n;
            (0..=count).map(|i| lower + i as f64 * step).collect()
        }
    };

    debug_assert!(is_strictly_increasing(&prices));
    Ok(prices)
}

fn is_strictly_increasing(prices: &[f64]) -> bool {
    prices.iter().tuple_windows().all(|(a, b)| a < b)
}

/// Derive spacing from the current volatility estimate.
///
/// `spacing = min_net_return + round_trip_fees
///          + volatility_factor * max(0, current_atr/average_atr - 1)`
///
/// clamped to `[base_spacing, max_spacing]` so spacing never drops below
/// cost coverage nor grows unbounded.
pub fn adaptive_spacing(
    config: &AdaptiveSpacingConfig,
    round_trip_fees: f64,
    current_atr: f64,
    average_atr: f64,
) -> f64 {
    let vol_ratio = if average_atr > 0.0 {
        current_atr / average_atr
    } else {
        1.0
    };
    let raw = config.min_net_return
        + round_trip_fees
        + config.volatility_factor * (vol_ratio - 1.0).max(0.0);
    raw.clamp(config.base_spacing, config.max_spacing)
}

/// Adaptive ladder: buy prices walking down from the mid, each paired sell
/// exactly one spacing unit above its buy.
#[derive(Debug, Clone)]
pub struct AdaptiveLadder {
    pub buys: Vec<f64>,
    pub sells: Vec<f64>,
    pub spacing: f64,
}

/// Generate the adaptive ladder.
///
/// The cushion (a volatility buffer in price units) is subtracted/added to
/// the configured bounds; buy levels walk downward by `price/(1+spacing)`
/// until the effective lower bound is reached, and each sell level is
/// `buy * (1 + spacing)`, fixing the pairing distance to one spacing unit.
pub fn generate_adaptive_ladder(
    config: &AdaptiveSpacingConfig,
    range: &RangeConfig,
    round_trip_fees: f64,
    mid: f64,
    current_atr: f64,
    average_atr: f64,
) -> Result<AdaptiveLadder, ConfigError> {
    range.validate()?;
    config.validate()?;

    let spacing = adaptive_spacing(config, round_trip_fees, current_atr, average_atr);
    if spacing <= 0.0 {
        return Err(ConfigError::NonPositiveSpacing(spacing));
    }

    let cushion = current_atr * config.cushion_atr_mult;
    let effective_lower = range.lower + cushion;
    let effective_upper = range.upper - cushion;

    let mut buys = Vec::new();
    let mut sells = Vec::new();

    let mut price = mid / (1.0 + spacing);
    while price >= effective_lower {
        let sell = price * (1.0 + spacing);
        if sell <= effective_upper {
            buys.push(price);
            sells.push(sell);
        }
        price /= 1.0 + spacing;
    }

    // Walked top-down; ladders are kept ascending like the fixed grid
    buys.reverse();
    sells.reverse();

    tracing::debug!(
        spacing = format!("{:.5}", spacing),
        levels = buys.len(),
        lower = format!("{:.2}", effective_lower),
        upper = format!("{:.2}", effective_upper),
        "Generated adaptive ladder"
    );

    Ok(AdaptiveLadder {
        buys,
        sells,
        spacing,
    })
}
