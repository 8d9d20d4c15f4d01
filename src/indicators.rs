//! Volatility indicators feeding the adaptive grid and the risk throttle
//!
//! Moving averages wrap the `ta` crate. ATR applies Wilder's smoothing
//! directly, since `ta` smooths with the standard EMA factor and the
//! spacing math expects the backtrader-compatible series. Outputs stay
//! aligned with the input series, `None` during warmup.

use ta::indicators::SimpleMovingAverage;
use ta::Next;

use crate::Candle;

/// Simple moving average, `None` until `period` samples have arrived
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let Ok(mut indicator) = SimpleMovingAverage::new(period) else {
        return vec![None; values.len()];
    };
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let out = indicator.next(value);
            (i + 1 >= period).then_some(out)
        })
        .collect()
}

/// True range per bar: the high-low span widened by any gap from the
/// prior close
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let span = c.high - c.low;
            match i.checked_sub(1).map(|prev| candles[prev].close) {
                Some(prev_close) => span
                    .max((c.high - prev_close).abs())
                    .max((c.low - prev_close).abs()),
                None => span,
            }
        })
        .collect()
}

/// Average true range with Wilder's smoothing:
/// `atr = (prev_atr * (period - 1) + tr) / period`, seeded by the plain
/// mean of the first `period` true ranges.
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; candles.len()];
    }

    let tr = true_range(candles);
    let mut smoothed: Option<f64> = None;
    tr.iter()
        .enumerate()
        .map(|(i, &value)| {
            smoothed = match smoothed {
                Some(prev) => Some((prev * (period as f64 - 1.0) + value) / period as f64),
                None if i + 1 == period => {
                    Some(tr[..period].iter().sum::<f64>() / period as f64)
                }
                None => None,
            };
            smoothed
        })
        .collect()
}

/// Latest ATR plus the SMA of the ATR series itself, the "average
/// volatility" baseline the throttle and adaptive spacing compare against.
///
/// `None` until the ATR warmup completes.
pub fn atr_snapshot(candles: &[Candle], period: usize) -> Option<(f64, f64)> {
    let series: Vec<f64> = atr(candles, period).into_iter().flatten().collect();
    let current = *series.last()?;

    let average = match sma(&series, period).last().copied().flatten() {
        Some(avg) => avg,
        // Fewer ATR points than the averaging window: plain mean
        None => series.iter().sum::<f64>() / series.len() as f64,
    };

    Some((current, average))
}
