//! Size allocation across grid levels
//!
//! Pure numeric transforms: an edge-heavy linear weight ramp, a
//! regime-driven split of the risk budget between sides, and the
//! quote-to-base size conversion.

use crate::config::AllocationMode;
use crate::MarketRegime;

/// Normalized weights for `n` levels on one side.
///
/// `raw_weight(i) = 1 + k*i` where `i = 0` is the level nearest the mid
/// price, so the outermost levels carry the most size. Weights sum to 1.
pub fn level_weights(n: usize, mode: AllocationMode, k: f64) -> Vec<f64> {
    if n == 0 {
        return vec![];
    }

    let raw: Vec<f64> = match mode {
        AllocationMode::Equal => vec![1.0; n],
        AllocationMode::Weighted => (0..n).map(|i| 1.0 + k * i as f64).collect(),
    };

    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Split a total risk budget between buy and sell sides by regime label.
///
/// Returns `(buy_budget, sell_budget)`.
pub fn split_budget(total: f64, regime: MarketRegime) -> (f64, f64) {
    let buy_fraction = match regime {
        MarketRegime::Bullish => 0.7,
        MarketRegime::Neutral => 0.5,
        MarketRegime::Bearish => 0.3,
    };
    (total * buy_fraction, total * (1.0 - buy_fraction))
}

/// Convert an allocated quote-currency amount into base-currency order size
pub fn order_size(budget: f64, weight: f64, price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    (budget * weight) / price
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_weights_sum_to_one() {
        for mode in [AllocationMode::Equal, AllocationMode::Weighted] {
            let weights = level_weights(7, mode, 0.25);
            let sum: f64 = weights.iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_equal_mode_uniform() {
        let weights = level_weights(4, AllocationMode::Equal, 0.25);
        for w in &weights {
            assert_relative_eq!(*w, 0.25, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_weighted_mode_edge_heavy() {
        let weights = level_weights(5, AllocationMode::Weighted, 0.25);
        for pair in weights.windows(2) {
            assert!(pair[1] > pair[0], "weights must grow toward the edge");
        }
        // raw = [1, 1.25, 1.5, 1.75, 2.0], sum = 7.5
        assert_relative_eq!(weights[0], 1.0 / 7.5, epsilon = 1e-12);
        assert_relative_eq!(weights[4], 2.0 / 7.5, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_slope_degenerates_to_equal() {
        let weighted = level_weights(5, AllocationMode::Weighted, 0.0);
        let equal = level_weights(5, AllocationMode::Equal, 0.0);
        for (a, b) in weighted.iter().zip(equal.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_regime_splits() {
        let (buy, sell) = split_budget(1000.0, MarketRegime::Bullish);
        assert_relative_eq!(buy, 700.0);
        assert_relative_eq!(sell, 300.0);

        let (buy, sell) = split_budget(1000.0, MarketRegime::Neutral);
        assert_relative_eq!(buy, 500.0);
        assert_relative_eq!(sell, 500.0);

        let (buy, sell) = split_budget(1000.0, MarketRegime::Bearish);
        assert_relative_eq!(buy, 300.0);
        assert_relative_eq!(sell, 700.0);
    }

    #[test]
    fn test_order_size_conversion() {
        assert_relative_eq!(order_size(10_000.0, 0.1, 50_000.0), 0.02);
        assert_relative_eq!(order_size(10_000.0, 0.1, 0.0), 0.0);
    }

    #[test]
    fn test_empty_level_set() {
        assert!(level_weights(0, AllocationMode::Weighted, 0.25).is_empty());
    }
}
