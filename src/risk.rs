//! Risk throttle
//!
//! Priority-ordered policy producing a size multiplier for the next order.
//! Rules are evaluated top to bottom, first match wins, and no branch ever
//! raises: inventory limit stops all new orders outright, the profit lock
//! and volatility brake scale them down, and the pass-through leaves sizing
//! untouched.

use serde::{Deserialize, Serialize};

use crate::config::ThrottleConfig;
use crate::oms::InventoryState;

/// Result of one throttle evaluation. Recomputed on demand; carries no
/// persistent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleStatus {
    /// Multiplier applied to the next order's size, in [0, 1]
    pub size_multiplier: f64,

    /// Human-readable explanation of which rule fired
    pub reason: String,

    pub inventory_limited: bool,
    pub profit_locked: bool,
    pub volatility_braked: bool,
}

impl ThrottleStatus {
    fn pass_through() -> Self {
        Self {
            size_multiplier: 1.0,
            reason: "no throttle".to_string(),
            inventory_limited: false,
            profit_locked: false,
            volatility_braked: false,
        }
    }
}

pub struct RiskThrottle {
    config: ThrottleConfig,
    /// Risk budget the profit target is measured against
    risk_budget: f64,
}

impl RiskThrottle {
    pub fn new(config: ThrottleConfig, risk_budget: f64) -> Self {
        Self {
            config,
            risk_budget,
        }
    }

    /// Evaluate the policy against current inventory, daily PnL, and the
    /// ATR ratio (current over average).
    pub fn evaluate(
        &self,
        inventory: &InventoryState,
        daily_pnl: f64,
        atr_ratio: f64,
    ) -> ThrottleStatus {
        let worst_utilization = inventory
            .long_utilization
            .max(inventory.short_utilization);

        if worst_utilization >= self.config.inventory_threshold {
            return ThrottleStatus {
                size_multiplier: 0.0,
                reason: format!(
                    "inventory at {:.0}% of limit, stop all orders",
                    worst_utilization * 100.0
                ),
                inventory_limited: true,
                profit_locked: false,
                volatility_braked: false,
            };
        }

        let profit_target = self.risk_budget * self.config.profit_target_pct;
        if daily_pnl >= profit_target {
            return ThrottleStatus {
                size_multiplier: self.config.profit_reduction,
                reason: format!(
                    "daily profit {:.2} reached target {:.2}, reducing size",
                    daily_pnl, profit_target
                ),
                inventory_limited: false,
                profit_locked: true,
                volatility_braked: false,
            };
        }

        if atr_ratio >= self.config.volatility_threshold {
            return ThrottleStatus {
                size_multiplier: self.config.volatility_reduction,
                reason: format!(
                    "volatility spike: ATR ratio {:.2} >= {:.2}",
                    atr_ratio, self.config.volatility_threshold
                ),
                inventory_limited: false,
                profit_locked: false,
                volatility_braked: true,
            };
        }

        ThrottleStatus::pass_through()
    }
}
