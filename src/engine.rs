//! Grid engine orchestrator
//!
//! Wires level generation, allocation, the order book, the position
//! ledger, the inventory tracker, and the risk throttle into the per-bar
//! `setup → check triggers → on fill` cycle. Everything is single-threaded
//! and bar-synchronous; the only locking discipline is the per-level
//! `GridLock` cycle guarding logical re-entrancy.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, GridConfig, MatchingMode};
use crate::grid::{
    generate_adaptive_ladder, generate_level_prices, level_weights, order_size, split_budget,
    GridLevel,
};
use crate::oms::{
    GridBook, GridPosition, InventoryState, InventoryTracker, LevelKey, LockState, PendingOrder,
    PositionLedger, SIZE_EPSILON,
};
use crate::risk::{RiskThrottle, ThrottleStatus};
use crate::Side;

/// Safety cap on trigger drain iterations within one bar, so a malformed
/// configuration cannot spin the caller's loop forever
pub const MAX_TRIGGERS_PER_BAR: usize = 256;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("current price {price} outside configured range [{lower}, {upper}]")]
    PriceOutOfRange { price: f64, lower: f64, upper: f64 },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Aggregate snapshot exposed to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridStatistics {
    /// Gross realized PnL
    pub realized_pnl: f64,
    pub total_fees: f64,
    /// `realized_pnl - total_fees`
    pub net_pnl: f64,
    pub total_trades: usize,
    pub total_buy_volume: f64,
    pub total_sell_volume: f64,
    pub open_positions: usize,
    /// Open notional at entry prices
    pub open_position_value: f64,
    /// Signed open size including untracked initial inventory
    pub net_open_size: f64,
    pub pending_orders: usize,
    pub levels_placed: usize,
    /// Configuration echo
    pub config: GridConfig,
}

/// Full pending-order and position view for logging/plotting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub pending_orders: Vec<PendingOrder>,
    pub positions: Vec<GridPosition>,
    pub inventory: InventoryState,
    pub throttle: ThrottleStatus,
}

pub struct GridEngine {
    config: GridConfig,
    /// Full ladder prices by global index
    level_prices: Vec<f64>,
    /// Levels that actually got an order (weights assigned)
    levels: Vec<GridLevel>,
    /// Quote-currency notional allocated per key
    notionals: HashMap<LevelKey, f64>,
    book: GridBook,
    ledger: PositionLedger,
    inventory: InventoryTracker,
    throttle: RiskThrottle,
    /// Initial inventory with no tracked entry; sells against it are
    /// orphan fills
    untracked_long: f64,
    current_atr: f64,
    average_atr: f64,
    current_time: DateTime<Utc>,
    current_day: Option<NaiveDate>,
    daily_base_pnl: f64,
    current_bar: usize,
    triggers_this_bar: usize,
    is_setup: bool,
}

impl GridEngine {
    /// Build an engine from a validated configuration. Programmatically
    /// constructed configs are validated again here; a bad range or
    /// spacing never reaches the simulation loop.
    pub fn new(config: GridConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ledger = PositionLedger::new(config.fees.maker_fee, config.matching);
        let inventory = InventoryTracker::new(&config.inventory);
        let throttle = RiskThrottle::new(config.throttle.clone(), config.allocation.risk_budget);
        Ok(Self {
            config,
            level_prices: Vec::new(),
            levels: Vec::new(),
            notionals: HashMap::new(),
            book: GridBook::new(),
            ledger,
            inventory,
            throttle,
            untracked_long: 0.0,
            current_atr: 0.0,
            average_atr: 0.0,
            current_time: DateTime::<Utc>::MIN_UTC,
            current_day: None,
            daily_base_pnl: 0.0,
            current_bar: 0,
            triggers_this_bar: 0,
            is_setup: false,
        })
    }

    /// Generate the ladder and place the initial resting orders.
    ///
    /// Fails if the current price is outside the configured range; an
    /// out-of-range grid would be one-sided, so setup refuses it before
    /// any simulation proceeds. With `initial_position_pct > 0` a slice of the buy
    /// budget is converted to inventory at the current price; later sells
    /// against it are orphan fills.
    pub fn setup_grid(
        &mut self,
        current_price: f64,
        time: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if !self.config.range.contains(current_price) {
            return Err(EngineError::PriceOutOfRange {
                price: current_price,
                lower: self.config.range.lower,
                upper: self.config.range.upper,
            });
        }
        self.current_time = time;

        // A fresh setup replaces any prior grid outright; the ledger and
        // inventory carry across regenerations
        self.levels.clear();
        self.notionals.clear();
        self.book.clear();

        let (buy_indices, sell_indices): (Vec<usize>, Vec<usize>) = if let Some(adaptive) =
            self.config.levels.adaptive.clone()
        {
            // Adaptive variant: buys walk down from the current price with
            // volatility-derived spacing; each buy's exit rung is the next
            // ladder price up, so the top of the ladder is the mid itself
            // and no sells rest at setup.
            let ladder = generate_adaptive_ladder(
                &adaptive,
                &self.config.range,
                self.config.fees.round_trip(),
                current_price,
                self.current_atr,
                self.average_atr,
            )?;
            if ladder.buys.is_empty() {
                // Not an error: the range simply fits no layer at this
                // volatility. The grid stands empty until regenerated.
                warn!(
                    spacing = format!("{:.5}", ladder.spacing),
                    "No adaptive levels fit the effective range"
                );
            }
            self.level_prices = ladder.buys.clone();
            if let Some(&top) = ladder.sells.last() {
                self.level_prices.push(top);
            }
            ((0..ladder.buys.len()).collect(), Vec::new())
        } else {
            self.level_prices = generate_level_prices(
                self.config.range.lower,
                self.config.range.upper,
                self.config.levels.count,
                self.config.levels.mode,
            )?;
            let buys = (0..self.level_prices.len())
                .filter(|&i| self.level_prices[i] < current_price)
                .collect();
            let sells = (0..self.level_prices.len())
                .filter(|&i| self.level_prices[i] > current_price)
                .collect();
            (buys, sells)
        };

        let effective_budget = self.config.allocation.risk_budget * self.config.fees.leverage;
        let (buy_budget, sell_budget) =
            split_budget(effective_budget, self.config.allocation.regime);

        // Weight index 0 is the level nearest the mid: the highest buy and
        // the lowest sell.
        let buy_weights = level_weights(
            buy_indices.len(),
            self.config.allocation.mode,
            self.config.allocation.edge_weight_factor,
        );
        for (distance, &index) in buy_indices.iter().rev().enumerate() {
            self.place_initial(index, Side::Buy, buy_weights[distance], buy_budget);
        }

        let sell_weights = level_weights(
            sell_indices.len(),
            self.config.allocation.mode,
            self.config.allocation.edge_weight_factor,
        );
        for (distance, &index) in sell_indices.iter().enumerate() {
            self.place_initial(index, Side::Sell, sell_weights[distance], sell_budget);
        }

        if self.config.initial_position_pct > 0.0 {
            let pool = order_size(buy_budget, self.config.initial_position_pct, current_price);
            self.ledger.record_orphan(Side::Buy, current_price, pool);
            self.untracked_long = pool;
            self.inventory.update(pool, 0.0, None, time);
            info!(
                size = format!("{:.6}", pool),
                price = format!("{:.2}", current_price),
                "Established initial inventory"
            );
        }

        self.is_setup = true;
        info!(
            levels = self.levels.len(),
            buys = buy_indices.len(),
            sells = sell_indices.len(),
            lower = format!("{:.2}", self.config.range.lower),
            upper = format!("{:.2}", self.config.range.upper),
            "Grid set up"
        );
        Ok(())
    }

    fn place_initial(&mut self, index: usize, side: Side, weight: f64, side_budget: f64) {
        let price = self.level_prices[index];
        let notional = side_budget * weight;
        if notional < self.config.min_order_size_usd {
            warn!(
                level = index,
                side = %side,
                notional = format!("{:.2}", notional),
                "Level below minimum order size, not placed"
            );
            return;
        }

        self.levels.push(GridLevel {
            price,
            index,
            side,
            weight,
        });
        self.notionals.insert((index, side), notional);
        self.book.place(PendingOrder::new(index, side, price));
    }

    /// Advance the engine clock to a new bar: resets the per-bar trigger
    /// budget and rolls the daily PnL base at date boundaries.
    pub fn begin_bar(&mut self, time: DateTime<Utc>, bar_index: usize) {
        self.current_time = time;
        self.current_bar = bar_index;
        self.triggers_this_bar = 0;

        let day = time.date_naive();
        if self.current_day != Some(day) {
            self.current_day = Some(day);
            self.daily_base_pnl = self.ledger.net_realized();
        }
    }

    /// Feed the externally computed volatility pair (current ATR and its
    /// average) consumed by adaptive spacing and the throttle.
    pub fn set_volatility(&mut self, current_atr: f64, average_atr: f64) {
        self.current_atr = current_atr;
        self.average_atr = average_atr;
    }

    pub fn daily_pnl(&self) -> f64 {
        self.ledger.net_realized() - self.daily_base_pnl
    }

    pub fn atr_ratio(&self) -> f64 {
        if self.average_atr > 0.0 {
            self.current_atr / self.average_atr
        } else {
            1.0
        }
    }

    /// Evaluate the throttle against the current inventory/PnL/volatility
    pub fn throttle_status(&self) -> ThrottleStatus {
        self.throttle
            .evaluate(&self.inventory.state(), self.daily_pnl(), self.atr_ratio())
    }

    /// Return the next triggered order for this bar, sized and ready to
    /// fill, or `None` when nothing (further) fires.
    ///
    /// Callers drain this in a loop per bar, since a single bar may cross
    /// several levels. The loop is bounded by [`MAX_TRIGGERS_PER_BAR`].
    pub fn check_order_triggers(
        &mut self,
        bar_high: f64,
        bar_low: f64,
        bar_index: usize,
    ) -> Option<PendingOrder> {
        if !self.is_setup {
            return None;
        }
        if bar_index != self.current_bar {
            self.current_bar = bar_index;
            self.triggers_this_bar = 0;
        }

        loop {
            if self.triggers_this_bar >= MAX_TRIGGERS_PER_BAR {
                warn!(
                    bar = bar_index,
                    cap = MAX_TRIGGERS_PER_BAR,
                    "Trigger cap reached; deferring remaining levels to next bar"
                );
                return None;
            }

            let order = self.book.next_triggered(bar_high, bar_low, bar_index)?;
            let key = order.key();

            match self.size_for_trigger(&order) {
                Some(size) => {
                    self.book.arm(key, size);
                    self.triggers_this_bar += 1;
                    let mut armed = order;
                    armed.size = Some(size);
                    return Some(armed);
                }
                None => {
                    // Throttled or unsizeable; stands down for this bar but
                    // keeps resting
                    self.book.disarm(key);
                }
            }
        }
    }

    /// Size an order at trigger time. Exits close what the ledger can
    /// match (the throttle never blocks an unwind); entries are scaled by
    /// the throttle multiplier and clamped to remaining inventory capacity.
    fn size_for_trigger(&self, order: &PendingOrder) -> Option<f64> {
        let key = order.key();
        let base_notional = self.notionals.get(&key).copied().unwrap_or(0.0);

        let matchable = self.ledger.match_available(order.level, order.side);
        if matchable > SIZE_EPSILON {
            // Adjacent pairing closes its partner in full; FIFO drains the
            // pool one level allocation at a time
            let size = match self.config.matching {
                MatchingMode::Adjacent => matchable,
                MatchingMode::Fifo if base_notional > 0.0 => {
                    matchable.min(order_size(base_notional, 1.0, order.price))
                }
                MatchingMode::Fifo => matchable,
            };
            return Some(size);
        }

        // Sells dispose of untracked initial inventory before quoting short
        if order.side == Side::Sell && self.untracked_long > SIZE_EPSILON {
            let size = order_size(base_notional, 1.0, order.price).min(self.untracked_long);
            return if size > SIZE_EPSILON { Some(size) } else { None };
        }

        let status = self.throttle_status();
        if status.size_multiplier <= 0.0 {
            debug!(
                level = order.level,
                side = %order.side,
                reason = status.reason,
                "Entry suppressed by throttle"
            );
            return None;
        }

        let notional = base_notional * status.size_multiplier;
        if notional < self.config.min_order_size_usd {
            return None;
        }

        let size = order_size(base_notional, status.size_multiplier, order.price)
            .min(self.inventory.available_capacity(order.side));
        if size > SIZE_EPSILON {
            Some(size)
        } else {
            None
        }
    }

    /// Apply the fill of a previously triggered order.
    ///
    /// Ignores orders the book no longer holds as triggered, so replaying
    /// a fill (or filling after re-entry replaced the slot) cannot
    /// duplicate positions or orders.
    pub fn on_order_filled(
        &mut self,
        order: &PendingOrder,
        fill_price: Option<f64>,
        fill_time: Option<DateTime<Utc>>,
    ) {
        let key = order.key();
        let Some(pending) = self.book.remove(key) else {
            debug!(level = key.0, side = %key.1, "Ignoring fill for unknown order");
            return;
        };
        if !pending.triggered {
            // A fresh re-entry order occupies this slot; replaying an old
            // fill must not consume it
            debug!(level = key.0, side = %key.1, "Ignoring fill for untriggered order");
            self.book.place(pending);
            return;
        }
        let size = pending.size.or(order.size).unwrap_or(0.0);
        let price = fill_price.unwrap_or(pending.price);
        let time = fill_time.unwrap_or(self.current_time);

        if size <= SIZE_EPSILON {
            debug!(level = key.0, side = %key.1, "Zero-size fill; re-quoting level");
            self.replace_order(key.0, key.1, pending.price);
            return;
        }

        let matchable = self.ledger.match_available(key.0, key.1);
        if matchable > SIZE_EPSILON {
            self.apply_exit(key, price, size, time);
        } else if key.1 == Side::Sell && self.untracked_long > SIZE_EPSILON {
            self.apply_orphan(key, price, size, time);
        } else {
            self.apply_entry(key, price, size, time);
        }

        // Re-entry: the level keeps quoting regardless of fill kind
        self.replace_order(key.0, key.1, pending.price);
    }

    fn apply_exit(&mut self, key: LevelKey, price: f64, size: f64, time: DateTime<Utc>) {
        let (level, side) = key;
        let result = self.ledger.record_exit(level, side, price, size, time);

        match side {
            Side::Sell => self
                .inventory
                .update(-result.matched_size, 0.0, Some(key), time),
            Side::Buy => self
                .inventory
                .update(0.0, -result.matched_size, Some(key), time),
        }

        for origin in &result.released_origins {
            self.book.complete_pair(*origin);
        }

        debug!(
            level = level,
            side = %side,
            price = format!("{:.2}", price),
            size = format!("{:.6}", result.matched_size),
            net_pnl = format!("{:.4}", result.net_pnl),
            "Exit fill"
        );

        if result.leftover > SIZE_EPSILON {
            self.apply_orphan(key, price, result.leftover, time);
        }
    }

    fn apply_orphan(&mut self, key: LevelKey, price: f64, size: f64, time: DateTime<Utc>) {
        let (level, side) = key;
        let disposable = if side == Side::Sell {
            size.min(self.untracked_long)
        } else {
            0.0
        };

        self.ledger.record_orphan(side, price, size);
        if disposable > SIZE_EPSILON {
            self.untracked_long -= disposable;
            self.inventory.update(-disposable, 0.0, Some(key), time);
        }

        warn!(
            level = level,
            side = %side,
            price = format!("{:.2}", price),
            size = format!("{:.6}", size),
            "Orphan fill: no matching entry"
        );
    }

    fn apply_entry(&mut self, key: LevelKey, price: f64, size: f64, time: DateTime<Utc>) {
        let (level, side) = key;
        let max_index = self.level_prices.len().saturating_sub(1);
        let paired = match side {
            Side::Buy if level < max_index => Some(level + 1),
            Side::Sell if level > 0 => Some(level - 1),
            _ => None,
        };

        let paired_level = match paired {
            Some(p) => p,
            None => {
                // Boundary level with no feasible exit rung; the position
                // pairs to itself and never gets a counter-order
                warn!(level = level, side = %side, "Entry at grid boundary has no pairing level");
                level
            }
        };

        self.ledger
            .record_entry(level, paired_level, side, price, size, time);
        self.book.open_lock(key);

        match side {
            Side::Buy => self.inventory.update(size, 0.0, Some(key), time),
            Side::Sell => self.inventory.update(0.0, size, Some(key), time),
        }

        debug!(
            level = level,
            side = %side,
            price = format!("{:.2}", price),
            size = format!("{:.6}", size),
            paired = paired_level,
            "Entry fill"
        );

        // Paired counter-order: buy i quotes its exit at i+1, sell i at i-1
        if let Some(paired) = paired {
            self.replace_order(paired, side.opposite(), self.level_prices[paired]);
        }
    }

    /// Place a fresh resting order at a key unless one already rests
    /// there. New orders sit out the rest of the current bar.
    fn replace_order(&mut self, level: usize, side: Side, price: f64) {
        let key = (level, side);
        if self.book.contains(key) {
            return;
        }
        let mut order = PendingOrder::new(level, side, price);
        order.last_checked_bar = Some(self.current_bar);
        self.book.place(order);
    }

    /// Aggregate snapshot of realized results and open state
    pub fn get_statistics(&self) -> GridStatistics {
        let totals = self.ledger.totals();
        GridStatistics {
            realized_pnl: totals.total_pnl,
            total_fees: totals.total_fees,
            net_pnl: self.ledger.net_realized(),
            total_trades: totals.total_trades,
            total_buy_volume: totals.total_buy_volume,
            total_sell_volume: totals.total_sell_volume,
            open_positions: self.ledger.open_position_count(),
            open_position_value: self.ledger.open_value(),
            net_open_size: self.ledger.net_open_size() + self.untracked_long,
            pending_orders: self.book.len(),
            levels_placed: self.levels.len(),
            config: self.config.clone(),
        }
    }

    /// Full pending-order and position list for external logging/plotting
    pub fn get_current_state(&self) -> EngineState {
        EngineState {
            pending_orders: self.book.pending_orders(),
            positions: self.ledger.open_positions().to_vec(),
            inventory: self.inventory.state(),
            throttle: self.throttle_status(),
        }
    }

    pub fn is_setup(&self) -> bool {
        self.is_setup
    }

    pub fn lock(&self, key: LevelKey) -> LockState {
        self.book.lock(key)
    }

    pub fn level_price(&self, index: usize) -> Option<f64> {
        self.level_prices.get(index).copied()
    }

    pub fn inventory(&self) -> &InventoryTracker {
        &self.inventory
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }
}
