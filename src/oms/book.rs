//! Resting-order book with per-level locks
//!
//! Holds the pending grid orders, detects when a bar's high/low touches a
//! resting price, and runs the `Idle → Opened → Closed → Idle` lock cycle
//! that keeps a level from refiring before its counter-fill completes.
//!
//! Uses BTreeMap over `OrderedFloat` price keys so the trigger scan walks
//! buys from the highest price down and sells from the lowest price up,
//! the order a falling or rising bar would reach them.

use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashMap};

use crate::oms::types::{LevelKey, LockState, PendingOrder};
use crate::Side;

pub struct GridBook {
    /// Buy orders by price; scanned descending (nearest level first)
    buy_prices: BTreeMap<OrderedFloat<f64>, usize>,

    /// Sell orders by price; scanned ascending
    sell_prices: BTreeMap<OrderedFloat<f64>, usize>,

    /// Pending orders, unique per (level, direction)
    orders: HashMap<LevelKey, PendingOrder>,

    /// Lock state per (level, direction); absent means `Idle`
    locks: HashMap<LevelKey, LockState>,
}

impl GridBook {
    pub fn new() -> Self {
        Self {
            buy_prices: BTreeMap::new(),
            sell_prices: BTreeMap::new(),
            orders: HashMap::new(),
            locks: HashMap::new(),
        }
    }

    /// Place a resting order. Duplicate orders at the same key are never
    /// stacked; returns false if one already rests there.
    pub fn place(&mut self, order: PendingOrder) -> bool {
        let key = order.key();
        if self.orders.contains_key(&key) {
            return false;
        }

        match order.side {
            Side::Buy => {
                self.buy_prices.insert(OrderedFloat(order.price), order.level);
            }
            Side::Sell => {
                self.sell_prices
                    .insert(OrderedFloat(order.price), order.level);
            }
        }
        self.orders.insert(key, order);
        true
    }

    /// Remove the order at `key`, if any
    pub fn remove(&mut self, key: LevelKey) -> Option<PendingOrder> {
        let order = self.orders.remove(&key)?;
        match order.side {
            Side::Buy => {
                self.buy_prices.remove(&OrderedFloat(order.price));
            }
            Side::Sell => {
                self.sell_prices.remove(&OrderedFloat(order.price));
            }
        }
        Some(order)
    }

    pub fn get(&self, key: LevelKey) -> Option<&PendingOrder> {
        self.orders.get(&key)
    }

    pub fn contains(&self, key: LevelKey) -> bool {
        self.orders.contains_key(&key)
    }

    /// Find the next order the bar touches, mark it triggered, and return a
    /// copy. Touch semantics: a buy fires when `bar_low <= price`, a sell
    /// when `bar_high >= price`. Reaching the level fires it; no strict
    /// cross is required.
    ///
    /// Orders already triggered, already fired this bar, or whose lock is
    /// not `Idle` are skipped; deeper levels are still scanned because a
    /// single bar may cross several.
    pub fn next_triggered(
        &mut self,
        bar_high: f64,
        bar_low: f64,
        bar_index: usize,
    ) -> Option<PendingOrder> {
        let mut candidate: Option<LevelKey> = None;

        for (&price, &level) in self.buy_prices.iter().rev() {
            if bar_low > price.0 {
                break;
            }
            if self.may_fire((level, Side::Buy), bar_index) {
                candidate = Some((level, Side::Buy));
                break;
            }
        }

        if candidate.is_none() {
            for (&price, &level) in self.sell_prices.iter() {
                if bar_high < price.0 {
                    break;
                }
                if self.may_fire((level, Side::Sell), bar_index) {
                    candidate = Some((level, Side::Sell));
                    break;
                }
            }
        }

        let key = candidate?;
        let order = self.orders.get_mut(&key)?;
        order.triggered = true;
        order.last_checked_bar = Some(bar_index);
        tracing::debug!(
            level = key.0,
            side = %key.1,
            price = format!("{:.2}", order.price),
            bar = bar_index,
            "Order triggered"
        );
        Some(order.clone())
    }

    fn may_fire(&self, key: LevelKey, bar_index: usize) -> bool {
        let Some(order) = self.orders.get(&key) else {
            return false;
        };
        if order.triggered || order.last_checked_bar == Some(bar_index) {
            return false;
        }
        self.lock(key) == LockState::Idle
    }

    /// Attach the trigger-time size to a fired order
    pub fn arm(&mut self, key: LevelKey, size: f64) -> bool {
        match self.orders.get_mut(&key) {
            Some(order) if order.triggered => {
                order.size = Some(size);
                true
            }
            _ => false,
        }
    }

    /// Stand a fired order back down (e.g. throttled to zero size). The
    /// order keeps its `last_checked_bar` so it will not retry this bar.
    pub fn disarm(&mut self, key: LevelKey) {
        if let Some(order) = self.orders.get_mut(&key) {
            order.triggered = false;
            order.size = None;
        }
    }

    /// Current lock state for a key (`Idle` when never locked)
    pub fn lock(&self, key: LevelKey) -> LockState {
        self.locks.get(&key).copied().unwrap_or_default()
    }

    /// `Idle → Opened` on an entry fill. Opening an already-open lock is a
    /// logic fault upstream; it is logged and ignored rather than raised.
    pub fn open_lock(&mut self, key: LevelKey) {
        match self.lock(key) {
            LockState::Idle => {
                self.locks.insert(key, LockState::Opened);
            }
            state => {
                tracing::warn!(level = key.0, side = %key.1, ?state, "open_lock on non-idle lock");
            }
        }
    }

    /// `Opened → Closed → Idle` once the paired position fully drains and
    /// no partner positions remain at the key.
    pub fn complete_pair(&mut self, key: LevelKey) {
        match self.lock(key) {
            LockState::Opened => {
                self.locks.insert(key, LockState::Closed);
                // No partner positions remain; the level may refire on a
                // later crossing.
                self.locks.insert(key, LockState::Idle);
                tracing::debug!(level = key.0, side = %key.1, "Lock released");
            }
            state => {
                tracing::warn!(level = key.0, side = %key.1, ?state, "complete_pair on unopened lock");
            }
        }
    }

    /// Pending orders sorted by (level, direction)
    pub fn pending_orders(&self) -> Vec<PendingOrder> {
        let mut orders: Vec<PendingOrder> = self.orders.values().cloned().collect();
        orders.sort_by_key(|o| o.key());
        orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn clear(&mut self) {
        self.buy_prices.clear();
        self.sell_prices.clear();
        self.orders.clear();
        self.locks.clear();
    }
}

impl Default for GridBook {
    fn default() -> Self {
        Self::new()
    }
}
