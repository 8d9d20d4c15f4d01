//! Core order, lock, and position types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Side;

/// Position sizes at or below this are treated as fully drained
pub const SIZE_EPSILON: f64 = 1e-9;

/// A grid slot is addressed by its level index and direction
pub type LevelKey = (usize, Side);

/// A resting limit order at one grid level.
///
/// Size stays `None` until the order triggers; it is computed from the
/// allocation weights and the throttle multiplier at that moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    /// Grid level index, 0-based from the lower range boundary
    pub level: usize,

    pub side: Side,

    /// Limit price at this level
    pub price: f64,

    /// Base-currency size, computed at trigger time
    pub size: Option<f64>,

    /// Set when the order fires; cleared only by removing the order at fill
    pub triggered: bool,

    /// Bar index of the last trigger, so one order cannot fire twice
    /// within the same bar
    pub last_checked_bar: Option<usize>,
}

impl PendingOrder {
    pub fn new(level: usize, side: Side, price: f64) -> Self {
        Self {
            level,
            side,
            price,
            size: None,
            triggered: false,
            last_checked_bar: None,
        }
    }

    pub fn key(&self) -> LevelKey {
        (self.level, self.side)
    }
}

/// Per-(level, direction) lock preventing a level from refiring before its
/// paired counter-fill completes.
///
/// A key holds at most one open, unmatched position at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockState {
    /// An order at this key may fire
    #[default]
    Idle,

    /// An order fired and its paired counter-order has not fully closed;
    /// no new order may fire at this key
    Opened,

    /// The paired position closed; unlocks back to `Idle` once no partner
    /// positions remain at this key
    Closed,
}

/// An open position created by an entry fill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridPosition {
    pub entry_price: f64,

    pub side: Side,

    /// Shrinks toward zero on partial exits; removed at `SIZE_EPSILON`
    pub size: f64,

    pub entry_time: DateTime<Utc>,

    /// Grid level index where this position's matching exit is expected
    pub paired_level: usize,

    /// Level the entry fired at; its lock is released when this position
    /// and its partners fully drain
    pub entry_level: usize,

    /// Insertion sequence, used for oldest-first exit matching
    pub seq: u64,
}

impl GridPosition {
    /// The lock key this position holds open
    pub fn origin(&self) -> LevelKey {
        (self.entry_level, self.side)
    }

    /// Signed size: long positive, short negative
    pub fn signed_size(&self) -> f64 {
        match self.side {
            Side::Buy => self.size,
            Side::Sell => -self.size,
        }
    }
}
