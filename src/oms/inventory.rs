//! Running long/short exposure and utilization tracking
//!
//! Pure bookkeeping consumed by the risk throttle; it never triggers
//! anything itself. Exposure is a function of cumulative fill deltas,
//! clamped at zero, with a bounded snapshot history kept for analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::config::InventoryConfig;
use crate::oms::types::LevelKey;
use crate::Side;

/// Point-in-time view of exposure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryState {
    pub long_exposure: f64,
    pub short_exposure: f64,
    pub net_exposure: f64,
    pub long_utilization: f64,
    pub short_utilization: f64,
}

/// History entry captured on every update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub time: DateTime<Utc>,
    pub long_exposure: f64,
    pub short_exposure: f64,
    pub net_exposure: f64,
}

pub struct InventoryTracker {
    long_exposure: f64,
    short_exposure: f64,
    max_long_units: f64,
    max_short_units: f64,
    fill_counts: HashMap<LevelKey, u64>,
    history: VecDeque<InventorySnapshot>,
    history_limit: usize,
}

impl InventoryTracker {
    pub fn new(config: &InventoryConfig) -> Self {
        Self {
            long_exposure: 0.0,
            short_exposure: 0.0,
            max_long_units: config.max_long_units,
            max_short_units: config.max_short_units,
            fill_counts: HashMap::new(),
            history: VecDeque::new(),
            history_limit: config.history_limit,
        }
    }

    /// Apply fill deltas. Exposure clamps at zero; a per-level fill counter
    /// accumulates when a level key is given, and the new state is
    /// snapshotted into the bounded history log.
    pub fn update(
        &mut self,
        long_delta: f64,
        short_delta: f64,
        key: Option<LevelKey>,
        time: DateTime<Utc>,
    ) {
        self.long_exposure = (self.long_exposure + long_delta).max(0.0);
        self.short_exposure = (self.short_exposure + short_delta).max(0.0);

        if let Some(key) = key {
            *self.fill_counts.entry(key).or_insert(0) += 1;
        }

        self.history.push_back(InventorySnapshot {
            time,
            long_exposure: self.long_exposure,
            short_exposure: self.short_exposure,
            net_exposure: self.net_exposure(),
        });
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    pub fn long_exposure(&self) -> f64 {
        self.long_exposure
    }

    pub fn short_exposure(&self) -> f64 {
        self.short_exposure
    }

    pub fn net_exposure(&self) -> f64 {
        self.long_exposure - self.short_exposure
    }

    /// Fraction of the configured maximum in use on one side
    pub fn utilization(&self, side: Side) -> f64 {
        let (exposure, max) = match side {
            Side::Buy => (self.long_exposure, self.max_long_units),
            Side::Sell => (self.short_exposure, self.max_short_units),
        };
        if max <= 0.0 {
            return 0.0;
        }
        exposure / max
    }

    /// True once utilization on `side` reaches the configured maximum
    pub fn check_limit(&self, side: Side) -> bool {
        self.utilization(side) >= 1.0
    }

    pub fn available_capacity(&self, side: Side) -> f64 {
        let (exposure, max) = match side {
            Side::Buy => (self.long_exposure, self.max_long_units),
            Side::Sell => (self.short_exposure, self.max_short_units),
        };
        (max - exposure).max(0.0)
    }

    pub fn fill_count(&self, key: LevelKey) -> u64 {
        self.fill_counts.get(&key).copied().unwrap_or(0)
    }

    pub fn history(&self) -> impl Iterator<Item = &InventorySnapshot> {
        self.history.iter()
    }

    pub fn state(&self) -> InventoryState {
        InventoryState {
            long_exposure: self.long_exposure,
            short_exposure: self.short_exposure,
            net_exposure: self.net_exposure(),
            long_utilization: self.utilization(Side::Buy),
            short_utilization: self.utilization(Side::Sell),
        }
    }
}
