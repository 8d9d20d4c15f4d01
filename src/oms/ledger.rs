//! Position ledger: converts fills into realized PnL
//!
//! Entries are held in insertion order. Exit fills drain matching entries
//! oldest-first; matching is either adjacent-pairing (the position's
//! expected exit level must equal the filled level) or plain FIFO across
//! the pool. The two modes attribute PnL differently and are selected
//! explicitly in configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MatchingMode;
use crate::oms::types::{GridPosition, LevelKey, SIZE_EPSILON};
use crate::Side;

/// Running totals across the whole simulation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Gross realized PnL; net is `total_pnl - total_fees`
    pub total_pnl: f64,
    pub total_fees: f64,
    pub total_trades: usize,
    pub total_buy_volume: f64,
    pub total_sell_volume: f64,
}

/// Outcome of one exit fill
#[derive(Debug, Clone, Default)]
pub struct ExitResult {
    pub matched_size: f64,
    pub gross_pnl: f64,
    /// Gross minus both legs' fees
    pub net_pnl: f64,
    /// Fill size that found no matching entry
    pub leftover: f64,
    /// Lock keys whose positions fully drained with no partners left
    pub released_origins: Vec<LevelKey>,
}

fn matches_exit(
    matching: MatchingMode,
    position: &GridPosition,
    level: usize,
    exit_side: Side,
) -> bool {
    if position.side != exit_side.opposite() {
        return false;
    }
    match matching {
        MatchingMode::Adjacent => position.paired_level == level,
        MatchingMode::Fifo => true,
    }
}

pub struct PositionLedger {
    positions: Vec<GridPosition>,
    maker_fee: f64,
    matching: MatchingMode,
    totals: LedgerTotals,
    next_seq: u64,
}

impl PositionLedger {
    pub fn new(maker_fee: f64, matching: MatchingMode) -> Self {
        Self {
            positions: Vec::new(),
            maker_fee,
            matching,
            totals: LedgerTotals::default(),
            next_seq: 0,
        }
    }

    fn fee(&self, price: f64, size: f64) -> f64 {
        price * size * self.maker_fee
    }

    /// Record an entry fill: fee accrues, volume counts, a position opens.
    pub fn record_entry(
        &mut self,
        entry_level: usize,
        paired_level: usize,
        side: Side,
        price: f64,
        size: f64,
        time: DateTime<Utc>,
    ) {
        self.totals.total_fees += self.fee(price, size);
        match side {
            Side::Buy => self.totals.total_buy_volume += size,
            Side::Sell => self.totals.total_sell_volume += size,
        }

        self.positions.push(GridPosition {
            entry_price: price,
            side,
            size,
            entry_time: time,
            paired_level,
            entry_level,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Total open size an exit fill at (level, side) could close
    pub fn match_available(&self, level: usize, exit_side: Side) -> f64 {
        self.positions
            .iter()
            .filter(|p| matches_exit(self.matching, p, level, exit_side))
            .map(|p| p.size)
            .sum()
    }

    /// Record an exit fill. Matching positions drain oldest-first; a fully
    /// drained position is removed and, if no partner position shares its
    /// origin key, that key is reported for lock release.
    pub fn record_exit(
        &mut self,
        level: usize,
        exit_side: Side,
        price: f64,
        size: f64,
        _time: DateTime<Utc>,
    ) -> ExitResult {
        let mut result = ExitResult::default();
        let mut remaining = size;
        let mut drained: Vec<LevelKey> = Vec::new();
        let fee_rate = self.maker_fee;
        let matching = self.matching;

        // Vec is insertion-ordered, so a forward scan is oldest-first
        for position in self.positions.iter_mut() {
            if remaining <= SIZE_EPSILON {
                break;
            }
            if !matches_exit(matching, position, level, exit_side) {
                continue;
            }

            let portion = remaining.min(position.size);
            let gross = match position.side {
                Side::Buy => (price - position.entry_price) * portion,
                Side::Sell => (position.entry_price - price) * portion,
            };
            let entry_fee = position.entry_price * portion * fee_rate;
            let exit_fee = price * portion * fee_rate;

            result.matched_size += portion;
            result.gross_pnl += gross;
            result.net_pnl += gross - entry_fee - exit_fee;

            self.totals.total_pnl += gross;
            self.totals.total_fees += exit_fee;

            position.size -= portion;
            remaining -= portion;
            if position.size <= SIZE_EPSILON {
                drained.push(position.origin());
            }
        }

        self.positions.retain(|p| p.size > SIZE_EPSILON);

        for origin in drained {
            let partners_remain = self.positions.iter().any(|p| p.origin() == origin);
            if !partners_remain && !result.released_origins.contains(&origin) {
                result.released_origins.push(origin);
            }
        }

        if result.matched_size > SIZE_EPSILON {
            self.totals.total_trades += 1;
            match exit_side {
                Side::Buy => self.totals.total_buy_volume += result.matched_size,
                Side::Sell => self.totals.total_sell_volume += result.matched_size,
            }
        }

        result.leftover = remaining;
        result
    }

    /// Record a fill with no matching tracked entry (e.g. initial inventory
    /// sold off): volume and fees count, no PnL delta.
    pub fn record_orphan(&mut self, side: Side, price: f64, size: f64) {
        self.totals.total_fees += self.fee(price, size);
        match side {
            Side::Buy => self.totals.total_buy_volume += size,
            Side::Sell => self.totals.total_sell_volume += size,
        }
    }

    pub fn open_positions(&self) -> &[GridPosition] {
        &self.positions
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    /// Signed sum of open sizes (long positive, short negative)
    pub fn net_open_size(&self) -> f64 {
        self.positions.iter().map(|p| p.signed_size()).sum()
    }

    /// Open notional at entry prices
    pub fn open_value(&self) -> f64 {
        self.positions.iter().map(|p| p.size * p.entry_price).sum()
    }

    pub fn totals(&self) -> &LedgerTotals {
        &self.totals
    }

    pub fn net_realized(&self) -> f64 {
        self.totals.total_pnl - self.totals.total_fees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ledger(matching: MatchingMode) -> PositionLedger {
        PositionLedger::new(0.001, matching)
    }

    #[test]
    fn test_entry_opens_position_and_accrues_fee() {
        let mut l = ledger(MatchingMode::Adjacent);
        l.record_entry(5, 6, Side::Buy, 100_000.0, 0.01, Utc::now());

        assert_eq!(l.open_position_count(), 1);
        assert_relative_eq!(l.totals().total_buy_volume, 0.01);
        assert_relative_eq!(l.totals().total_fees, 100_000.0 * 0.01 * 0.001);
        assert_relative_eq!(l.totals().total_pnl, 0.0);
    }

    #[test]
    fn test_adjacent_exit_realizes_pnl() {
        let mut l = ledger(MatchingMode::Adjacent);
        l.record_entry(5, 6, Side::Buy, 100_000.0, 0.01, Utc::now());

        let result = l.record_exit(6, Side::Sell, 102_000.0, 0.01, Utc::now());
        assert_relative_eq!(result.matched_size, 0.01);
        assert_relative_eq!(result.gross_pnl, 20.0);
        let fees = 100_000.0 * 0.01 * 0.001 + 102_000.0 * 0.01 * 0.001;
        assert_relative_eq!(result.net_pnl, 20.0 - fees);
        assert_relative_eq!(result.leftover, 0.0);
        assert_eq!(result.released_origins, vec![(5, Side::Buy)]);

        assert_eq!(l.open_position_count(), 0);
        assert_eq!(l.totals().total_trades, 1);
        assert_relative_eq!(l.totals().total_pnl, 20.0);
        assert_relative_eq!(l.net_realized(), 20.0 - fees);
    }

    #[test]
    fn test_adjacent_requires_matching_level() {
        let mut l = ledger(MatchingMode::Adjacent);
        l.record_entry(5, 6, Side::Buy, 100_000.0, 0.01, Utc::now());

        // Filled at level 7, but the position expects its exit at 6
        let result = l.record_exit(7, Side::Sell, 104_000.0, 0.01, Utc::now());
        assert_relative_eq!(result.matched_size, 0.0);
        assert_relative_eq!(result.leftover, 0.01);
        assert_eq!(l.open_position_count(), 1);
    }

    #[test]
    fn test_fifo_matches_any_level_oldest_first() {
        let mut l = ledger(MatchingMode::Fifo);
        l.record_entry(3, 4, Side::Buy, 96_000.0, 0.01, Utc::now());
        l.record_entry(5, 6, Side::Buy, 100_000.0, 0.01, Utc::now());

        let result = l.record_exit(9, Side::Sell, 104_000.0, 0.01, Utc::now());
        assert_relative_eq!(result.matched_size, 0.01);
        // Oldest entry (96k) closes first
        assert_relative_eq!(result.gross_pnl, (104_000.0 - 96_000.0) * 0.01);
        assert_eq!(l.open_position_count(), 1);
        assert_relative_eq!(l.open_positions()[0].entry_price, 100_000.0);
    }

    #[test]
    fn test_oldest_first_among_same_paired_level() {
        let mut l = ledger(MatchingMode::Adjacent);
        l.record_entry(5, 6, Side::Buy, 100_000.0, 0.01, Utc::now());
        l.record_entry(5, 6, Side::Buy, 99_500.0, 0.01, Utc::now());

        let result = l.record_exit(6, Side::Sell, 102_000.0, 0.01, Utc::now());
        // First inserted wins
        assert_relative_eq!(result.gross_pnl, (102_000.0 - 100_000.0) * 0.01);
        assert_eq!(l.open_position_count(), 1);
        assert_relative_eq!(l.open_positions()[0].entry_price, 99_500.0);
    }

    #[test]
    fn test_partial_exit_shrinks_position() {
        let mut l = ledger(MatchingMode::Adjacent);
        l.record_entry(5, 6, Side::Buy, 100_000.0, 0.02, Utc::now());

        let result = l.record_exit(6, Side::Sell, 101_000.0, 0.005, Utc::now());
        assert_relative_eq!(result.matched_size, 0.005);
        assert!(result.released_origins.is_empty());
        assert_eq!(l.open_position_count(), 1);
        assert_relative_eq!(l.open_positions()[0].size, 0.015);

        // Drain the rest; now the origin releases
        let result = l.record_exit(6, Side::Sell, 101_000.0, 0.015, Utc::now());
        assert_eq!(result.released_origins, vec![(5, Side::Buy)]);
        assert_eq!(l.open_position_count(), 0);
    }

    #[test]
    fn test_exit_spanning_multiple_positions() {
        let mut l = ledger(MatchingMode::Adjacent);
        l.record_entry(5, 6, Side::Buy, 100_000.0, 0.01, Utc::now());
        l.record_entry(5, 6, Side::Buy, 99_000.0, 0.01, Utc::now());

        let result = l.record_exit(6, Side::Sell, 102_000.0, 0.02, Utc::now());
        assert_relative_eq!(result.matched_size, 0.02);
        assert_relative_eq!(
            result.gross_pnl,
            (102_000.0 - 100_000.0) * 0.01 + (102_000.0 - 99_000.0) * 0.01
        );
        assert_eq!(l.open_position_count(), 0);
    }

    #[test]
    fn test_short_side_pnl_sign() {
        let mut l = ledger(MatchingMode::Adjacent);
        l.record_entry(6, 5, Side::Sell, 102_000.0, 0.01, Utc::now());

        // Price falls; closing buy realizes a profit
        let result = l.record_exit(5, Side::Buy, 100_000.0, 0.01, Utc::now());
        assert_relative_eq!(result.gross_pnl, 20.0);
        assert_eq!(result.released_origins, vec![(6, Side::Sell)]);
    }

    #[test]
    fn test_orphan_counts_volume_and_fees_only() {
        let mut l = ledger(MatchingMode::Adjacent);
        l.record_orphan(Side::Sell, 101_000.0, 0.01);

        assert_relative_eq!(l.totals().total_sell_volume, 0.01);
        assert_relative_eq!(l.totals().total_fees, 101_000.0 * 0.01 * 0.001);
        assert_relative_eq!(l.totals().total_pnl, 0.0);
        assert_eq!(l.totals().total_trades, 0);
    }

    #[test]
    fn test_match_available() {
        let mut l = ledger(MatchingMode::Adjacent);
        l.record_entry(5, 6, Side::Buy, 100_000.0, 0.01, Utc::now());
        l.record_entry(3, 4, Side::Buy, 96_000.0, 0.02, Utc::now());

        assert_relative_eq!(l.match_available(6, Side::Sell), 0.01);
        assert_relative_eq!(l.match_available(4, Side::Sell), 0.02);
        assert_relative_eq!(l.match_available(9, Side::Sell), 0.0);
        assert_relative_eq!(l.match_available(6, Side::Buy), 0.0);
    }

    #[test]
    fn test_net_open_size_signed() {
        let mut l = ledger(MatchingMode::Fifo);
        l.record_entry(5, 6, Side::Buy, 100_000.0, 0.03, Utc::now());
        l.record_entry(7, 6, Side::Sell, 104_000.0, 0.01, Utc::now());
        assert_relative_eq!(l.net_open_size(), 0.02);
    }
}
