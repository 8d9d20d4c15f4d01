//! CSV candle loading
//!
//! The engine itself never does I/O; market data arrives through this thin
//! loader before the simulation starts. Expected header:
//! `datetime,open,high,low,close,volume`.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

use crate::Candle;

/// Raw CSV row prior to candle validation
#[derive(Debug, Deserialize)]
struct CandleRow {
    datetime: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Accepts RFC 3339 timestamps or naive `YYYY-MM-DD HH:MM:SS`, taken as UTC
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = raw.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .with_context(|| format!("Unrecognized datetime: {}", raw))
}

/// Load OHLCV candles from a CSV file.
///
/// Rows that fail candle validation (inverted high/low, negative volume)
/// are skipped with a warning; rows that fail to parse at all are errors.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut candles = Vec::new();
    let mut skipped = 0usize;

    for (idx, row) in reader.deserialize::<CandleRow>().enumerate() {
        // Header occupies line 1, so data row `idx` sits on line idx + 2
        let line = idx + 2;
        let row = row.with_context(|| format!("Malformed row at line {}", line))?;
        let datetime = parse_timestamp(&row.datetime)
            .with_context(|| format!("Bad timestamp at line {}", line))?;

        match Candle::new(datetime, row.open, row.high, row.low, row.close, row.volume) {
            Ok(candle) => candles.push(candle),
            Err(err) => {
                skipped += 1;
                warn!(line, error = %err, "Skipping invalid candle");
            }
        }
    }

    if skipped > 0 {
        warn!(
            skipped,
            loaded = candles.len(),
            file = %path.display(),
            "Some rows failed candle validation"
        );
    }

    Ok(candles)
}
