//! Historical price source.

use crate::domain::candle::Candle;
use chrono::{DateTime, Utc};

/// Sampled candle data keyed by instrument and timestamp.
///
/// Gaps are normal (nights, weekends, halted instruments): callers treat a
/// missing sample as "try again next tick", never as a failure.
pub trait PricePort: Send + Sync {
    /// Close price per share at `ts`, if sampled.
    fn price_at(&self, instrument_id: &str, ts: DateTime<Utc>) -> Option<f64>;

    /// Candles with `from <= ts <= to`, sorted by time.
    fn candles(&self, instrument_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Candle>;
}
