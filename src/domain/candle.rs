//! Hourly close-price candle.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub close: f64,
}

/// Last candle of every calendar day, in order. Input must be sorted by `ts`.
pub fn daily_closes(candles: &[Candle]) -> Vec<Candle> {
    let mut daily: Vec<Candle> = Vec::new();
    for candle in candles {
        match daily.last_mut() {
            Some(last) if last.ts.date_naive() == candle.ts.date_naive() => *last = *candle,
            _ => daily.push(*candle),
        }
    }
    daily
}
