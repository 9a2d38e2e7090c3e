//! Exit signals computed locally from candle history.

use crate::domain::candle::{daily_closes, Candle};
use crate::domain::error::RebalancerError;
use crate::domain::indicator::{
    calculate_bollinger, calculate_ema, calculate_macd, calculate_rsi, IndicatorSeries,
    IndicatorValue,
};
use crate::domain::intervals::start_of_day;
use crate::ports::price_port::PricePort;
use crate::ports::signal_port::{SignalKind, SignalPort};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::sync::Arc;
use tracing::debug;

/// Indicator parameters. RSI and Bollinger run on hourly closes, EMA and
/// MACD on daily closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSettings {
    pub rsi_period: usize,
    pub rsi_lower: f64,
    pub rsi_upper: f64,
    pub bollinger_period: usize,
    pub bollinger_deviation: f64,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        IndicatorSettings {
            rsi_period: 14 * 24,
            rsi_lower: 30.0,
            rsi_upper: 70.0,
            bollinger_period: 14 * 24,
            bollinger_deviation: 2.0,
            ema_fast: 20,
            ema_slow: 50,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl IndicatorSettings {
    /// Hours of history fetched for the hourly indicators; padded for
    /// nights and weekends without candles.
    fn hourly_lookback(&self) -> TimeDelta {
        let needed = (self.rsi_period + 1).max(self.bollinger_period);
        TimeDelta::hours(needed as i64 * 3 + 72)
    }

    /// Days of history fetched for the daily indicators.
    fn daily_lookback(&self) -> TimeDelta {
        let needed = self
            .ema_slow
            .max(self.ema_fast)
            .max(self.macd_slow.max(self.macd_fast) + self.macd_signal);
        TimeDelta::days(needed as i64 * 2 + 7)
    }
}

pub struct IndicatorSignalAdapter {
    prices: Arc<dyn PricePort>,
    settings: IndicatorSettings,
}

impl IndicatorSignalAdapter {
    pub fn new(prices: Arc<dyn PricePort>, settings: IndicatorSettings) -> Self {
        Self { prices, settings }
    }

    /// History up to `ts`, or `None` when the latest candle is not from
    /// `ts`'s hour.
    fn history(&self, id: &str, ts: DateTime<Utc>, lookback: TimeDelta) -> Option<Vec<Candle>> {
        let candles = self.prices.candles(id, ts - lookback, ts);
        let hour = ts.duration_trunc(TimeDelta::hours(1)).ok()?;
        match candles.last() {
            Some(last) if last.ts >= hour => Some(candles),
            _ => {
                debug!(instrument = %id, %ts, "no candle for the signal hour");
                None
            }
        }
    }

    fn ema_macd(&self, id: &str, ts: DateTime<Utc>) -> bool {
        let s = &self.settings;
        let Some(candles) = self.history(id, ts, s.daily_lookback()) else {
            return false;
        };
        let daily = daily_closes(&candles);

        let fast = last_simple(&calculate_ema(&daily, s.ema_fast));
        let slow = last_simple(&calculate_ema(&daily, s.ema_slow));
        let macd = calculate_macd(&daily, s.macd_fast, s.macd_slow, s.macd_signal);
        let line = match macd.last_valid().map(|p| p.value) {
            Some(IndicatorValue::Macd { line, .. }) => Some(line),
            _ => None,
        };

        match (fast, slow, line) {
            (Some(fast), Some(slow), Some(line)) => {
                debug!(
                    instrument = %id,
                    day = %start_of_day(ts),
                    ema_fast = fast,
                    ema_slow = slow,
                    macd = line,
                    "EMA/MACD"
                );
                slow > fast && line < 0.0
            }
            _ => false,
        }
    }

    fn rsi_bollinger(&self, id: &str, price: f64, ts: DateTime<Utc>) -> bool {
        let s = &self.settings;
        let Some(candles) = self.history(id, ts, s.hourly_lookback()) else {
            return false;
        };

        let rsi = last_simple(&calculate_rsi(&candles, s.rsi_period));
        let mult_x100 = (s.bollinger_deviation * 100.0).round() as u32;
        let bands = calculate_bollinger(&candles, s.bollinger_period, mult_x100);
        let upper = match bands.last_valid().map(|p| p.value) {
            Some(IndicatorValue::Bollinger { upper, .. }) => Some(upper),
            _ => None,
        };

        match (rsi, upper) {
            (Some(rsi), Some(upper)) => {
                debug!(instrument = %id, %ts, rsi, bollinger_upper = upper, price, "RSI/BB");
                rsi > s.rsi_upper && price > upper
            }
            _ => false,
        }
    }
}

fn last_simple(series: &IndicatorSeries) -> Option<f64> {
    match series.last_valid()?.value {
        IndicatorValue::Simple(v) => Some(v),
        _ => None,
    }
}

impl SignalPort for IndicatorSignalAdapter {
    fn signal(
        &self,
        kind: SignalKind,
        instrument_id: &str,
        price: f64,
        ts: DateTime<Utc>,
    ) -> Result<bool, RebalancerError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(RebalancerError::Signal {
                instrument: instrument_id.to_string(),
                reason: format!("invalid price {price}"),
            });
        }
        Ok(match kind {
            SignalKind::EmaMacd => self.ema_macd(instrument_id, ts),
            SignalKind::RsiBollinger => self.rsi_bollinger(instrument_id, price, ts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::csv_adapter::CsvCandleAdapter;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn small() -> IndicatorSettings {
        IndicatorSettings {
            rsi_period: 5,
            rsi_lower: 30.0,
            rsi_upper: 70.0,
            bollinger_period: 5,
            bollinger_deviation: 2.0,
            ema_fast: 3,
            ema_slow: 6,
            macd_fast: 3,
            macd_slow: 6,
            macd_signal: 3,
        }
    }

    fn adapter(step: TimeDelta, closes: impl Iterator<Item = f64>) -> (IndicatorSignalAdapter, DateTime<Utc>) {
        let candles: Vec<Candle> = closes
            .enumerate()
            .map(|(i, close)| Candle {
                ts: start() + step * i as i32,
                close,
            })
            .collect();
        let last = candles.last().map(|c| c.ts).unwrap();
        let prices = CsvCandleAdapter::from_candles(HashMap::from([("A".to_string(), candles)]));
        (IndicatorSignalAdapter::new(Arc::new(prices), small()), last)
    }

    #[test]
    fn default_settings() {
        let s = IndicatorSettings::default();
        assert_eq!(s.rsi_period, 336);
        assert_eq!(s.bollinger_period, 336);
        assert_eq!((s.ema_fast, s.ema_slow), (20, 50));
        assert_eq!((s.macd_fast, s.macd_slow, s.macd_signal), (12, 26, 9));
    }

    #[test]
    fn falling_daily_closes_signal_ema_macd() {
        let (adapter, last) = adapter(TimeDelta::days(1), (0..30).map(|i| 200.0 - i as f64 * 3.0));
        assert!(adapter.signal(SignalKind::EmaMacd, "A", 113.0, last).unwrap());
    }

    #[test]
    fn rising_daily_closes_do_not_signal() {
        let (adapter, last) = adapter(TimeDelta::days(1), (0..30).map(|i| 100.0 + i as f64 * 3.0));
        assert!(!adapter.signal(SignalKind::EmaMacd, "A", 187.0, last).unwrap());
    }

    #[test]
    fn overbought_above_band_signals_rsi_bollinger() {
        let (adapter, last) = adapter(TimeDelta::hours(1), (0..30).map(|i| 100.0 + i as f64));
        // all gains: RSI 100; price well above the upper band
        assert!(adapter.signal(SignalKind::RsiBollinger, "A", 500.0, last).unwrap());
        // inside the band
        assert!(!adapter.signal(SignalKind::RsiBollinger, "A", 127.0, last).unwrap());
    }

    #[test]
    fn stale_history_never_signals() {
        let (adapter, last) = adapter(TimeDelta::hours(1), (0..30).map(|i| 100.0 + i as f64));
        let later = last + TimeDelta::hours(2);
        assert!(!adapter.signal(SignalKind::RsiBollinger, "A", 500.0, later).unwrap());
    }

    #[test]
    fn warming_up_never_signals() {
        let (adapter, last) = adapter(TimeDelta::hours(1), (0..3).map(|i| 100.0 + i as f64));
        assert!(!adapter.signal(SignalKind::RsiBollinger, "A", 500.0, last).unwrap());
        assert!(!adapter.signal(SignalKind::EmaMacd, "A", 500.0, last).unwrap());
    }

    #[test]
    fn unknown_instrument_never_signals() {
        let (adapter, last) = adapter(TimeDelta::hours(1), (0..30).map(|i| 100.0 + i as f64));
        assert!(!adapter.signal(SignalKind::EmaMacd, "B", 100.0, last).unwrap());
    }

    #[test]
    fn invalid_price_is_an_error() {
        let (adapter, last) = adapter(TimeDelta::hours(1), (0..30).map(|i| 100.0 + i as f64));
        assert!(matches!(
            adapter.signal(SignalKind::EmaMacd, "A", f64::NAN, last),
            Err(RebalancerError::Signal { .. })
        ));
    }
}
