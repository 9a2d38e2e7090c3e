//! Technical-indicator sell signals.

use crate::domain::error::RebalancerError;
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Slow EMA above fast EMA while the MACD line is negative.
    EmaMacd,
    /// RSI overbought while price is above the upper Bollinger band.
    RsiBollinger,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::EmaMacd => f.write_str("EMA/MACD"),
            SignalKind::RsiBollinger => f.write_str("RSI/BB"),
        }
    }
}

pub trait SignalPort: Send + Sync {
    /// Whether `kind` signals an exit for `instrument_id` at `ts`.
    fn signal(
        &self,
        kind: SignalKind,
        instrument_id: &str,
        price: f64,
        ts: DateTime<Utc>,
    ) -> Result<bool, RebalancerError>;
}
