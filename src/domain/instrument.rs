//! Instrument reference data.

use std::fmt;
use std::str::FromStr;

/// Instrument class; selects the tax rate applied on fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstrumentClass {
    Bond,
    Share,
    Currency,
    Etf,
}

impl InstrumentClass {
    pub const ALL: [InstrumentClass; 4] = [
        InstrumentClass::Bond,
        InstrumentClass::Share,
        InstrumentClass::Currency,
        InstrumentClass::Etf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentClass::Bond => "bond",
            InstrumentClass::Share => "share",
            InstrumentClass::Currency => "currency",
            InstrumentClass::Etf => "etf",
        }
    }
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bond" => Ok(InstrumentClass::Bond),
            "share" => Ok(InstrumentClass::Share),
            "currency" => Ok(InstrumentClass::Currency),
            "etf" => Ok(InstrumentClass::Etf),
            other => Err(format!("unknown instrument class: {other}")),
        }
    }
}

/// Immutable reference data for a tradable instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub id: String,
    pub ticker: String,
    /// Shares per tradable lot.
    pub lot: u64,
    pub class: InstrumentClass,
    pub min_price_increment: f64,
}

impl Instrument {
    /// Price of a single lot at `price` per share.
    pub fn lot_price(&self, price: f64) -> f64 {
        price * self.lot as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_round_trips_through_str() {
        for class in InstrumentClass::ALL {
            assert_eq!(class.as_str().parse::<InstrumentClass>(), Ok(class));
        }
    }

    #[test]
    fn class_parse_is_case_insensitive() {
        assert_eq!(" Share ".parse::<InstrumentClass>(), Ok(InstrumentClass::Share));
        assert_eq!("ETF".parse::<InstrumentClass>(), Ok(InstrumentClass::Etf));
    }

    #[test]
    fn class_parse_rejects_unknown() {
        assert!("option".parse::<InstrumentClass>().is_err());
    }

    #[test]
    fn lot_price_multiplies_by_lot() {
        let instr = Instrument {
            id: "SBER".into(),
            ticker: "SBER".into(),
            lot: 10,
            class: InstrumentClass::Share,
            min_price_increment: 0.01,
        };
        assert!((instr.lot_price(250.5) - 2505.0).abs() < f64::EPSILON);
    }
}
