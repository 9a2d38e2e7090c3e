//! Broker fees: per-class trade taxes and daily margin carrying cost.

use crate::domain::instrument::InstrumentClass;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Broker tariff presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tariff {
    Investor,
    Trader,
    Premium,
}

impl FromStr for Tariff {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "investor" => Ok(Tariff::Investor),
            "trader" => Ok(Tariff::Trader),
            "premium" => Ok(Tariff::Premium),
            other => Err(format!("unknown tariff: {other}")),
        }
    }
}

impl fmt::Display for Tariff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tariff::Investor => "investor",
            Tariff::Trader => "trader",
            Tariff::Premium => "premium",
        };
        f.write_str(name)
    }
}

/// Fraction of the trade value withheld on every fill, by instrument class.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxTable {
    rates: HashMap<InstrumentClass, f64>,
}

impl TaxTable {
    pub fn for_tariff(tariff: Tariff) -> Self {
        let (securities, currency) = match tariff {
            Tariff::Investor => (0.003, 0.009),
            Tariff::Trader => (0.0005, 0.005),
            Tariff::Premium => (0.0004, 0.004),
        };
        let rates = InstrumentClass::ALL
            .iter()
            .map(|&class| {
                let rate = if class == InstrumentClass::Currency {
                    currency
                } else {
                    securities
                };
                (class, rate)
            })
            .collect();
        Self { rates }
    }

    /// A table charging nothing on any class.
    pub fn zero() -> Self {
        Self {
            rates: InstrumentClass::ALL.iter().map(|&c| (c, 0.0)).collect(),
        }
    }

    pub fn with_rate(mut self, class: InstrumentClass, rate: f64) -> Self {
        self.rates.insert(class, rate);
        self
    }

    pub fn rate(&self, class: InstrumentClass) -> f64 {
        self.rates.get(&class).copied().unwrap_or(0.0)
    }
}

impl Default for TaxTable {
    fn default() -> Self {
        Self::for_tariff(Tariff::Investor)
    }
}

/// Daily carrying cost of an open short, bracketed by position value.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginTaxSchedule {
    /// `(upper_bound, daily_tax)`, sorted by bound ascending.
    brackets: Vec<(f64, f64)>,
}

impl MarginTaxSchedule {
    pub fn new(mut brackets: Vec<(f64, f64)>) -> Self {
        brackets.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { brackets }
    }

    pub fn empty() -> Self {
        Self {
            brackets: Vec::new(),
        }
    }

    /// Tax of the first bracket whose bound exceeds `value`; zero past the
    /// last bracket.
    pub fn tax_for(&self, value: f64) -> f64 {
        self.brackets
            .iter()
            .find(|(bound, _)| value < *bound)
            .map(|(_, tax)| *tax)
            .unwrap_or(0.0)
    }

    pub fn brackets(&self) -> &[(f64, f64)] {
        &self.brackets
    }
}

impl Default for MarginTaxSchedule {
    fn default() -> Self {
        Self::new(vec![
            (5_000.0, 0.0),
            (50_000.0, 25.0),
            (100_000.0, 45.0),
            (500_000.0, 225.0),
            (1_000_000.0, 450.0),
            (2_000_000.0, 900.0),
            (5_000_000.0, 2_250.0),
        ])
    }
}

/// Parses `bound:tax` pairs separated by commas, e.g. `5000:0, 50000:25`.
pub fn parse_margin_taxes(input: &str) -> Result<MarginTaxSchedule, String> {
    let mut brackets = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (bound, tax) = token
            .split_once(':')
            .ok_or_else(|| format!("expected bound:tax, got {token:?}"))?;
        let bound: f64 = bound
            .trim()
            .parse()
            .map_err(|e| format!("invalid bound {bound:?}: {e}"))?;
        let tax: f64 = tax
            .trim()
            .parse()
            .map_err(|e| format!("invalid tax {tax:?}: {e}"))?;
        if bound <= 0.0 || tax < 0.0 {
            return Err(format!("bracket {token:?} must have positive bound and non-negative tax"));
        }
        brackets.push((bound, tax));
    }
    Ok(MarginTaxSchedule::new(brackets))
}
