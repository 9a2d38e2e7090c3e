//! Rebalancing strategy configuration.

use crate::domain::taxes::MarginTaxSchedule;
use crate::domain::universe::UniverseCriteria;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            other => Err(format!("unknown order type: {other}")),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => f.write_str("market"),
            OrderType::Limit => f.write_str("limit"),
        }
    }
}

/// How a sell is placed: unconditionally, or as a limit with a take-profit
/// indent above and a stop ("defence") indent below the entry price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderConfig {
    pub order_type: OrderType,
    pub profit: f64,
    pub defence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrdersConfig {
    /// Holdings that stay in the top set.
    pub sell_out_profit: OrderConfig,
    /// Holdings that dropped out of the top set, indicator exits, and the
    /// default exit placed after every buy.
    pub sell_order: OrderConfig,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        OrdersConfig {
            sell_out_profit: OrderConfig {
                order_type: OrderType::Limit,
                profit: 0.05,
                defence: 0.3,
            },
            sell_order: OrderConfig {
                order_type: OrderType::Limit,
                profit: 0.0,
                defence: 0.3,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    /// Fraction of the ranked universe considered "top".
    pub top_percent: f64,
    /// Minimum score for a top-set member.
    pub top_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            top_percent: 0.2,
            top_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarginConfig {
    pub enabled: bool,
    /// Fraction of the ranked universe, counted from the bottom, eligible for shorting.
    pub top: f64,
    pub short_threshold: f64,
    pub upper_threshold: f64,
    pub short_profit: f64,
    pub hedge: f64,
    pub taxes: MarginTaxSchedule,
}

impl Default for MarginConfig {
    fn default() -> Self {
        MarginConfig {
            enabled: false,
            top: 0.1,
            short_threshold: -1500.0,
            upper_threshold: 1000.0,
            short_profit: 0.005,
            hedge: 0.05,
            taxes: MarginTaxSchedule::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Strategy {
    pub universe: UniverseCriteria,
    pub scoring: ScoringConfig,
    pub orders: OrdersConfig,
    pub margin: MarginConfig,
}
