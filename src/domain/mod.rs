//! Core domain types and simulation logic.

pub mod backtest;
pub mod bot;
pub mod cancel;
pub mod candle;
pub mod config_validation;
pub mod error;
pub mod executor;
pub mod indicator;
pub mod instrument;
pub mod intervals;
pub mod portfolio;
pub mod rebalance;
pub mod strategy;
pub mod taxes;
pub mod universe;
