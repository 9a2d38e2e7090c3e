//! Configuration validation.
//!
//! Validates every section before the backtest runs, and exposes the typed
//! readers the CLI builds its configuration with, so both agree on formats.

use crate::domain::bot::TickMode;
use crate::domain::error::RebalancerError;
use crate::domain::intervals::parse_timestamp;
use crate::domain::strategy::OrderType;
use crate::domain::taxes::{parse_margin_taxes, Tariff};
use crate::domain::universe::{parse_classes, parse_ids, UniverseCriteria};
use crate::ports::config_port::ConfigPort;
use chrono::{DateTime, Utc, Weekday};
use std::fmt::Display;
use std::str::FromStr;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    validate_backtest(config)?;
    validate_schedule(config)?;
    read_universe(config)?;
    validate_scoring(config)?;
    validate_orders(config)?;
    validate_margin(config)?;
    validate_indicators(config)?;
    validate_data(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> RebalancerError {
    RebalancerError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> RebalancerError {
    RebalancerError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

pub fn read_timestamp(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<DateTime<Utc>, RebalancerError> {
    let raw = config
        .get_string(section, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| missing(section, key))?;
    parse_timestamp(&raw)
        .ok_or_else(|| invalid(section, key, "expected YYYY-MM-DD or RFC 3339 timestamp"))
}

/// Parses an optional key, falling back to `default` when absent.
pub fn read_parsed<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, RebalancerError>
where
    T: FromStr,
    T::Err: Display,
{
    match config.get_string(section, key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(section, key, e.to_string())),
        _ => Ok(default),
    }
}

/// Reads an integer key and converts it to `T`, rejecting out-of-range values.
pub fn read_int_as<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<T, RebalancerError>
where
    T: TryFrom<i64>,
{
    let value = config.get_int(section, key, default);
    T::try_from(value).map_err(|_| invalid(section, key, format!("{value} is out of range")))
}

pub fn read_required(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, RebalancerError> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing(section, key))
}

/// `[universe] ids` and `classes`; at least one must select something.
pub fn read_universe(config: &dyn ConfigPort) -> Result<UniverseCriteria, RebalancerError> {
    let mut criteria = UniverseCriteria::default();
    if let Some(ids) = config.get_string("universe", "ids").filter(|s| !s.trim().is_empty()) {
        criteria.ids = parse_ids(&ids).map_err(|e| invalid("universe", "ids", e.to_string()))?;
    }
    if let Some(classes) = config
        .get_string("universe", "classes")
        .filter(|s| !s.trim().is_empty())
    {
        criteria.classes =
            parse_classes(&classes).map_err(|e| invalid("universe", "classes", e.to_string()))?;
    }
    if criteria.is_empty() {
        return Err(missing("universe", "ids"));
    }
    Ok(criteria)
}

fn fraction(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, RebalancerError> {
    let value = config.get_double(section, key, default);
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(section, key, format!("{key} must be between 0 and 1")));
    }
    Ok(value)
}

fn non_negative(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, RebalancerError> {
    let value = config.get_double(section, key, default);
    if value < 0.0 {
        return Err(invalid(section, key, format!("{key} must be non-negative")));
    }
    Ok(value)
}

fn positive_period(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, RebalancerError> {
    let value = config.get_int(section, key, default);
    if value < 1 {
        return Err(invalid(section, key, format!("{key} must be at least 1")));
    }
    Ok(value)
}

fn validate_backtest(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    let start = read_timestamp(config, "backtest", "start_date")?;
    let end = read_timestamp(config, "backtest", "end_date")?;
    if start > end {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must not be after end_date",
        ));
    }

    let capital = config.get_double("backtest", "initial_capital", 100_000.0);
    if capital <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }

    read_parsed(config, "backtest", "tick_mode", TickMode::Staged)?;
    read_parsed(config, "backtest", "tariff", Tariff::Investor)?;
    for key in ["tax_bond", "tax_share", "tax_currency", "tax_etf"] {
        fraction(config, "backtest", key, 0.0)?;
    }
    Ok(())
}

fn validate_schedule(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    read_parsed(config, "schedule", "rebalance_weekday", Weekday::Fri)?;
    read_parsed(config, "schedule", "liquidation_weekday", Weekday::Thu)?;
    for (key, default) in [("rebalance_hour", 20), ("liquidation_hour", 0)] {
        let hour = config.get_int("schedule", key, default);
        if !(0..=23).contains(&hour) {
            return Err(invalid("schedule", key, format!("{key} must be between 0 and 23")));
        }
    }
    Ok(())
}

fn validate_scoring(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    let source = config
        .get_string("scoring", "source")
        .unwrap_or_else(|| "http".to_string());
    match source.trim().to_lowercase().as_str() {
        "http" => {
            read_required(config, "scoring", "address")?;
        }
        "csv" => {
            read_required(config, "scoring", "scores_file")?;
        }
        other => {
            return Err(invalid(
                "scoring",
                "source",
                format!("unknown score source: {other}"),
            ))
        }
    }

    fraction(config, "scoring", "top_percent", 0.2)?;
    fraction(config, "scoring", "alpha", 0.05)?;
    fraction(config, "scoring", "p_value", 0.05)?;
    if config.get_int("scoring", "timeout_secs", 60) < 1 {
        return Err(invalid(
            "scoring",
            "timeout_secs",
            "timeout_secs must be at least 1",
        ));
    }
    Ok(())
}

fn validate_orders(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    for prefix in ["sell_out_profit", "sell_order"] {
        read_parsed(config, "orders", &format!("{prefix}_type"), OrderType::Limit)?;
        non_negative(config, "orders", &format!("{prefix}_profit"), 0.0)?;
        fraction(config, "orders", &format!("{prefix}_defence"), 0.3)?;
    }
    Ok(())
}

fn validate_margin(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    if !config.get_bool("margin", "enabled", false) {
        return Ok(());
    }
    fraction(config, "margin", "top", 0.1)?;
    fraction(config, "margin", "short_profit", 0.005)?;
    non_negative(config, "margin", "hedge", 0.05)?;

    let short = config.get_double("margin", "short_threshold", -1500.0);
    let upper = config.get_double("margin", "upper_threshold", 1000.0);
    if short >= upper {
        return Err(invalid(
            "margin",
            "short_threshold",
            "short_threshold must be below upper_threshold",
        ));
    }

    if let Some(taxes) = config.get_string("margin", "taxes") {
        parse_margin_taxes(&taxes).map_err(|e| invalid("margin", "taxes", e))?;
    }
    Ok(())
}

fn validate_indicators(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    if !config.get_bool("indicators", "enabled", true) {
        return Ok(());
    }
    for (key, default) in [
        ("rsi_period", 336),
        ("bollinger_period", 336),
        ("ema_fast", 20),
        ("ema_slow", 50),
        ("macd_fast", 12),
        ("macd_slow", 26),
        ("macd_signal", 9),
    ] {
        positive_period(config, "indicators", key, default)?;
    }

    if config.get_int("indicators", "ema_fast", 20) >= config.get_int("indicators", "ema_slow", 50) {
        return Err(invalid("indicators", "ema_fast", "ema_fast must be below ema_slow"));
    }
    if config.get_int("indicators", "macd_fast", 12) >= config.get_int("indicators", "macd_slow", 26)
    {
        return Err(invalid(
            "indicators",
            "macd_fast",
            "macd_fast must be below macd_slow",
        ));
    }

    let lower = config.get_double("indicators", "rsi_lower", 30.0);
    let upper = config.get_double("indicators", "rsi_upper", 70.0);
    if !(0.0..=100.0).contains(&lower) || !(0.0..=100.0).contains(&upper) || lower >= upper {
        return Err(invalid(
            "indicators",
            "rsi_upper",
            "rsi bounds must satisfy 0 <= rsi_lower < rsi_upper <= 100",
        ));
    }
    non_negative(config, "indicators", "bollinger_deviation", 2.0)?;
    Ok(())
}

fn validate_data(config: &dyn ConfigPort) -> Result<(), RebalancerError> {
    read_required(config, "data", "candles_dir")?;
    read_required(config, "data", "instruments_file")?;
    Ok(())
}
