//! Weekly backtest driver.
//!
//! Walks the simulated clock week by week and hour by hour, calling the bot
//! on its schedule: a weekly liquidation slot, a weekly rebalance slot, daily
//! indicator checks and an executor check on every weekday hour.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use tracing::{error, info};

use super::bot::{TickMode, TradingBot};
use super::cancel::CancelToken;
use super::error::RebalancerError;
use super::intervals::{divide_into_hours, is_weekend, split_into_weeks};
use super::portfolio::{IntervalProfit, PortfolioPosition};

/// A weekly hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub weekday: Weekday,
    pub hour: u32,
}

impl Slot {
    pub fn matches(&self, ts: DateTime<Utc>) -> bool {
        ts.weekday() == self.weekday && ts.hour() == self.hour
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub rebalance: Slot,
    pub liquidation: Slot,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            rebalance: Slot {
                weekday: Weekday::Fri,
                hour: 20,
            },
            liquidation: Slot {
                weekday: Weekday::Thu,
                hour: 0,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_capital: f64,
    pub tick_mode: TickMode,
    pub schedule: Schedule,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub starting_cash: f64,
    /// One record per week interval plus a closing record.
    pub weekly: Vec<IntervalProfit>,
    /// The executor's daily snapshots.
    pub daily: Vec<IntervalProfit>,
    pub final_balance: f64,
    pub final_profit: f64,
    pub rebalances: usize,
    pub remaining: Vec<PortfolioPosition>,
}

pub fn run_backtest(
    bot: &mut TradingBot,
    config: &BacktestConfig,
    cancel: &CancelToken,
) -> Result<BacktestResult, RebalancerError> {
    let intervals = split_into_weeks(config.start, config.end);
    let margin = bot.strategy().margin.enabled;
    let signals = bot.has_signals();
    let schedule = config.schedule;

    let mut weekly = Vec::with_capacity(intervals.len() + 1);
    let mut rebalances = 0;

    info!(
        start = %config.start,
        end = %config.end,
        weeks = intervals.len(),
        "backtest started"
    );

    for (index, interval) in intervals.iter().enumerate() {
        let last = index + 1 == intervals.len();
        let portfolio = bot.portfolio();
        weekly.push(IntervalProfit {
            balance: portfolio.balance(),
            profit: portfolio.profit(interval.start),
            ts: interval.start,
        });

        for hour in divide_into_hours(interval.start, interval.end) {
            if is_weekend(hour) {
                continue;
            }

            if schedule.liquidation.matches(hour) {
                if margin {
                    bot.buy_debt_margin();
                }
                bot.sell_out_remaining();
                if last {
                    bot.sell_out_portfolio();
                }
            }

            if !last && schedule.rebalance.matches(hour) {
                match bot.rebalance(cancel, interval.start, hour) {
                    Ok(_) => rebalances += 1,
                    Err(RebalancerError::Cancelled) => return Err(RebalancerError::Cancelled),
                    Err(e) => error!(%hour, error = %e, "rebalance failed"),
                }
                continue;
            }

            if signals && hour.hour() == 0 {
                bot.check_tech_indicators(hour);
            }

            bot.executor_check(hour);
        }

        if cancel.is_cancelled() {
            info!(week = index, "backtest cancelled");
            return Err(RebalancerError::Cancelled);
        }
    }

    let portfolio = bot.portfolio();
    let closed_at = intervals.last().map_or(config.end, |i| i.end);
    let final_balance = portfolio.balance();
    let final_profit = portfolio.profit(closed_at);
    if !intervals.is_empty() {
        weekly.push(IntervalProfit {
            balance: final_balance,
            profit: final_profit,
            ts: closed_at,
        });
    }

    info!(final_balance, final_profit, rebalances, "backtest finished");

    Ok(BacktestResult {
        starting_cash: portfolio.starting_cash(),
        weekly,
        daily: bot.info(),
        final_balance,
        final_profit,
        rebalances,
        remaining: portfolio.positions(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_schedule() {
        let s = Schedule::default();
        assert_eq!(s.rebalance.weekday, Weekday::Fri);
        assert_eq!(s.rebalance.hour, 20);
        assert_eq!(s.liquidation.weekday, Weekday::Thu);
        assert_eq!(s.liquidation.hour, 0);
    }

    #[test]
    fn slot_matches_weekday_and_hour() {
        let slot = Schedule::default().rebalance;
        // 2024-01-05 is a Friday
        assert!(slot.matches(Utc.with_ymd_and_hms(2024, 1, 5, 20, 0, 0).unwrap()));
        assert!(!slot.matches(Utc.with_ymd_and_hms(2024, 1, 5, 21, 0, 0).unwrap()));
        assert!(!slot.matches(Utc.with_ymd_and_hms(2024, 1, 4, 20, 0, 0).unwrap()));
    }
}
