//! Trading bot: turns scores into orders on the executor.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cancel::{retry_after, Attempt, CancelToken};
use super::error::RebalancerError;
use super::executor::Executor;
use super::instrument::Instrument;
use super::intervals::ceil_day;
use super::portfolio::{IntervalProfit, Portfolio, PortfolioPosition};
use super::rebalance::{allocate_round_robin, partition, rank, select_margin, select_top, Scored};
use super::strategy::{OrderConfig, OrderType, Strategy};
use crate::ports::instrument_port::InstrumentPort;
use crate::ports::price_port::PricePort;
use crate::ports::score_port::{ScorePort, ScoreReply};
use crate::ports::signal_port::{SignalKind, SignalPort};

/// How the executor is advanced on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickMode {
    /// Sell, margin, snapshot, buy.
    #[default]
    Staged,
    /// Every intent once in instrument order.
    Together,
}

impl FromStr for TickMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "staged" => Ok(TickMode::Staged),
            "together" => Ok(TickMode::Together),
            other => Err(format!("unknown tick mode: {other}")),
        }
    }
}

impl fmt::Display for TickMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickMode::Staged => f.write_str("staged"),
            TickMode::Together => f.write_str("together"),
        }
    }
}

/// What one rebalance decided.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebalanceOutcome {
    pub top: Vec<String>,
    pub sell_at_profit: Vec<String>,
    pub sell: Vec<String>,
    /// Lots requested per instrument.
    pub bought: Vec<(String, u64)>,
    pub shorted: Vec<(String, u64)>,
}

/// Collaborators the bot reads from.
#[derive(Clone)]
pub struct BotPorts {
    pub prices: Arc<dyn PricePort>,
    pub instruments: Arc<dyn InstrumentPort>,
    pub scores: Arc<dyn ScorePort>,
    pub signals: Option<Arc<dyn SignalPort>>,
}

pub struct TradingBot {
    strategy: Strategy,
    executor: Arc<Executor>,
    portfolio: Arc<Portfolio>,
    ports: BotPorts,
    tick_mode: TickMode,
    previous_scores: Option<HashMap<String, f64>>,
}

impl TradingBot {
    pub fn new(
        strategy: Strategy,
        executor: Arc<Executor>,
        portfolio: Arc<Portfolio>,
        ports: BotPorts,
    ) -> Self {
        TradingBot {
            strategy,
            executor,
            portfolio,
            ports,
            tick_mode: TickMode::default(),
            previous_scores: None,
        }
    }

    pub fn with_tick_mode(mut self, tick_mode: TickMode) -> Self {
        self.tick_mode = tick_mode;
        self
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn portfolio(&self) -> &Arc<Portfolio> {
        &self.portfolio
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn has_signals(&self) -> bool {
        self.ports.signals.is_some()
    }

    /// Re-ranks the universe over `[from, to]` and places the resulting
    /// orders. Nothing fills until the next executor check.
    pub fn rebalance(
        &mut self,
        cancel: &CancelToken,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<RebalanceOutcome, RebalancerError> {
        let (top, margin) = self.rebalanced_top(cancel, from, to)?;
        let split = partition(&top, &self.portfolio.positions());

        let so = self.strategy.orders.sell_out_profit;
        for position in &split.sell_profit {
            self.executor.sell_limit(so.profit, so.defence, position);
        }
        for position in &split.sell {
            self.place_sell(self.strategy.orders.sell_order, position);
        }
        self.executor.remove_buy_orders();

        let bought = self.buy_instruments(&split.buy, to);
        let shorted = if self.strategy.margin.enabled {
            self.margin_sell(&margin, to)
        } else {
            Vec::new()
        };

        let outcome = RebalanceOutcome {
            top: top.into_iter().map(|i| i.id).collect(),
            sell_at_profit: split.sell_profit.into_iter().map(|p| p.instrument_id).collect(),
            sell: split.sell.into_iter().map(|p| p.instrument_id).collect(),
            bought,
            shorted,
        };
        info!(
            %to,
            top = outcome.top.len(),
            sell_at_profit = outcome.sell_at_profit.len(),
            sell = outcome.sell.len(),
            buy = outcome.bought.len(),
            short = outcome.shorted.len(),
            "rebalanced"
        );
        Ok(outcome)
    }

    /// The top set and, when margin is enabled, the short candidates.
    pub fn rebalanced_top(
        &mut self,
        cancel: &CancelToken,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(Vec<Instrument>, Vec<Instrument>), RebalancerError> {
        let universe = self.ports.instruments.load_instruments(&self.strategy.universe)?;
        let balance = self.portfolio.balance();
        let candidates: Vec<Instrument> = universe
            .into_iter()
            .filter(|instrument| match self.ports.prices.price_at(&instrument.id, to) {
                Some(price) => {
                    instrument.lot_price(price) <= balance || self.portfolio.holds(&instrument.id)
                }
                None => {
                    debug!(instrument = %instrument.id, %to, "no price, left out of ranking");
                    false
                }
            })
            .collect();
        if candidates.is_empty() {
            return Err(RebalancerError::Data {
                reason: format!("no priced, affordable instruments at {to}"),
            });
        }

        let ids: Vec<String> = candidates.iter().map(|i| i.id.clone()).collect();
        let window_end = ceil_day(to);
        let scores = retry_after(cancel, || {
            Ok(match self.ports.scores.get_scores(&ids, from, window_end)? {
                ScoreReply::Ready(scores) => Attempt::Done(scores),
                ScoreReply::RetryAfter(delay) => Attempt::RetryAfter(delay),
            })
        })?;
        if scores.len() != candidates.len() {
            return Err(RebalancerError::ScoreMismatch {
                expected: candidates.len(),
                got: scores.len(),
            });
        }

        let ranked = rank(
            candidates
                .into_iter()
                .zip(scores)
                .map(|(instrument, score)| Scored { instrument, score })
                .collect(),
        );
        let top = select_top(&ranked, &self.strategy.scoring);

        let mut margin = Vec::new();
        if self.strategy.margin.enabled {
            if let Some(previous) = &self.previous_scores {
                margin = select_margin(&ranked, previous, &self.strategy.margin);
            }
            self.previous_scores = Some(
                ranked
                    .iter()
                    .map(|s| (s.instrument.id.clone(), s.score))
                    .collect(),
            );
        }
        Ok((top, margin))
    }

    /// Greedy round-robin buying with the current free cash.
    pub fn buy_instruments(&self, instruments: &[Instrument], at: DateTime<Utc>) -> Vec<(String, u64)> {
        let sized = self.size_by_balance(instruments, at);
        for (instrument, lots) in &sized {
            self.executor.buy_market(*lots, instrument);
        }
        sized
            .into_iter()
            .map(|(instrument, lots)| (instrument.id.clone(), lots))
            .collect()
    }

    /// Sizes short candidates like buys and shorts one lot fewer.
    pub fn margin_sell(&self, candidates: &[Instrument], at: DateTime<Utc>) -> Vec<(String, u64)> {
        let margin = &self.strategy.margin;
        let mut shorted = Vec::new();
        for (instrument, lots) in self.size_by_balance(candidates, at) {
            let quantity = lots.saturating_sub(1);
            if quantity == 0 {
                continue;
            }
            self.executor
                .sell_margin(quantity, margin.short_profit, margin.hedge, instrument);
            shorted.push((instrument.id.clone(), quantity));
        }
        shorted
    }

    /// Sells held positions whose indicators signal an exit.
    pub fn check_tech_indicators(&self, ts: DateTime<Utc>) {
        let Some(signals) = &self.ports.signals else {
            return;
        };
        for position in self.portfolio.positions() {
            let id = position.instrument_id.as_str();
            let Some(price) = self.ports.prices.price_at(id, ts) else {
                debug!(instrument = %id, %ts, "no price, indicators skipped");
                continue;
            };

            let mut fired = None;
            for kind in [SignalKind::EmaMacd, SignalKind::RsiBollinger] {
                match signals.signal(kind, id, price, ts) {
                    Ok(true) => {
                        fired = Some(kind);
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(instrument = %id, signal = %kind, error = %e, "signal failed");
                        break;
                    }
                }
            }

            if let Some(kind) = fired {
                info!(instrument = %id, %ts, signal = %kind, "indicator exit");
                self.place_sell(self.strategy.orders.sell_order, &position);
            }
        }
    }

    pub fn executor_check(&self, ts: DateTime<Utc>) {
        match self.tick_mode {
            TickMode::Staged => self.executor.check(ts),
            TickMode::Together => self.executor.check_together(ts),
        }
    }

    pub fn sell_out_remaining(&self) {
        self.executor.sell_out();
    }

    pub fn sell_out_portfolio(&self) {
        self.executor.remove_buy_orders();
        self.executor.sell_out_portfolio();
    }

    pub fn buy_debt_margin(&self) {
        self.executor.buy_debt_margin();
    }

    pub fn info(&self) -> Vec<IntervalProfit> {
        self.executor.info()
    }

    fn place_sell(&self, order: OrderConfig, position: &PortfolioPosition) {
        match order.order_type {
            OrderType::Market => self.executor.sell_market(position),
            OrderType::Limit => self.executor.sell_limit(order.profit, order.defence, position),
        }
    }

    fn size_by_balance<'a>(
        &self,
        instruments: &'a [Instrument],
        at: DateTime<Utc>,
    ) -> Vec<(&'a Instrument, u64)> {
        let priced: Vec<(&Instrument, f64)> = instruments
            .iter()
            .filter_map(|i| {
                let price = self.ports.prices.price_at(&i.id, at)?;
                Some((i, i.lot_price(price)))
            })
            .collect();
        let lot_prices: Vec<f64> = priced.iter().map(|(_, p)| *p).collect();
        let lots = allocate_round_robin(&lot_prices, self.portfolio.balance());
        priced
            .into_iter()
            .zip(lots)
            .filter(|(_, lots)| *lots > 0)
            .map(|((instrument, _), lots)| (instrument, lots))
            .collect()
    }
}
