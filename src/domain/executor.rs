//! Order state machine.
//!
//! The executor keeps at most one [`TrackingIntent`] per instrument and
//! advances them on every simulated tick against sampled prices. A tick runs
//! in a fixed stage order, because later stages read the cash and positions
//! left by earlier ones:
//!
//! 1. sell: close long positions (market, take-profit or stop);
//! 2. margin: open pending shorts, accrue daily margin tax, close shorts;
//! 3. snapshot: record one [`IntervalProfit`] per simulated day;
//! 4. buy: fill market buys that the remaining cash covers.
//!
//! A missing price sample skips the intent for that tick only.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use super::instrument::{Instrument, InstrumentClass};
use super::intervals::half_day_slot;
use super::portfolio::{IntervalProfit, Portfolio, PortfolioPosition};
use super::strategy::OrderConfig;
use super::taxes::{MarginTaxSchedule, TaxTable};
use crate::ports::price_port::PricePort;

/// What a tracked intent is waiting to do.
///
/// Factors are multipliers on `origin`: a long closes at
/// `origin * profit_factor` or below `origin * hedge_factor`, a short closes
/// at or below `origin * profit_factor` or above `origin * hedge_factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    /// Open a long position.
    Buy { market: bool },
    /// Close a long position.
    Sell {
        origin: f64,
        profit_factor: f64,
        hedge_factor: f64,
        market: bool,
    },
    /// Open a short at the next sampled price.
    NewShort {
        profit_factor: f64,
        hedge_factor: f64,
    },
    /// An open short; `origin` is the sale proceeds less accrued margin tax.
    Short {
        origin: f64,
        profit_factor: f64,
        hedge_factor: f64,
        market: bool,
        tax_day: NaiveDate,
    },
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Buy { .. } => "buy",
            Direction::Sell { .. } => "sell",
            Direction::NewShort { .. } => "new-short",
            Direction::Short { .. } => "short",
        }
    }

    fn stage(&self) -> Stage {
        match self {
            Direction::Buy { .. } => Stage::Buy,
            Direction::Sell { .. } => Stage::Sell,
            Direction::NewShort { .. } | Direction::Short { .. } => Stage::Margin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Sell,
    Margin,
    Buy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Long,
    Short,
}

/// A pending simulated order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingIntent {
    pub instrument_id: String,
    /// Quantity in lots.
    pub quantity: u64,
    pub lot: u64,
    pub class: InstrumentClass,
    pub direction: Direction,
}

impl TrackingIntent {
    fn shares(&self) -> f64 {
        (self.quantity * self.lot) as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub taxes: TaxTable,
    pub margin_taxes: MarginTaxSchedule,
    /// Thresholds of the exit placed right after a buy fills.
    pub sell_order: OrderConfig,
}

#[derive(Debug, Default)]
struct Book {
    intents: BTreeMap<String, TrackingIntent>,
    info: Vec<IntervalProfit>,
    last_snapshot: Option<DateTime<Utc>>,
}

pub struct Executor {
    config: ExecutorConfig,
    portfolio: Arc<Portfolio>,
    prices: Arc<dyn PricePort>,
    book: Mutex<Book>,
}

impl Executor {
    pub fn new(config: ExecutorConfig, portfolio: Arc<Portfolio>, prices: Arc<dyn PricePort>) -> Self {
        Executor {
            config,
            portfolio,
            prices,
            book: Mutex::new(Book::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advances every intent once, stage by stage.
    pub fn check(&self, ts: DateTime<Utc>) {
        let mut book = self.lock();
        for stage in [Stage::Sell, Stage::Margin] {
            book.intents
                .retain(|_, intent| intent.direction.stage() != stage || self.advance(intent, ts));
        }
        self.snapshot(&mut book, ts);
        book.intents
            .retain(|_, intent| intent.direction.stage() != Stage::Buy || self.advance(intent, ts));
    }

    /// Advances every intent once in instrument order, then snapshots.
    pub fn check_together(&self, ts: DateTime<Utc>) {
        let mut book = self.lock();
        book.intents.retain(|_, intent| self.advance(intent, ts));
        self.snapshot(&mut book, ts);
    }

    /// Recorded daily snapshots, oldest first.
    pub fn info(&self) -> Vec<IntervalProfit> {
        self.lock().info.clone()
    }

    pub fn tracked(&self, instrument_id: &str) -> Option<TrackingIntent> {
        self.lock().intents.get(instrument_id).cloned()
    }

    pub fn tracked_count(&self) -> usize {
        self.lock().intents.len()
    }

    /// Snapshot of all intents ordered by instrument id.
    pub fn intents(&self) -> Vec<TrackingIntent> {
        self.lock().intents.values().cloned().collect()
    }

    /// Places a limit exit for a held position, or retargets an existing exit.
    pub fn sell_limit(&self, profit: f64, hedge: f64, position: &PortfolioPosition) {
        let mut book = self.lock();
        match book.intents.entry(position.instrument_id.clone()) {
            Entry::Occupied(mut entry) => retarget(entry.get_mut(), Side::Long, profit, hedge),
            Entry::Vacant(entry) => {
                debug!(instrument = %position.instrument_id, profit, hedge, "limit sell placed");
                entry.insert(TrackingIntent {
                    instrument_id: position.instrument_id.clone(),
                    quantity: position.quantity,
                    lot: position.lot,
                    class: position.class,
                    direction: Direction::Sell {
                        origin: position.entry_price,
                        profit_factor: 1.0 + profit,
                        hedge_factor: 1.0 - hedge,
                        market: false,
                    },
                });
            }
        }
    }

    /// Places a market exit for a held position; rejected if already tracked.
    pub fn sell_market(&self, position: &PortfolioPosition) {
        let mut book = self.lock();
        match book.intents.entry(position.instrument_id.clone()) {
            Entry::Occupied(entry) => error!(
                instrument = %position.instrument_id,
                tracked = entry.get().direction.name(),
                "market sell rejected: instrument already tracked"
            ),
            Entry::Vacant(entry) => {
                debug!(instrument = %position.instrument_id, "market sell placed");
                entry.insert(TrackingIntent {
                    instrument_id: position.instrument_id.clone(),
                    quantity: position.quantity,
                    lot: position.lot,
                    class: position.class,
                    direction: Direction::Sell {
                        origin: position.entry_price,
                        profit_factor: 1.0,
                        hedge_factor: 1.0,
                        market: true,
                    },
                });
            }
        }
    }

    /// Requests `quantity` lots at market; repeated calls accumulate.
    pub fn buy_market(&self, quantity: u64, instrument: &Instrument) {
        if quantity == 0 {
            return;
        }
        let mut book = self.lock();
        match book.intents.entry(instrument.id.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(TrackingIntent {
                    instrument_id: instrument.id.clone(),
                    quantity,
                    lot: instrument.lot,
                    class: instrument.class,
                    direction: Direction::Buy { market: true },
                });
            }
            Entry::Occupied(mut entry) => {
                let intent = entry.get_mut();
                match intent.direction {
                    Direction::Buy { .. } => intent.quantity += quantity,
                    other => debug!(
                        instrument = %instrument.id,
                        tracked = other.name(),
                        "market buy ignored: instrument tracked in another direction"
                    ),
                }
            }
        }
    }

    /// Requests a short of `quantity` lots, or retargets a pending one.
    pub fn sell_margin(&self, quantity: u64, profit: f64, hedge: f64, instrument: &Instrument) {
        if quantity == 0 {
            return;
        }
        let mut book = self.lock();
        match book.intents.entry(instrument.id.clone()) {
            Entry::Occupied(mut entry) => retarget(entry.get_mut(), Side::Short, profit, hedge),
            Entry::Vacant(entry) => {
                info!(instrument = %instrument.id, quantity, "short requested");
                entry.insert(TrackingIntent {
                    instrument_id: instrument.id.clone(),
                    quantity,
                    lot: instrument.lot,
                    class: instrument.class,
                    direction: Direction::NewShort {
                        profit_factor: 1.0 - profit,
                        hedge_factor: 1.0 + hedge,
                    },
                });
            }
        }
    }

    /// Drops every pending buy.
    pub fn remove_buy_orders(&self) {
        self.lock()
            .intents
            .retain(|_, intent| !matches!(intent.direction, Direction::Buy { .. }));
    }

    /// Turns every pending limit sell into a market sell.
    pub fn sell_out(&self) {
        let mut book = self.lock();
        for intent in book.intents.values_mut() {
            force_market(intent);
        }
    }

    /// Liquidates: every pending sell and every held position becomes a
    /// market sell.
    pub fn sell_out_portfolio(&self) {
        let mut book = self.lock();
        for intent in book.intents.values_mut() {
            force_market(intent);
        }
        for position in self.portfolio.positions() {
            let already_selling = matches!(
                book.intents.get(&position.instrument_id).map(|i| i.direction),
                Some(Direction::Sell { .. })
            );
            if already_selling {
                continue;
            }
            if let Some(previous) = book.intents.get(&position.instrument_id) {
                warn!(
                    instrument = %position.instrument_id,
                    tracked = previous.direction.name(),
                    "held position tracked in another direction, replacing with market sell"
                );
            }
            book.intents.insert(
                position.instrument_id.clone(),
                TrackingIntent {
                    instrument_id: position.instrument_id.clone(),
                    quantity: position.quantity,
                    lot: position.lot,
                    class: position.class,
                    direction: Direction::Sell {
                        origin: position.entry_price,
                        profit_factor: 1.0,
                        hedge_factor: 1.0,
                        market: true,
                    },
                },
            );
        }
    }

    /// Closes margin exposure: unopened shorts are dropped, open shorts are
    /// bought back at market on the next tick.
    pub fn buy_debt_margin(&self) {
        let mut book = self.lock();
        book.intents
            .retain(|_, intent| !matches!(intent.direction, Direction::NewShort { .. }));
        for intent in book.intents.values_mut() {
            if let Direction::Short { market, .. } = &mut intent.direction {
                *market = true;
            }
        }
    }

    /// Runs one intent's rule; returns whether it stays tracked.
    fn advance(&self, intent: &mut TrackingIntent, ts: DateTime<Utc>) -> bool {
        let shares = intent.shares();
        let tax = self.config.taxes.rate(intent.class);
        let id = intent.instrument_id.as_str();

        match intent.direction {
            Direction::Sell {
                origin,
                profit_factor,
                hedge_factor,
                market,
            } => {
                let Some(price) = self.price(id, ts) else {
                    return true;
                };
                let proceeds = shares * price * (1.0 - tax);
                let reason = if market {
                    "market"
                } else if proceeds >= origin * profit_factor {
                    "take-profit"
                } else if proceeds < origin * hedge_factor {
                    "stop"
                } else {
                    return true;
                };
                info!(instrument = %id, %ts, price, proceeds, reason, "sell filled");
                self.portfolio.update_balance(proceeds, id);
                self.portfolio.remove_instrument(id);
                false
            }
            Direction::NewShort {
                profit_factor,
                hedge_factor,
            } => {
                let Some(price) = self.price(id, ts) else {
                    return true;
                };
                let origin = shares * price * (1.0 - tax);
                info!(instrument = %id, %ts, price, origin, "short opened");
                intent.direction = Direction::Short {
                    origin,
                    profit_factor,
                    hedge_factor,
                    market: false,
                    tax_day: ts.date_naive(),
                };
                true
            }
            Direction::Short {
                mut origin,
                profit_factor,
                hedge_factor,
                market,
                mut tax_day,
            } => {
                let day = ts.date_naive();
                if day != tax_day {
                    let margin_tax = self.config.margin_taxes.tax_for(origin);
                    origin -= margin_tax;
                    tax_day = day;
                    debug!(instrument = %id, %day, margin_tax, origin, "margin tax accrued");
                }
                intent.direction = Direction::Short {
                    origin,
                    profit_factor,
                    hedge_factor,
                    market,
                    tax_day,
                };

                let Some(price) = self.price(id, ts) else {
                    return true;
                };
                let cost = shares * price * (1.0 + tax);
                let reason = if market {
                    "market"
                } else if cost <= origin * profit_factor {
                    "take-profit"
                } else if cost > origin * hedge_factor {
                    "hedge"
                } else {
                    return true;
                };
                info!(instrument = %id, %ts, price, cost, origin, reason, "short closed");
                self.portfolio.update_balance_margin(cost, origin);
                false
            }
            Direction::Buy { market } => {
                if !market {
                    return true;
                }
                let Some(price) = self.price(id, ts) else {
                    return true;
                };
                let cost = shares * price * (1.0 + tax);
                let balance = self.portfolio.balance();
                if balance < cost {
                    debug!(instrument = %id, cost, balance, "buy pending: insufficient cash");
                    return true;
                }
                info!(instrument = %id, %ts, price, cost, quantity = intent.quantity, "buy filled");
                self.portfolio.buy(cost);
                self.portfolio.add_instrument(PortfolioPosition {
                    instrument_id: intent.instrument_id.clone(),
                    quantity: intent.quantity,
                    lot: intent.lot,
                    entry_price: cost,
                    class: intent.class,
                });
                intent.direction = Direction::Sell {
                    origin: cost,
                    profit_factor: 1.0 + self.config.sell_order.profit,
                    hedge_factor: 1.0 - self.config.sell_order.defence,
                    market: false,
                };
                true
            }
        }
    }

    fn price(&self, instrument_id: &str, ts: DateTime<Utc>) -> Option<f64> {
        let price = self.prices.price_at(instrument_id, ts);
        if price.is_none() {
            debug!(instrument = %instrument_id, %ts, "no price sample");
        }
        price
    }

    fn snapshot(&self, book: &mut Book, ts: DateTime<Utc>) {
        let slot = half_day_slot(ts);
        if slot.hour() == 0 || book.last_snapshot == Some(slot) {
            return;
        }
        book.info.push(IntervalProfit {
            balance: self.portfolio.balance_with_instruments(ts),
            profit: self.portfolio.profit(ts),
            ts: slot,
        });
        book.last_snapshot = Some(slot);
    }
}

fn retarget(intent: &mut TrackingIntent, side: Side, profit: f64, hedge: f64) {
    match (&mut intent.direction, side) {
        (
            Direction::Sell {
                profit_factor,
                hedge_factor,
                ..
            },
            Side::Long,
        ) => {
            *profit_factor = 1.0 + profit;
            *hedge_factor = 1.0 - hedge;
        }
        (
            Direction::NewShort {
                profit_factor,
                hedge_factor,
            }
            | Direction::Short {
                profit_factor,
                hedge_factor,
                ..
            },
            Side::Short,
        ) => {
            *profit_factor = 1.0 - profit;
            *hedge_factor = 1.0 + hedge;
        }
        (direction, side) => warn!(
            instrument = %intent.instrument_id,
            tracked = direction.name(),
            requested = ?side,
            "direction mismatch, thresholds left unchanged"
        ),
    }
}

fn force_market(intent: &mut TrackingIntent) {
    if let Direction::Sell { market, .. } = &mut intent.direction {
        *market = true;
    }
}
