#![allow(dead_code)]

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rebalancer::domain::candle::Candle;
use rebalancer::domain::error::RebalancerError;
use rebalancer::domain::executor::{Executor, ExecutorConfig};
use rebalancer::domain::instrument::{Instrument, InstrumentClass};
use rebalancer::domain::portfolio::{Portfolio, PortfolioPosition};
use rebalancer::domain::strategy::{OrderConfig, OrderType};
use rebalancer::domain::taxes::{MarginTaxSchedule, TaxTable};
use rebalancer::domain::universe::UniverseCriteria;
use rebalancer::ports::instrument_port::InstrumentPort;
use rebalancer::ports::price_port::PricePort;
use rebalancer::ports::score_port::{ScorePort, ScoreReply};
use rebalancer::ports::signal_port::{SignalKind, SignalPort};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

pub fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn instrument(id: &str, lot: u64) -> Instrument {
    Instrument {
        id: id.to_string(),
        ticker: id.to_string(),
        lot,
        class: InstrumentClass::Share,
        min_price_increment: 0.01,
    }
}

pub fn position(id: &str, quantity: u64, lot: u64, entry_price: f64) -> PortfolioPosition {
    PortfolioPosition {
        instrument_id: id.to_string(),
        quantity,
        lot,
        entry_price,
        class: InstrumentClass::Share,
    }
}

/// No trade taxes, no margin tax, limit exit at +`profit` / -`defence`.
pub fn untaxed_config(profit: f64, defence: f64) -> ExecutorConfig {
    ExecutorConfig {
        taxes: TaxTable::zero(),
        margin_taxes: MarginTaxSchedule::empty(),
        sell_order: OrderConfig {
            order_type: OrderType::Limit,
            profit,
            defence,
        },
    }
}

pub fn executor(
    config: ExecutorConfig,
    portfolio: &Arc<Portfolio>,
    prices: &Arc<MockPricePort>,
) -> Executor {
    Executor::new(config, portfolio.clone(), prices.clone())
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

/// Exact samples per instrument, with an optional flat fallback price.
#[derive(Default)]
pub struct MockPricePort {
    samples: HashMap<String, BTreeMap<DateTime<Utc>, f64>>,
    flat: HashMap<String, f64>,
}

impl MockPricePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, id: &str, at: DateTime<Utc>, price: f64) -> Self {
        self.samples.entry(id.to_string()).or_default().insert(at, price);
        self
    }

    /// `closes[i]` sampled at `start + i * step`.
    pub fn with_series(mut self, id: &str, start: DateTime<Utc>, step: TimeDelta, closes: &[f64]) -> Self {
        let series = self.samples.entry(id.to_string()).or_default();
        for (i, close) in closes.iter().enumerate() {
            series.insert(start + step * i as i32, *close);
        }
        self
    }

    /// `price` at every timestamp without an exact sample.
    pub fn with_flat(mut self, id: &str, price: f64) -> Self {
        self.flat.insert(id.to_string(), price);
        self
    }
}

impl PricePort for MockPricePort {
    fn price_at(&self, instrument_id: &str, ts: DateTime<Utc>) -> Option<f64> {
        self.samples
            .get(instrument_id)
            .and_then(|series| series.get(&ts).copied())
            .or_else(|| self.flat.get(instrument_id).copied())
    }

    fn candles(&self, instrument_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Candle> {
        self.samples
            .get(instrument_id)
            .map(|series| {
                series
                    .range(from..=to)
                    .map(|(ts, close)| Candle { ts: *ts, close: *close })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Instruments
// ---------------------------------------------------------------------------

pub struct MockInstrumentPort {
    pub instruments: Vec<Instrument>,
}

impl MockInstrumentPort {
    pub fn new(instruments: Vec<Instrument>) -> Self {
        Self { instruments }
    }
}

impl InstrumentPort for MockInstrumentPort {
    fn load_instruments(
        &self,
        criteria: &UniverseCriteria,
    ) -> Result<Vec<Instrument>, RebalancerError> {
        let matched: Vec<Instrument> = self
            .instruments
            .iter()
            .filter(|i| criteria.matches(i))
            .cloned()
            .collect();
        if matched.is_empty() {
            return Err(RebalancerError::NoInstruments);
        }
        Ok(matched)
    }
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

enum Scripted {
    Reply(ScoreReply),
    ById(HashMap<String, f64>),
    Fail(String),
}

/// Scripted score service. Queued steps are consumed one per call; once
/// the queue is empty every call answers from the default scores (missing
/// ids score 0).
#[derive(Default)]
pub struct MockScorePort {
    queue: Mutex<VecDeque<Scripted>>,
    default: HashMap<String, f64>,
    pub calls: Mutex<Vec<(Vec<String>, DateTime<Utc>, DateTime<Utc>)>>,
}

fn by_id(scores: &[(&str, f64)]) -> HashMap<String, f64> {
    scores.iter().map(|(id, s)| (id.to_string(), *s)).collect()
}

impl MockScorePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scores(mut self, scores: &[(&str, f64)]) -> Self {
        self.default = by_id(scores);
        self
    }

    pub fn then_scores(self, scores: &[(&str, f64)]) -> Self {
        self.push(Scripted::ById(by_id(scores)))
    }

    pub fn then_reply(self, reply: ScoreReply) -> Self {
        self.push(Scripted::Reply(reply))
    }

    pub fn then_fail(self, reason: &str) -> Self {
        self.push(Scripted::Fail(reason.to_string()))
    }

    fn push(self, step: Scripted) -> Self {
        self.queue.lock().unwrap().push_back(step);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ScorePort for MockScorePort {
    fn get_scores(
        &self,
        instrument_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ScoreReply, RebalancerError> {
        self.calls
            .lock()
            .unwrap()
            .push((instrument_ids.to_vec(), from, to));
        let answer = |scores: &HashMap<String, f64>| {
            ScoreReply::Ready(
                instrument_ids
                    .iter()
                    .map(|id| scores.get(id).copied().unwrap_or(0.0))
                    .collect(),
            )
        };
        match self.queue.lock().unwrap().pop_front() {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::ById(scores)) => Ok(answer(&scores)),
            Some(Scripted::Fail(reason)) => Err(RebalancerError::Scoring { reason }),
            None => Ok(answer(&self.default)),
        }
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Fires for the configured `(kind, id)` pairs and records every query.
#[derive(Default)]
pub struct MockSignalPort {
    firing: HashSet<(SignalKind, String)>,
    pub calls: Mutex<Vec<(SignalKind, String, DateTime<Utc>)>>,
}

impl MockSignalPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn firing(mut self, kind: SignalKind, id: &str) -> Self {
        self.firing.insert((kind, id.to_string()));
        self
    }
}

impl SignalPort for MockSignalPort {
    fn signal(
        &self,
        kind: SignalKind,
        instrument_id: &str,
        _price: f64,
        ts: DateTime<Utc>,
    ) -> Result<bool, RebalancerError> {
        self.calls
            .lock()
            .unwrap()
            .push((kind, instrument_id.to_string(), ts));
        Ok(self.firing.contains(&(kind, instrument_id.to_string())))
    }
}
