//! Portfolio ledger: free cash and held positions.
//!
//! Positions are valued at the cash paid for them (`entry_price`), never
//! marked to market. Every operation takes the ledger lock for the duration
//! of the call only.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use super::instrument::InstrumentClass;

/// A held long position.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioPosition {
    pub instrument_id: String,
    /// Quantity in lots.
    pub quantity: u64,
    /// Shares per lot.
    pub lot: u64,
    /// Cash paid for the whole position, taxes included.
    pub entry_price: f64,
    pub class: InstrumentClass,
}

/// Balance snapshot appended to the reporting series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalProfit {
    pub balance: f64,
    /// Percent relative to starting cash.
    pub profit: f64,
    pub ts: DateTime<Utc>,
}

#[derive(Debug)]
struct Ledger {
    balance: f64,
    positions: BTreeMap<String, PortfolioPosition>,
}

#[derive(Debug)]
pub struct Portfolio {
    starting_cash: f64,
    ledger: Mutex<Ledger>,
}

impl Portfolio {
    pub fn new(starting_cash: f64) -> Self {
        Portfolio {
            starting_cash,
            ledger: Mutex::new(Ledger {
                balance: starting_cash,
                positions: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn starting_cash(&self) -> f64 {
        self.starting_cash
    }

    /// Free cash.
    pub fn balance(&self) -> f64 {
        self.lock().balance
    }

    /// Cash plus recorded entry prices of every held position.
    ///
    /// `_at` is accepted for symmetry with a mark-to-market valuation; the
    /// ledger never reprices positions.
    pub fn balance_with_instruments(&self, _at: DateTime<Utc>) -> f64 {
        let ledger = self.lock();
        ledger.balance
            + ledger
                .positions
                .values()
                .map(|p| p.entry_price)
                .sum::<f64>()
    }

    /// Percent change of [`Self::balance_with_instruments`] against starting cash.
    pub fn profit(&self, at: DateTime<Utc>) -> f64 {
        let total = self.balance_with_instruments(at);
        (total - self.starting_cash) / self.starting_cash * 100.0
    }

    /// Inserts `position` unless its instrument is already held.
    pub fn add_instrument(&self, position: PortfolioPosition) {
        self.lock()
            .positions
            .entry(position.instrument_id.clone())
            .or_insert(position);
    }

    pub fn remove_instrument(&self, instrument_id: &str) -> Option<PortfolioPosition> {
        self.lock().positions.remove(instrument_id)
    }

    /// Credits sale proceeds of `instrument_id`.
    pub fn update_balance(&self, amount: f64, instrument_id: &str) {
        let mut ledger = self.lock();
        ledger.balance += amount;
        match ledger.positions.get(instrument_id) {
            Some(position) => {
                let profit = (amount - position.entry_price) / position.entry_price * 100.0;
                info!(
                    instrument = %instrument_id,
                    proceeds = amount,
                    entry_price = position.entry_price,
                    profit_pct = profit,
                    "position sold"
                );
            }
            None => warn!(
                instrument = %instrument_id,
                proceeds = amount,
                "proceeds credited for an instrument not in the portfolio"
            ),
        }
    }

    /// Settles a short: credits `open_price - close_price`.
    pub fn update_balance_margin(&self, close_price: f64, open_price: f64) {
        let mut ledger = self.lock();
        ledger.balance += open_price - close_price;
        info!(
            open = open_price,
            close = close_price,
            result = open_price - close_price,
            "short settled"
        );
    }

    /// Debits `amount`; sufficiency is the caller's concern.
    pub fn buy(&self, amount: f64) {
        self.lock().balance -= amount;
    }

    pub fn holds(&self, instrument_id: &str) -> bool {
        self.lock().positions.contains_key(instrument_id)
    }

    pub fn position(&self, instrument_id: &str) -> Option<PortfolioPosition> {
        self.lock().positions.get(instrument_id).cloned()
    }

    /// Snapshot of held positions ordered by instrument id.
    pub fn positions(&self) -> Vec<PortfolioPosition> {
        self.lock().positions.values().cloned().collect()
    }

    pub fn position_count(&self) -> usize {
        self.lock().positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn position(id: &str, entry_price: f64) -> PortfolioPosition {
        PortfolioPosition {
            instrument_id: id.to_string(),
            quantity: 1,
            lot: 1,
            entry_price,
            class: InstrumentClass::Share,
        }
    }

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(100_000.0);
        assert!((portfolio.balance() - 100_000.0).abs() < f64::EPSILON);
        assert!((portfolio.starting_cash() - 100_000.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.position_count(), 0);
        assert_eq!(portfolio.profit(now()), 0.0);
    }

    #[test]
    fn add_instrument_ignores_duplicates() {
        let portfolio = Portfolio::new(1_000.0);
        portfolio.add_instrument(position("A", 100.0));
        portfolio.add_instrument(position("A", 999.0));

        assert_eq!(portfolio.position_count(), 1);
        assert!((portfolio.position("A").unwrap().entry_price - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn remove_instrument() {
        let portfolio = Portfolio::new(1_000.0);
        portfolio.add_instrument(position("A", 100.0));

        assert!(portfolio.remove_instrument("A").is_some());
        assert!(!portfolio.holds("A"));
        assert!(portfolio.remove_instrument("A").is_none());
    }

    #[test]
    fn valuation_uses_entry_prices() {
        let portfolio = Portfolio::new(1_000.0);
        portfolio.buy(300.0);
        portfolio.add_instrument(position("A", 100.0));
        portfolio.add_instrument(position("B", 200.0));

        assert!((portfolio.balance() - 700.0).abs() < f64::EPSILON);
        assert!((portfolio.balance_with_instruments(now()) - 1_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn profit_percent() {
        let portfolio = Portfolio::new(1_000.0);
        portfolio.update_balance(100.0, "A");
        assert!((portfolio.profit(now()) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn update_balance_credits_known_and_unknown() {
        let portfolio = Portfolio::new(0.0);
        portfolio.add_instrument(position("A", 100.0));
        portfolio.update_balance(110.0, "A");
        portfolio.update_balance(5.0, "ghost");
        assert!((portfolio.balance() - 115.0).abs() < f64::EPSILON);
    }

    #[test]
    fn update_balance_margin_credits_difference() {
        let portfolio = Portfolio::new(1_000.0);
        portfolio.update_balance_margin(90.0, 100.0);
        assert!((portfolio.balance() - 1_010.0).abs() < f64::EPSILON);

        portfolio.update_balance_margin(120.0, 100.0);
        assert!((portfolio.balance() - 990.0).abs() < f64::EPSILON);
    }

    #[test]
    fn buy_can_overdraw() {
        let portfolio = Portfolio::new(10.0);
        portfolio.buy(15.0);
        assert!((portfolio.balance() + 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn positions_are_sorted_by_id() {
        let portfolio = Portfolio::new(1_000.0);
        portfolio.add_instrument(position("C", 1.0));
        portfolio.add_instrument(position("A", 1.0));
        portfolio.add_instrument(position("B", 1.0));

        let ids: Vec<_> = portfolio
            .positions()
            .into_iter()
            .map(|p| p.instrument_id)
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }
}
