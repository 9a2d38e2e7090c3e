//! Pure rebalancing decisions: ranking, top selection, holdings partition,
//! margin candidates and greedy lot allocation.

use std::collections::{HashMap, HashSet};

use super::instrument::Instrument;
use super::portfolio::PortfolioPosition;
use super::strategy::{MarginConfig, ScoringConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub instrument: Instrument,
    pub score: f64,
}

/// Sorts by score, highest first.
pub fn rank(mut scored: Vec<Scored>) -> Vec<Scored> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// The first `floor(len * top_percent)` ranked entries, minus those scoring
/// below `top_threshold`.
pub fn select_top(ranked: &[Scored], config: &ScoringConfig) -> Vec<Instrument> {
    let top_n = (ranked.len() as f64 * config.top_percent).floor() as usize;
    ranked
        .iter()
        .take(top_n)
        .filter(|s| s.score >= config.top_threshold)
        .map(|s| s.instrument.clone())
        .collect()
}

/// Short candidates among the bottom `floor(len * top)` ranked entries:
/// scored at least `upper_threshold` last time and at most
/// `short_threshold` now.
pub fn select_margin(
    ranked: &[Scored],
    previous: &HashMap<String, f64>,
    config: &MarginConfig,
) -> Vec<Instrument> {
    let bottom_n = (ranked.len() as f64 * config.top).floor() as usize;
    ranked
        .iter()
        .rev()
        .take(bottom_n)
        .filter(|s| {
            previous
                .get(&s.instrument.id)
                .is_some_and(|&before| before >= config.upper_threshold)
                && s.score <= config.short_threshold
        })
        .map(|s| s.instrument.clone())
        .collect()
}

/// Holdings and top set split into the three order groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    /// Held and still in the top set.
    pub sell_profit: Vec<PortfolioPosition>,
    /// Held but no longer in the top set.
    pub sell: Vec<PortfolioPosition>,
    /// In the top set but not held.
    pub buy: Vec<Instrument>,
}

pub fn partition(top: &[Instrument], held: &[PortfolioPosition]) -> Partition {
    let top_ids: HashSet<&str> = top.iter().map(|i| i.id.as_str()).collect();
    let held_ids: HashSet<&str> = held.iter().map(|p| p.instrument_id.as_str()).collect();

    let (sell_profit, sell) = held
        .iter()
        .cloned()
        .partition(|p| top_ids.contains(p.instrument_id.as_str()));
    let buy = top
        .iter()
        .filter(|i| !held_ids.contains(i.id.as_str()))
        .cloned()
        .collect();

    Partition {
        sell_profit,
        sell,
        buy,
    }
}

/// Round-robin one lot at a time while the running cost fits `budget`;
/// stops at the first lot that would overflow. Returns lots per entry.
///
/// Non-positive prices get no lots.
pub fn allocate_round_robin(lot_prices: &[f64], budget: f64) -> Vec<u64> {
    let mut lots = vec![0; lot_prices.len()];
    let buyable: Vec<usize> = (0..lot_prices.len())
        .filter(|&i| lot_prices[i] > 0.0)
        .collect();
    if buyable.is_empty() {
        return lots;
    }

    let mut spent = 0.0;
    'outer: loop {
        for &i in &buyable {
            if spent + lot_prices[i] > budget {
                break 'outer;
            }
            spent += lot_prices[i];
            lots[i] += 1;
        }
    }
    lots
}
