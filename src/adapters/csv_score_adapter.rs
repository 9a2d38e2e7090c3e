//! Offline scores from a `date,instrument_id,score` CSV.

use crate::domain::error::RebalancerError;
use crate::domain::intervals::parse_timestamp;
use crate::ports::score_port::{ScorePort, ScoreReply};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ScoreRow {
    date: String,
    instrument_id: String,
    score: f64,
}

/// Replays precomputed scores: for each id, the latest score dated inside
/// the requested window, 0 when there is none.
pub struct CsvScoreAdapter {
    scores: HashMap<String, Vec<(DateTime<Utc>, f64)>>,
}

impl CsvScoreAdapter {
    pub fn load(path: &Path) -> Result<Self, RebalancerError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| RebalancerError::Scoring {
                reason: format!("failed to read {}: {}", path.display(), e),
            })?;

        let mut scores: HashMap<String, Vec<(DateTime<Utc>, f64)>> = HashMap::new();
        for row in rdr.deserialize::<ScoreRow>() {
            let row = row.map_err(|e| RebalancerError::Scoring {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            let ts = parse_timestamp(&row.date).ok_or_else(|| RebalancerError::Scoring {
                reason: format!("invalid score date {:?}", row.date),
            })?;
            scores.entry(row.instrument_id).or_default().push((ts, row.score));
        }
        for series in scores.values_mut() {
            series.sort_by_key(|(ts, _)| *ts);
        }
        Ok(Self { scores })
    }

    fn latest_in(&self, id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
        self.scores
            .get(id)?
            .iter()
            .rev()
            .find(|(ts, _)| *ts >= from && *ts <= to)
            .map(|(_, score)| *score)
    }
}

impl ScorePort for CsvScoreAdapter {
    fn get_scores(
        &self,
        instrument_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ScoreReply, RebalancerError> {
        if from > to {
            return Err(RebalancerError::Scoring {
                reason: format!("invalid interval {from} .. {to}"),
            });
        }
        let scores: Vec<f64> = instrument_ids
            .iter()
            .map(|id| {
                self.latest_in(id, from, to).unwrap_or_else(|| {
                    debug!(instrument = %id, %from, %to, "no score in window");
                    0.0
                })
            })
            .collect();
        Ok(ScoreReply::Ready(scores))
    }
}
