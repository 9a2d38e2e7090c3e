//! Ranking/scoring service client.

use crate::domain::error::RebalancerError;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of a successful scoring call.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreReply {
    /// One score per requested id, in request order.
    Ready(Vec<f64>),
    /// The service is still computing; ask again after the wait.
    RetryAfter(Duration),
}

pub trait ScorePort: Send + Sync {
    fn get_scores(
        &self,
        instrument_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ScoreReply, RebalancerError>;
}
