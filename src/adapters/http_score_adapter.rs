//! Scoring service client over HTTP.
//!
//! `GET {address}/get-index?from=..&to=..&instrument_ids=a,b&alpha=..&p_value=..&threshold=..`
//! answers `{"indexes": [..]}` on success. Errors carry
//! `{"message": .., "retry_after": seconds}`; a positive `retry_after` means
//! the scores are still being computed.
//!
//! Requests run through the adapter's [`CancelToken`], so cancelling a run
//! abandons an in-flight request instead of waiting out the client timeout.

use crate::domain::cancel::CancelToken;
use crate::domain::error::RebalancerError;
use crate::ports::score_port::{ScorePort, ScoreReply};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const INDEX_PATH: &str = "/get-index";
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Model hyperparameters forwarded with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringParams {
    pub alpha: f64,
    pub p_value: f64,
    pub threshold: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        ScoringParams {
            alpha: 0.05,
            p_value: 0.05,
            threshold: 0.3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    indexes: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    retry_after: f64,
}

pub struct HttpScoreAdapter {
    client: reqwest::blocking::Client,
    address: String,
    params: ScoringParams,
    cancel: CancelToken,
}

impl HttpScoreAdapter {
    pub fn new(
        address: &str,
        params: ScoringParams,
        timeout: Duration,
    ) -> Result<Self, RebalancerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RebalancerError::Scoring {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            address: address.trim_end_matches('/').to_string(),
            params,
            cancel: CancelToken::new(),
        })
    }

    /// Ties in-flight requests to `cancel`.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn query(
        &self,
        instrument_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("from", from.format(TIME_FORMAT).to_string()),
            ("to", to.format(TIME_FORMAT).to_string()),
            ("instrument_ids", instrument_ids.join(",")),
            ("alpha", format!("{:.2}", self.params.alpha)),
            ("p_value", format!("{:.2}", self.params.p_value)),
            ("threshold", format!("{:.2}", self.params.threshold)),
        ]
    }
}

fn validate_request(
    instrument_ids: &[String],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<(), RebalancerError> {
    let reason = if from > to {
        "invalid interval"
    } else if to - from < TimeDelta::days(1) {
        "interval must be at least one day"
    } else if instrument_ids.is_empty() {
        "empty ids"
    } else {
        return Ok(());
    };
    Err(RebalancerError::Scoring {
        reason: reason.to_string(),
    })
}

fn interpret(status: StatusCode, body: &str) -> Result<ScoreReply, RebalancerError> {
    if status.is_success() {
        let response: IndexResponse =
            serde_json::from_str(body).map_err(|e| RebalancerError::Scoring {
                reason: format!("malformed score response: {e}"),
            })?;
        return Ok(ScoreReply::Ready(response.indexes));
    }

    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) if err.retry_after.is_finite() && err.retry_after > 0.0 => Ok(
            ScoreReply::RetryAfter(Duration::from_secs_f64(err.retry_after)),
        ),
        Ok(err) => Err(RebalancerError::Scoring {
            reason: format!("HTTP {status}: {}", err.message),
        }),
        Err(_) => Err(RebalancerError::Scoring {
            reason: format!("HTTP {status}"),
        }),
    }
}

impl ScorePort for HttpScoreAdapter {
    fn get_scores(
        &self,
        instrument_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ScoreReply, RebalancerError> {
        validate_request(instrument_ids, from, to)?;

        let url = format!("{}{}", self.address, INDEX_PATH);
        let request = self
            .client
            .get(&url)
            .query(&self.query(instrument_ids, from, to));
        let target = url.clone();
        let (status, body) = self.cancel.run_until_cancelled(move || {
            let response = request.send().map_err(|e| RebalancerError::Scoring {
                reason: format!("request to {target} failed: {e}"),
            })?;
            let status = response.status();
            let body = response.text().map_err(|e| RebalancerError::Scoring {
                reason: format!("failed to read score response: {e}"),
            })?;
            Ok((status, body))
        })?;
        debug!(%url, %status, ids = instrument_ids.len(), "score response");
        interpret(status, &body)
    }
}
