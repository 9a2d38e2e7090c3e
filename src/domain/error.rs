//! Domain error types.

/// Top-level error type for rebalancer.
#[derive(Debug, thiserror::Error)]
pub enum RebalancerError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no instruments match the configured universe")]
    NoInstruments,

    #[error("scoring error: {reason}")]
    Scoring { reason: String },

    #[error("scoring returned {got} scores for {expected} instruments")]
    ScoreMismatch { expected: usize, got: usize },

    #[error("signal error for {instrument}: {reason}")]
    Signal { instrument: String, reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&RebalancerError> for std::process::ExitCode {
    fn from(err: &RebalancerError) -> Self {
        let code: u8 = match err {
            RebalancerError::Io(_) => 1,
            RebalancerError::ConfigParse { .. }
            | RebalancerError::ConfigMissing { .. }
            | RebalancerError::ConfigInvalid { .. } => 2,
            RebalancerError::Data { .. }
            | RebalancerError::NoInstruments
            | RebalancerError::Signal { .. } => 3,
            RebalancerError::Scoring { .. } | RebalancerError::ScoreMismatch { .. } => 4,
            RebalancerError::Report { .. } => 5,
            RebalancerError::Cancelled => 130,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_invalid_message() {
        let err = RebalancerError::ConfigInvalid {
            section: "scoring".into(),
            key: "top_percent".into(),
            reason: "must be between 0 and 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config value [scoring] top_percent: must be between 0 and 1"
        );
    }

    #[test]
    fn score_mismatch_message() {
        let err = RebalancerError::ScoreMismatch {
            expected: 3,
            got: 2,
        };
        assert_eq!(err.to_string(), "scoring returned 2 scores for 3 instruments");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RebalancerError = io.into();
        assert!(matches!(err, RebalancerError::Io(_)));
    }
}
