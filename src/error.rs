use chrono::NaiveDate;
use thiserror::Error;

/// Error taxonomy for the analysis engine. Every variant is local to the
/// day or the parameter it concerns; there is no global pipeline abort.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient history for {indicator}: need {required} bars, have {available}")]
    InsufficientHistory {
        indicator: String,
        required: usize,
        available: usize,
    },

    #[error("{indicator} value {value} falls outside every configured range")]
    UnclassifiedValue { indicator: String, value: f64 },

    #[error("pipeline incomplete for {date}: {reason}")]
    StaleDecision { date: NaiveDate, reason: String },

    #[error("challenger for {parameter} skipped: {reason}")]
    OptimizerSkipped { parameter: String, reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl EngineError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        EngineError::InvalidConfig {
            reason: reason.into(),
        }
    }
}
