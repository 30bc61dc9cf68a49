//! Error types for the event-study engine.

use thiserror::Error;

/// Result type for event-study operations.
pub type Result<T> = std::result::Result<T, EventStudyError>;

/// Errors that can occur while assembling or analyzing an event study.
#[derive(Debug, Error)]
pub enum EventStudyError {
    /// No usable price history for a symbol over the requested range
    #[error("No price data for {symbol}: {detail}")]
    DataUnavailable {
        /// Ticker symbol the fetch was issued for
        symbol: String,
        /// What the provider reported
        detail: String,
    },

    /// Too few usable observations for a meaningful regression, or
    /// zero-variance input that leaves the regression undefined
    #[error("Insufficient data: need {required} observations, got {available}")]
    InsufficientData {
        /// Required number of observations
        required: usize,
        /// Available number of observations
        available: usize,
    },

    /// Event window produced no joined observations
    #[error("Degenerate computation: {detail}")]
    ComputationDegenerate {
        /// What made the computation degenerate
        detail: String,
    },

    /// Window parameter outside its permitted bounds
    #[error("Invalid {name}: {value} is outside [{min}, {max}]")]
    InvalidWindow {
        /// Parameter name
        name: &'static str,
        /// Value supplied by the caller
        value: usize,
        /// Lower bound (inclusive)
        min: usize,
        /// Upper bound (inclusive)
        max: usize,
    },

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Frame(#[from] polars::error::PolarsError),
}
