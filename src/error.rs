//! Analysis-level error types.
//!
//! Malformed input lines never surface here; they are counted in
//! [`crate::scanner::ScanStats`]. These errors describe analyses that
//! cannot produce a result at all.

use thiserror::Error;

/// Failure of a single analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Statistics were requested over an empty sample set.
    #[error("no data")]
    NoData,

    /// A percentage breakdown had no usable total for a step.
    #[error("missing denominator: `{event}` is absent or zero for step {step}")]
    MissingDenominator { step: i64, event: String },

    /// A step directory holds no readable worker logs.
    #[error("no worker logs found for step {0}")]
    UnknownStep(i64),

    /// A rank slice expression could not be parsed.
    #[error("invalid rank slice `{0}` (expected `start:end`, e.g. `50:60` or `-2:`)")]
    InvalidRankSlice(String),

    /// A color string is not `#RRGGBB`.
    #[error("invalid color `{0}` (expected `#RRGGBB`)")]
    InvalidColor(String),

    /// The chart backend failed to draw or write the image.
    #[error("failed to render chart {path}: {message}")]
    Chart { path: String, message: String },
}

/// Result alias for analysis operations.
pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_denominator_message() {
        let err = AnalysisError::MissingDenominator {
            step: 7,
            event: "total_step_duration".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("missing denominator"));
        assert!(msg.contains("step 7"));
    }

    #[test]
    fn test_no_data_message() {
        assert_eq!(AnalysisError::NoData.to_string(), "no data");
    }
}
