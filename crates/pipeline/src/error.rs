//! Error types for the nowcast-pipeline crate.

use chrono::NaiveDate;
use nowcast_dfm::DfmError;
use nowcast_history::HistoryError;
use nowcast_panel::PanelError;

/// Error type for all fallible operations in the nowcast-pipeline crate.
///
/// Wraps the errors of the crates the pipeline drives and adds the
/// pipeline's own configuration and ordering checks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// Panel or standardization error.
    #[error(transparent)]
    Panel(#[from] PanelError),

    /// Model estimation, forecasting or news error.
    #[error(transparent)]
    Dfm(#[from] DfmError),

    /// History table error.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// Returned when a configuration parameter is invalid.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },

    /// Returned when a target variable is not a quarterly series of the
    /// catalog.
    #[error("target '{target}' is not a quarterly series of the catalog")]
    UnknownTarget {
        /// The offending target.
        target: String,
    },

    /// Returned when a vintage is not newer than the last processed one.
    #[error("vintage released {release_date} is not after the last processed vintage ({last})")]
    OutOfOrder {
        /// Release date of the rejected vintage.
        release_date: NaiveDate,
        /// Release date of the last processed vintage.
        last: NaiveDate,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_dfm_transparent() {
        let err = PipelineError::from(DfmError::IncomparableModels);
        assert_eq!(err.to_string(), DfmError::IncomparableModels.to_string());
    }

    #[test]
    fn display_unknown_target() {
        let err = PipelineError::UnknownTarget {
            target: "GDP".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "target 'GDP' is not a quarterly series of the catalog"
        );
    }

    #[test]
    fn display_out_of_order() {
        let err = PipelineError::OutOfOrder {
            release_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            last: NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "vintage released 2024-01-05 is not after the last processed vintage (2024-01-20)"
        );
    }

    #[test]
    fn error_is_send_sync_and_std_error() {
        fn assert_bounds<T: Send + Sync + std::error::Error>() {}
        assert_bounds::<PipelineError>();
    }
}
