//! Error types for the nowcast-panel crate.

use nowcast_calendar::CalendarError;

/// Error type for all fallible operations in the nowcast-panel crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PanelError {
    /// Returned when the value matrix does not match the declared columns.
    #[error("shape mismatch: {columns} column names for a matrix with {ncols} columns")]
    ShapeMismatch {
        /// Number of column names provided.
        columns: usize,
        /// Number of matrix columns.
        ncols: usize,
    },

    /// Returned when a series id appears more than once.
    #[error("duplicate series '{series}'")]
    DuplicateSeries {
        /// The repeated series id.
        series: String,
    },

    /// Returned when a series id is not present where it is required.
    #[error("unknown series '{series}'")]
    UnknownSeries {
        /// The missing series id.
        series: String,
    },

    /// Returned when a panel contains an infinite value.
    #[error("series '{series}' contains non-finite values")]
    NonFiniteData {
        /// Offending series id.
        series: String,
    },

    /// Returned when a vintage has no monthly rows to build a model grid on.
    #[error("vintage released {release_date} has an empty monthly panel")]
    EmptyPanel {
        /// Release date of the offending vintage.
        release_date: chrono::NaiveDate,
    },

    /// Returned when a series has too few observations to standardize.
    #[error("insufficient data for series '{series}': got {n} observations, need at least {min}")]
    InsufficientData {
        /// Offending series id.
        series: String,
        /// Number of non-missing observations.
        n: usize,
        /// Minimum required.
        min: usize,
    },

    /// Returned when a series has zero sample variance.
    #[error("series '{series}' is constant (zero variance)")]
    ConstantSeries {
        /// Offending series id.
        series: String,
    },

    /// Returned when a series frequency code is not recognised.
    #[error("invalid frequency code '{code}' (expected 'M' or 'Q')")]
    InvalidFrequency {
        /// The unrecognised code.
        code: String,
    },

    /// Returned when a configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },

    /// Calendar error.
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_insufficient_data() {
        let err = PanelError::InsufficientData {
            series: "BUS_CONF".to_string(),
            n: 3,
            min: 12,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for series 'BUS_CONF': got 3 observations, need at least 12"
        );
    }

    #[test]
    fn display_shape_mismatch() {
        let err = PanelError::ShapeMismatch {
            columns: 2,
            ncols: 3,
        };
        assert_eq!(
            err.to_string(),
            "shape mismatch: 2 column names for a matrix with 3 columns"
        );
    }

    #[test]
    fn calendar_transparent() {
        let err = PanelError::from(CalendarError::InvalidMonth { month: 14 });
        assert_eq!(err.to_string(), "invalid month: 14 (must be 1..=12)");
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_impl<T: Send + Sync + std::error::Error>() {}
        assert_impl::<PanelError>();
    }
}
