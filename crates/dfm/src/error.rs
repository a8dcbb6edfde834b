//! Error types for the nowcast-dfm crate.

use nowcast_panel::PanelError;

/// Error type for all fallible operations in the nowcast-dfm crate.
///
/// Covers specification validation, data sufficiency, numerical failures in
/// the Kalman recursions and misuse of the news engine. Non-convergence of
/// EM is not an error; it is reported through
/// [`Convergence`](crate::Convergence).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DfmError {
    /// Returned when a factor specification is malformed.
    #[error("invalid factor specification: {reason}")]
    InvalidSpec {
        /// Description of the problem.
        reason: String,
    },

    /// Returned when the data carry a series the specification does not assign.
    #[error("series '{series}' is not assigned to any factor block")]
    UnassignedSeries {
        /// Offending series id.
        series: String,
    },

    /// Returned when a series has too few observations to estimate its loadings.
    #[error("insufficient data for series '{series}': got {n} observations, need at least {min}")]
    InsufficientData {
        /// Offending series id.
        series: String,
        /// Number of non-missing observations.
        n: usize,
        /// Minimum required.
        min: usize,
    },

    /// Returned when an innovation covariance is not positive definite or a
    /// filtered quantity becomes non-finite.
    #[error("singular covariance at period {period}: {reason}")]
    SingularCovariance {
        /// Zero-based row of the monthly model grid.
        period: usize,
        /// What failed.
        reason: String,
    },

    /// Returned when two fitted models do not share standardization parameters.
    #[error("models are not comparable: standardization parameters differ")]
    IncomparableModels,

    /// Returned when a requested variable is not part of the model.
    #[error("unknown variable '{variable}'")]
    UnknownVariable {
        /// The requested id.
        variable: String,
    },

    /// Returned when every candidate specification failed to fit.
    #[error("all {candidates} candidate specifications failed to fit")]
    NoCandidates {
        /// Number of candidates attempted.
        candidates: usize,
    },

    /// Returned when an estimation setting is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },

    /// Panel or standardization error.
    #[error(transparent)]
    Panel(#[from] PanelError),
}
