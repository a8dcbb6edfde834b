//! Error types for the nowcast-calendar crate.

/// Error type for all fallible operations in the nowcast-calendar crate.
///
/// Covers out-of-range month and quarter numbers and malformed period
/// strings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalendarError {
    /// Returned when a month number is outside the valid range 1..=12.
    #[error("invalid month: {month} (must be 1..=12)")]
    InvalidMonth {
        /// The invalid month number that was provided.
        month: u8,
    },

    /// Returned when a quarter number is outside the valid range 1..=4.
    #[error("invalid quarter: {quarter} (must be 1..=4)")]
    InvalidQuarter {
        /// The invalid quarter number that was provided.
        quarter: u8,
    },

    /// Returned when a period string cannot be parsed.
    #[error("cannot parse '{input}' as {expected}")]
    Parse {
        /// The offending input.
        input: String,
        /// Human-readable description of the expected format.
        expected: &'static str,
    },
}
