//! Error types for the nowcast-history crate.

/// Error type for all fallible operations in the nowcast-history crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HistoryError {
    /// Returned when a batch mixes several `(quarter, date)` keys.
    #[error("batch mixes keys {first} and {other}")]
    MixedBatch {
        /// Key of the first record.
        first: String,
        /// First key that differs.
        other: String,
    },

    /// Returned when a batch holds more than one record for a key that
    /// allows only one.
    #[error("duplicate record for {key}")]
    DuplicateRecord {
        /// The repeated key.
        key: String,
    },

    /// Returned when an update kind label is not recognised.
    #[error("invalid update kind '{label}' (expected release, revision or withdrawal)")]
    InvalidUpdateKind {
        /// The unrecognised label.
        label: String,
    },
}
