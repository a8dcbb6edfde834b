//! Shared behaviour of monthly and quarterly periods.

use std::fmt;
use std::hash::Hash;

/// A regularly spaced calendar period (month or quarter).
///
/// Periods map one-to-one onto a linear index so that panels can be
/// addressed by row offset from their first period.
pub trait Period: Copy + Ord + Hash + fmt::Debug + fmt::Display {
    /// Linear index of this period (e.g. `year * 12 + month - 1`).
    fn index(self) -> i64;

    /// Inverse of [`Period::index`].
    fn from_index(index: i64) -> Self;

    /// Returns the period `n` steps later (`n` may be negative).
    fn offset(self, n: i64) -> Self {
        Self::from_index(self.index() + n)
    }

    /// Returns the next period.
    fn succ(self) -> Self {
        self.offset(1)
    }

    /// Number of steps from `self` to `later` (negative if `later` is earlier).
    fn steps_to(self, later: Self) -> i64 {
        later.index() - self.index()
    }
}
