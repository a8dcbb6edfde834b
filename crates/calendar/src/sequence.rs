//! Inclusive period ranges.

use crate::period::Period;

/// Generates every period from `start` to `end`, inclusive.
///
/// Returns an empty vector when `end` precedes `start`.
///
/// # Example
///
/// ```
/// use nowcast_calendar::{Quarter, period_range};
///
/// let qs = period_range(Quarter::new(2020, 3).unwrap(), Quarter::new(2021, 1).unwrap());
/// assert_eq!(qs.len(), 3);
/// ```
pub fn period_range<P: Period>(start: P, end: P) -> Vec<P> {
    let n = start.steps_to(end);
    if n < 0 {
        return Vec::new();
    }
    (0..=n).map(|i| start.offset(i)).collect()
}
