//! One set of standardization parameters per quarter.

use std::collections::BTreeMap;
use std::sync::Arc;

use nowcast_calendar::Quarter;
use tracing::info;

use crate::error::PanelError;
use crate::standardize::{StandardizationParams, StandardizeConfig, Standardizer};
use crate::vintage::Vintage;

/// Registry of standardization epochs.
///
/// The first vintage seen in a quarter fixes that quarter's parameters;
/// every later vintage of the quarter receives the same shared instance.
#[derive(Debug, Clone, Default)]
pub struct StandardizationBook {
    standardizer: Standardizer,
    epochs: BTreeMap<Quarter, Arc<StandardizationParams>>,
}

impl StandardizationBook {
    /// Creates an empty book.
    pub fn new(config: StandardizeConfig) -> Self {
        Self {
            standardizer: Standardizer::new(config),
            epochs: BTreeMap::new(),
        }
    }

    /// Returns the parameters for the vintage's quarter, fitting them on
    /// `vintage` if the quarter has not been seen yet.
    ///
    /// # Errors
    ///
    /// Propagates [`Standardizer::fit`] errors; a failed fit leaves the book
    /// unchanged so a later vintage of the quarter may open the epoch.
    pub fn params_for(&mut self, vintage: &Vintage) -> Result<Arc<StandardizationParams>, PanelError> {
        let quarter = vintage.quarter();
        if let Some(p) = self.epochs.get(&quarter) {
            return Ok(Arc::clone(p));
        }
        let params = Arc::new(self.standardizer.fit(vintage)?);
        info!(
            epoch = %quarter,
            reference = %vintage.release_date(),
            series = params.scalings().len(),
            excluded = params.excluded().len(),
            "opened standardization epoch"
        );
        self.epochs.insert(quarter, Arc::clone(&params));
        Ok(params)
    }

    /// Parameters of an already opened epoch.
    pub fn get(&self, quarter: Quarter) -> Option<Arc<StandardizationParams>> {
        self.epochs.get(&quarter).cloned()
    }

    /// Opened epochs in chronological order.
    pub fn epochs(&self) -> impl Iterator<Item = Quarter> + '_ {
        self.epochs.keys().copied()
    }

    /// Number of opened epochs.
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Returns `true` if no epoch has been opened.
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::Panel;
    use chrono::NaiveDate;
    use ndarray::array;
    use nowcast_calendar::Month;

    fn vintage(day: (i32, u32, u32), x: f64) -> Vintage {
        let m = Panel::new(
            Month::new(2021, 1).unwrap(),
            vec!["A".into()],
            array![[1.0], [2.0], [x]],
        )
        .unwrap();
        let q = Panel::empty(nowcast_calendar::Quarter::new(2021, 1).unwrap(), Vec::new()).unwrap();
        Vintage::new(NaiveDate::from_ymd_opt(day.0, day.1, day.2).unwrap(), m, q).unwrap()
    }

    #[test]
    fn first_vintage_of_quarter_fixes_params() {
        let mut book = StandardizationBook::new(StandardizeConfig::new().with_min_observations(2));
        let p1 = book.params_for(&vintage((2021, 4, 5), 3.0)).unwrap();
        let p2 = book.params_for(&vintage((2021, 5, 5), 30.0)).unwrap();
        assert!(Arc::ptr_eq(&p1, &p2));
        assert_eq!(book.len(), 1);

        let p3 = book.params_for(&vintage((2021, 7, 1), 30.0)).unwrap();
        assert_ne!(*p1, *p3);
        let epochs: Vec<Quarter> = book.epochs().collect();
        assert_eq!(
            epochs,
            vec![Quarter::new(2021, 2).unwrap(), Quarter::new(2021, 3).unwrap()]
        );
    }

    #[test]
    fn failed_fit_leaves_book_empty() {
        let mut book = StandardizationBook::new(StandardizeConfig::new());
        assert!(book.params_for(&vintage((2021, 4, 5), 3.0)).is_err());
        assert!(book.is_empty());
    }
}
