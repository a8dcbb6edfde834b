//! Calendar month.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::error::CalendarError;
use crate::period::Period;
use crate::quarter::Quarter;

/// A calendar month with year context.
///
/// Ordered chronologically. Displays and parses as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u8,
}

impl Month {
    /// Creates a new `Month`.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidMonth`] if `month` is not in 1..=12.
    pub fn new(year: i32, month: u8) -> Result<Self, CalendarError> {
        if !(1..=12).contains(&month) {
            return Err(CalendarError::InvalidMonth { month });
        }
        Ok(Self { year, month })
    }

    /// Returns the month containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month() as u8,
        }
    }

    /// Returns the year.
    pub fn year(self) -> i32 {
        self.year
    }

    /// Returns the month number (1..=12).
    pub fn month(self) -> u8 {
        self.month
    }

    /// Returns the quarter this month belongs to.
    pub fn quarter(self) -> Quarter {
        Quarter::from_index(self.index().div_euclid(3))
    }

    /// Position of this month within its quarter (0, 1 or 2).
    pub fn position_in_quarter(self) -> u8 {
        (self.month - 1) % 3
    }

    /// Returns `true` for March, June, September and December.
    pub fn is_quarter_end(self) -> bool {
        self.position_in_quarter() == 2
    }
}

impl Period for Month {
    fn index(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_index(index: i64) -> Self {
        Self {
            year: index.div_euclid(12) as i32,
            month: (index.rem_euclid(12) + 1) as u8,
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = CalendarError;

    /// Parses `YYYY-MM`, also accepting a trailing `-DD` day component.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || CalendarError::Parse {
            input: s.to_string(),
            expected: "YYYY-MM",
        };
        let mut parts = s.trim().split('-');
        let year: i32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(parse_err)?;
        let month: u8 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(parse_err)?;
        if let Some(day) = parts.next() {
            day.parse::<u8>().map_err(|_| parse_err())?;
        }
        if parts.next().is_some() {
            return Err(parse_err());
        }
        Self::new(year, month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_valid() {
        let m = Month::new(2023, 4).unwrap();
        assert_eq!(m.year(), 2023);
        assert_eq!(m.month(), 4);
    }

    #[test]
    fn new_invalid() {
        assert_eq!(
            Month::new(2023, 0).unwrap_err(),
            CalendarError::InvalidMonth { month: 0 }
        );
        assert_eq!(
            Month::new(2023, 13).unwrap_err(),
            CalendarError::InvalidMonth { month: 13 }
        );
    }

    #[test]
    fn index_round_trip_across_year() {
        let dec = Month::new(2019, 12).unwrap();
        let jan = dec.succ();
        assert_eq!(jan, Month::new(2020, 1).unwrap());
        assert_eq!(Month::from_index(dec.index()), dec);
        assert_eq!(jan.offset(-1), dec);
    }

    #[test]
    fn steps_to() {
        let a = Month::new(2020, 11).unwrap();
        let b = Month::new(2021, 2).unwrap();
        assert_eq!(a.steps_to(b), 3);
        assert_eq!(b.steps_to(a), -3);
    }

    #[test]
    fn quarter_membership() {
        assert_eq!(
            Month::new(2021, 1).unwrap().quarter(),
            Quarter::new(2021, 1).unwrap()
        );
        assert_eq!(
            Month::new(2021, 6).unwrap().quarter(),
            Quarter::new(2021, 2).unwrap()
        );
        assert_eq!(
            Month::new(2021, 12).unwrap().quarter(),
            Quarter::new(2021, 4).unwrap()
        );
    }

    #[test]
    fn quarter_end_flags() {
        let ends: Vec<u8> = (1..=12)
            .filter(|&m| Month::new(2000, m).unwrap().is_quarter_end())
            .collect();
        assert_eq!(ends, vec![3, 6, 9, 12]);
    }

    #[test]
    fn from_date() {
        let d = NaiveDate::from_ymd_opt(2023, 5, 17).unwrap();
        assert_eq!(Month::from_date(d), Month::new(2023, 5).unwrap());
    }

    #[test]
    fn display_and_parse() {
        let m = Month::new(2008, 3).unwrap();
        assert_eq!(m.to_string(), "2008-03");
        assert_eq!("2008-03".parse::<Month>().unwrap(), m);
        assert_eq!("2008-03-01".parse::<Month>().unwrap(), m);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            "2008/03".parse::<Month>(),
            Err(CalendarError::Parse { .. })
        ));
        assert!(matches!(
            "2008-13".parse::<Month>(),
            Err(CalendarError::InvalidMonth { month: 13 })
        ));
    }
}
