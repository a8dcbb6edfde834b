//! Calendar quarter.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::CalendarError;
use crate::month::Month;
use crate::period::Period;

/// A calendar quarter with year context.
///
/// Ordered chronologically. Displays and parses as `YYYYQn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quarter {
    year: i32,
    quarter: u8,
}

impl Quarter {
    /// Creates a new `Quarter`.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidQuarter`] if `quarter` is not in 1..=4.
    pub fn new(year: i32, quarter: u8) -> Result<Self, CalendarError> {
        if !(1..=4).contains(&quarter) {
            return Err(CalendarError::InvalidQuarter { quarter });
        }
        Ok(Self { year, quarter })
    }

    /// Returns the quarter containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Month::from_date(date).quarter()
    }

    /// Returns the year.
    pub fn year(self) -> i32 {
        self.year
    }

    /// Returns the quarter number (1..=4).
    pub fn quarter(self) -> u8 {
        self.quarter
    }

    /// First month of the quarter.
    pub fn first_month(self) -> Month {
        Month::from_index(self.index() * 3)
    }

    /// Last month of the quarter; quarterly observations are dated here.
    pub fn last_month(self) -> Month {
        Month::from_index(self.index() * 3 + 2)
    }

    /// The three constituent months in chronological order.
    pub fn months(self) -> [Month; 3] {
        let first = self.first_month();
        [first, first.offset(1), first.offset(2)]
    }
}

impl Period for Quarter {
    fn index(self) -> i64 {
        i64::from(self.year) * 4 + i64::from(self.quarter) - 1
    }

    fn from_index(index: i64) -> Self {
        Self {
            year: index.div_euclid(4) as i32,
            quarter: (index.rem_euclid(4) + 1) as u8,
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}Q{}", self.year, self.quarter)
    }
}

impl FromStr for Quarter {
    type Err = CalendarError;

    /// Parses `YYYYQn` (case-insensitive, an optional `-` before `Q`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || CalendarError::Parse {
            input: s.to_string(),
            expected: "YYYYQn",
        };
        let upper = s.trim().to_ascii_uppercase();
        let (year, quarter) = upper.split_once('Q').ok_or_else(parse_err)?;
        let year: i32 = year
            .trim_end_matches('-')
            .parse()
            .map_err(|_| parse_err())?;
        let quarter: u8 = quarter.parse().map_err(|_| parse_err())?;
        Self::new(year, quarter)
    }
}
