//! # nowcast-calendar
//!
//! Period arithmetic for mixed-frequency macro panels.
//!
//! ## Architecture
//!
//! ```mermaid
//! graph LR
//!     A["NaiveDate (release date)"] -->|"Month::from_date()"| B["Month"]
//!     A -->|"Quarter::from_date()"| C["Quarter"]
//!     B -->|".quarter()"| C
//!     C -->|".months() / .last_month()"| B
//!     B -->|"period_range()"| D["Vec of Month"]
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use nowcast_calendar::{Month, Period, Quarter, period_range};
//!
//! let q: Quarter = "2023Q2".parse().unwrap();
//! assert_eq!(q.last_month(), Month::new(2023, 6).unwrap());
//!
//! let months = period_range(Month::new(2023, 11).unwrap(), Month::new(2024, 2).unwrap());
//! assert_eq!(months.len(), 4);
//! assert_eq!(months[2].quarter(), Quarter::new(2024, 1).unwrap());
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `period` | The [`Period`] trait shared by months and quarters |
//! | `month` | Calendar month |
//! | `quarter` | Calendar quarter |
//! | `sequence` | Inclusive period ranges |
//! | `error` | Error types |

mod error;
mod month;
mod period;
mod quarter;
mod sequence;

pub use error::CalendarError;
pub use month::Month;
pub use period::Period;
pub use quarter::Quarter;
pub use sequence::period_range;
