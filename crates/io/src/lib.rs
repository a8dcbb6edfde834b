//! # nowcast-io
//!
//! Read data vintages and the series catalog from Parquet files, and persist
//! the nowcast and news history tables. Bridges the on-disk layout into the
//! [`nowcast_panel`] and [`nowcast_history`] types; no model logic lives here.
//!
//! ## Layout
//!
//! ```text
//! data/
//! ├── series.parquet            series, label, freq, broad_sector, topic
//! ├── 2024-01-15/
//! │   ├── monthly.parquet       date (YYYY-MM) + one Float64 column per series
//! │   └── quarterly.parquet     quarter (YYYYQn) + one Float64 column per series
//! └── 2024-02-01/
//!     └── ...
//! ```
//!
//! Vintage directories are named by release date (`YYYY-MM-DD`). Nulls mark
//! missing observations.
//!
//! ## Quick Start
//!
//! ```ignore
//! use nowcast_io::{list_vintages, read_catalog, read_vintage};
//!
//! let catalog = read_catalog(&root.join("series.parquet"))?;
//! for entry in list_vintages(&root)? {
//!     let vintage = read_vintage(entry.path())?;
//!     // ...
//! }
//! ```

mod catalog;
mod error;
mod history;
mod parquet_read;
mod parquet_write;
mod vintage;
mod writer;

pub use catalog::{read_catalog, write_catalog};
pub use error::IoError;
pub use history::{read_news_history, read_nowcast_history, write_news_history, write_nowcast_history};
pub use vintage::{VintageEntry, list_vintages, read_vintage, write_vintage};
pub use writer::{Compression, WriterConfig};
