//! # nowcast-pipeline
//!
//! Drives the nowcast through a sequence of data vintages: standardization
//! epochs, estimation and re-filtering, the quarterly nowcast, the news
//! decomposition between consecutive vintages, and the history tables.
//!
//! ## Flow per vintage
//!
//! ```mermaid
//! graph TD
//!     V["Vintage"] -->|".since(sample_start)"| T["trimmed vintage"]
//!     T -->|"StandardizationBook::params_for"| S["epoch parameters"]
//!     S -->|"first vintage of the epoch"| F["FactorSpec::fit"]
//!     S -->|"later vintages"| R["refilter / reestimate"]
//!     F & R --> M["FittedModel"]
//!     M -->|"nowcast_record()"| N["NowcastHistory::append"]
//!     M -->|"news(previous, current)"| E["NewsHistory::append"]
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use nowcast_pipeline::{Nowcaster, PipelineConfig};
//!
//! let mut nowcaster = Nowcaster::new(PipelineConfig::new().with_targets(["RGDP"]), catalog)?;
//! let summary = nowcaster.run(vintages);
//! for outcome in &summary.processed {
//!     println!("{} {:?}", outcome.release_date, outcome.nowcast.values);
//! }
//! ```

mod config;
mod error;
mod nowcaster;

pub use config::{PipelineConfig, RefitPolicy};
pub use error::PipelineError;
pub use nowcaster::{Nowcaster, RunSummary, VintageOutcome};
