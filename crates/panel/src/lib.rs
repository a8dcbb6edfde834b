//! # nowcast-panel
//!
//! In-memory representation of data vintages and the standardization that
//! keeps model parameters comparable across vintages of one quarter.
//!
//! ## Pipeline
//!
//! ```mermaid
//! graph LR
//!     A["SeriesCatalog"] --> B["Vintage (monthly + quarterly Panel)"]
//!     B -->|"Standardizer::fit()"| C["StandardizationParams"]
//!     C -->|".standardize(&vintage)"| D["standardized Vintage"]
//!     E["StandardizationBook"] -->|"first vintage of quarter"| C
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use nowcast_panel::{StandardizationBook, StandardizeConfig};
//!
//! let mut book = StandardizationBook::new(StandardizeConfig::new());
//! let params = book.params_for(&vintage)?; // fitted on the first vintage of the quarter
//! let z = params.standardize(&vintage)?;
//! ```

mod book;
mod error;
mod panel;
mod series;
mod standardize;
mod vintage;

pub use book::StandardizationBook;
pub use error::PanelError;
pub use panel::Panel;
pub use series::{Frequency, SeriesCatalog, SeriesMeta};
pub use standardize::{
    InsufficientPolicy, Scaling, StandardizationParams, StandardizeConfig, Standardizer,
};
pub use vintage::Vintage;
