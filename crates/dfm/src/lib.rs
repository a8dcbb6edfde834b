//! # nowcast-dfm
//!
//! Mixed-frequency dynamic factor model for nowcasting quarterly aggregates
//! from monthly indicators, estimated by EM over panels with arbitrary
//! missing data, plus the Banbura–Modugno news decomposition of forecast
//! revisions.
//!
//! ## Typestate Workflow
//!
//! ```mermaid
//! graph LR
//!     A["FactorSpec::builder()"] -->|".build()?"| B["FactorSpec"]
//!     B -->|".fit(&vintage, standardization, &config)?"| C["FittedModel"]
//!     C --> D[".forecast(quarter)? / .nowcast_record()?"]
//!     C -->|".refilter(&next_vintage)?"| C2["FittedModel (same parameters)"]
//!     C -->|".reestimate(&next_vintage, &config)?"| C3["FittedModel (new parameters)"]
//!     C & C2 -->|"news(&previous, &current, &request)?"| E["NewsDecomposition"]
//!     F["select_best_bic(&candidates, ...)?"] -->|"parallel fits"| C
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use nowcast_dfm::{EmConfig, FactorSpec, NewsRequest, news};
//!
//! let spec = FactorSpec::builder()
//!     .block("Global", 2, 2)
//!     .assign("IP", &["Global"])
//!     .assign("RGDP", &["Global"])
//!     .build()?;
//! let previous = spec.fit(&v1, params.clone(), &EmConfig::new())?;
//! let current = previous.refilter(&v2)?;
//! let decomposition = news(&previous, &current, &NewsRequest::new(["RGDP"]))?;
//! ```
//!
//! ## Model
//!
//! | Symbol | Accessor | Meaning |
//! |--------|----------|---------|
//! | Λ | [`DfmParams::loadings()`] | factor loadings, zero outside a series' blocks |
//! | A_b | [`DfmParams::transition()`] | VAR coefficients of block `b` |
//! | Q_b | [`DfmParams::process_cov()`] | factor innovation covariance of block `b` |
//! | r | [`DfmParams::obs_var()`] | idiosyncratic variances |
//! | w | [`TimeAggregation::weights()`] | lag weights linking a quarterly series to monthly factors |
//!
//! Everything is estimated on standardized data; forecasts and news are
//! reported in original units.

mod em;
mod error;
mod fit;
mod forecast;
mod news;
mod params;
mod selection;
mod spec;

pub(crate) mod kalman;
pub(crate) mod linalg;
pub(crate) mod state_space;

pub use em::{Convergence, EmConfig};
pub use error::DfmError;
pub use fit::FittedModel;
pub use forecast::{Forecast, VariableForecast};
pub use news::{NewsDecomposition, NewsRequest, NewsSummary, news};
pub use params::DfmParams;
pub use selection::select_best_bic;
pub use spec::{FactorBlock, FactorSpec, FactorSpecBuilder, GLOBAL_BLOCK, TimeAggregation};
