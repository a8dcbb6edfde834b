//! Factor specification (unfitted model).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use nowcast_panel::{SeriesCatalog, StandardizationParams, Vintage};

use crate::em::EmConfig;
use crate::error::DfmError;
use crate::fit::FittedModel;

/// Name of the block every series loads on in [`FactorSpec::from_catalog`].
pub const GLOBAL_BLOCK: &str = "Global";

/// A group of factors sharing one VAR process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorBlock {
    name: String,
    factors: usize,
    order: usize,
}

impl FactorBlock {
    /// Block name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of factors in the block (multiplicity).
    pub fn factors(&self) -> usize {
        self.factors
    }

    /// Autoregressive order of the block's VAR.
    pub fn order(&self) -> usize {
        self.order
    }
}

/// How a quarterly series relates to the monthly factors.
///
/// A quarterly observation dated at the quarter-end month `t` loads on
/// `Σ_j w_j f_{t-j}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TimeAggregation {
    /// Sum of the three months of the quarter, `w = [1, 1, 1]`.
    #[default]
    Sum,
    /// Average of the three months, `w = [1/3, 1/3, 1/3]`.
    Average,
    /// Mariano–Murasawa weights for growth rates, `w = [1, 2, 3, 2, 1]`.
    MarianoMurasawa,
    /// User-supplied weights, most recent month first.
    Custom(Vec<f64>),
}

impl TimeAggregation {
    /// Weight vector, most recent month first.
    pub fn weights(&self) -> Vec<f64> {
        match self {
            Self::Sum => vec![1.0; 3],
            Self::Average => vec![1.0 / 3.0; 3],
            Self::MarianoMurasawa => vec![1.0, 2.0, 3.0, 2.0, 1.0],
            Self::Custom(w) => w.clone(),
        }
    }

    /// Number of months a quarterly observation spans.
    pub fn span(&self) -> usize {
        match self {
            Self::Sum | Self::Average => 3,
            Self::MarianoMurasawa => 5,
            Self::Custom(w) => w.len(),
        }
    }
}

/// A validated factor specification.
///
/// Build one with [`FactorSpec::builder()`] or derive the default layout from
/// a series catalog with [`FactorSpec::from_catalog()`], then call
/// [`FactorSpec::fit()`].
///
/// ```mermaid
/// graph LR
///     A["FactorSpec::builder()"] -->|".block() .assign() .build()?"| B["FactorSpec"]
///     B -->|".fit(&vintage, params, &config)?"| C["FittedModel"]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FactorSpec {
    blocks: Vec<FactorBlock>,
    assignments: BTreeMap<String, Vec<usize>>,
    aggregation: TimeAggregation,
    idiosyncratic_ar1: bool,
}

impl FactorSpec {
    /// Starts a new builder.
    pub fn builder() -> FactorSpecBuilder {
        FactorSpecBuilder::default()
    }

    /// The layout used by the production nowcast: every series loads on a
    /// `Global` block and on the block named after its broad sector.
    ///
    /// `multiplicities` overrides the number of factors per block name;
    /// unlisted blocks get `default_factors`. Every block uses `order`, and
    /// quarterly series load on the factors through `aggregation`.
    ///
    /// # Errors
    ///
    /// Returns [`DfmError::InvalidSpec`] if a multiplicity or the order is
    /// zero, or custom aggregation weights are invalid.
    pub fn from_catalog(
        catalog: &SeriesCatalog,
        multiplicities: &BTreeMap<String, usize>,
        default_factors: usize,
        order: usize,
        aggregation: TimeAggregation,
    ) -> Result<Self, DfmError> {
        let factors_for = |name: &str| multiplicities.get(name).copied().unwrap_or(default_factors);
        let mut builder = Self::builder().block(GLOBAL_BLOCK, factors_for(GLOBAL_BLOCK), order);
        for sector in catalog.sectors() {
            if sector != GLOBAL_BLOCK {
                builder = builder.block(sector, factors_for(sector), order);
            }
        }
        for meta in catalog.iter() {
            let mut blocks = vec![GLOBAL_BLOCK];
            if !meta.sector().is_empty() && meta.sector() != GLOBAL_BLOCK {
                blocks.push(meta.sector());
            }
            builder = builder.assign(meta.id(), &blocks);
        }
        builder.aggregation(aggregation).build()
    }

    /// Declared blocks in declaration order.
    pub fn blocks(&self) -> &[FactorBlock] {
        &self.blocks
    }

    /// Block indices assigned to `series`, in declaration order.
    pub fn blocks_of(&self, series: &str) -> Option<&[usize]> {
        self.assignments.get(series).map(Vec::as_slice)
    }

    /// Assigned series ids, sorted.
    pub fn series(&self) -> impl Iterator<Item = &str> {
        self.assignments.keys().map(String::as_str)
    }

    /// Quarterly time-aggregation scheme.
    pub fn aggregation(&self) -> &TimeAggregation {
        &self.aggregation
    }

    /// `true` if each series' idiosyncratic error is an AR(1) state rather
    /// than white observation noise.
    pub fn idiosyncratic_ar1(&self) -> bool {
        self.idiosyncratic_ar1
    }

    /// Copy of the specification with idiosyncratic AR(1) states switched
    /// on or off.
    pub fn with_idiosyncratic_ar1(mut self, on: bool) -> Self {
        self.idiosyncratic_ar1 = on;
        self
    }

    /// Copy of the specification without the given series.
    ///
    /// Blocks left without series are kept; fitting reports them.
    pub fn without_series(&self, drop: &[String]) -> Self {
        let mut out = self.clone();
        out.assignments.retain(|id, _| !drop.contains(id));
        out
    }

    /// Estimates the model on `vintage` by EM.
    ///
    /// The vintage is standardized with `standardization`, which the fitted
    /// model keeps so that later vintages of the same epoch are comparable.
    ///
    /// # Errors
    ///
    /// | Variant | Trigger |
    /// |---------|---------|
    /// | [`DfmError::InvalidConfig`] | `config` fails validation |
    /// | [`DfmError::Panel`] | the vintage carries a series the standardization does not know, or has no monthly rows |
    /// | [`DfmError::UnassignedSeries`] | a data series has no block |
    /// | [`DfmError::InvalidSpec`] | a block has fewer series than factors |
    /// | [`DfmError::InsufficientData`] | a series has fewer than `min_observations` values |
    /// | [`DfmError::SingularCovariance`] | the Kalman filter breaks down |
    pub fn fit(
        &self,
        vintage: &Vintage,
        standardization: Arc<StandardizationParams>,
        config: &EmConfig,
    ) -> Result<FittedModel, DfmError> {
        crate::fit::fit_spec(self, vintage, standardization, config)
    }
}

/// Builder for [`FactorSpec`].
#[derive(Debug, Clone, Default)]
pub struct FactorSpecBuilder {
    blocks: Vec<FactorBlock>,
    assignments: Vec<(String, Vec<String>)>,
    aggregation: TimeAggregation,
    idiosyncratic_ar1: bool,
}

impl FactorSpecBuilder {
    /// Declares a block with `factors` factors following a VAR(`order`).
    pub fn block(mut self, name: impl Into<String>, factors: usize, order: usize) -> Self {
        self.blocks.push(FactorBlock {
            name: name.into(),
            factors,
            order,
        });
        self
    }

    /// Assigns `series` to the named blocks.
    pub fn assign<S: AsRef<str>>(mut self, series: impl Into<String>, blocks: &[S]) -> Self {
        self.assignments.push((
            series.into(),
            blocks.iter().map(|b| b.as_ref().to_string()).collect(),
        ));
        self
    }

    /// Sets the quarterly aggregation scheme (default [`TimeAggregation::Sum`]).
    pub fn aggregation(mut self, aggregation: TimeAggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Models each series' idiosyncratic error as an AR(1) state (default
    /// off: white observation noise).
    ///
    /// A quarterly series' idiosyncratic state is monthly and aggregated with
    /// the same weights as the factors.
    pub fn idiosyncratic_ar1(mut self, on: bool) -> Self {
        self.idiosyncratic_ar1 = on;
        self
    }

    /// Validates and builds the specification.
    ///
    /// # Errors
    ///
    /// | Variant | Trigger |
    /// |---------|---------|
    /// | [`DfmError::InvalidSpec`] | no blocks, duplicate block or series, zero factors/order, unknown block name, bad custom weights |
    /// | [`DfmError::UnassignedSeries`] | a series is assigned to no block |
    pub fn build(self) -> Result<FactorSpec, DfmError> {
        let invalid = |reason: String| DfmError::InvalidSpec { reason };

        if self.blocks.is_empty() {
            return Err(invalid("at least one factor block is required".to_string()));
        }
        let mut names = HashSet::new();
        for b in &self.blocks {
            if !names.insert(b.name.as_str()) {
                return Err(invalid(format!("duplicate block '{}'", b.name)));
            }
            if b.factors == 0 {
                return Err(invalid(format!("block '{}' has zero factors", b.name)));
            }
            if b.order == 0 {
                return Err(invalid(format!("block '{}' has zero autoregressive order", b.name)));
            }
        }

        if let TimeAggregation::Custom(w) = &self.aggregation {
            if w.is_empty() || w.iter().any(|x| !x.is_finite()) || w.iter().all(|x| *x == 0.0) {
                return Err(invalid(
                    "custom aggregation weights must be finite and not all zero".to_string(),
                ));
            }
        }

        let mut assignments = BTreeMap::new();
        for (series, blocks) in self.assignments {
            if blocks.is_empty() {
                return Err(DfmError::UnassignedSeries { series });
            }
            let mut idx = Vec::with_capacity(blocks.len());
            for name in &blocks {
                let i = self
                    .blocks
                    .iter()
                    .position(|b| &b.name == name)
                    .ok_or_else(|| invalid(format!("series '{series}' references unknown block '{name}'")))?;
                if idx.contains(&i) {
                    return Err(invalid(format!("series '{series}' lists block '{name}' twice")));
                }
                idx.push(i);
            }
            idx.sort_unstable();
            if assignments.insert(series.clone(), idx).is_some() {
                return Err(invalid(format!("series '{series}' assigned twice")));
            }
        }

        Ok(FactorSpec {
            blocks: self.blocks,
            assignments,
            aggregation: self.aggregation,
            idiosyncratic_ar1: self.idiosyncratic_ar1,
        })
    }
}
