//! Per-series standardization fixed for a quarter (the standardization epoch).
//!
//! Model parameters estimated on standardized data are only comparable
//! across vintages when every vintage is standardized with the same
//! `(mean, scale)` pairs. [`Standardizer::fit`] computes those pairs from
//! one vintage; [`StandardizationParams`] applies them to any later one.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use nowcast_calendar::Quarter;
use tracing::warn;

use crate::error::PanelError;
use crate::vintage::Vintage;

/// Location and scale of one series.
///
/// Equality is bit-exact on both fields.
#[derive(Debug, Clone, Copy)]
pub struct Scaling {
    mean: f64,
    scale: f64,
}

impl Scaling {
    /// Creates a scaling. `scale` must be positive; this is checked by
    /// [`Standardizer::fit`], not here.
    pub fn new(mean: f64, scale: f64) -> Self {
        Self { mean, scale }
    }

    /// Location.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Scale (sample standard deviation).
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// `(x - mean) / scale`.
    pub fn apply(&self, x: f64) -> f64 {
        (x - self.mean) / self.scale
    }

    /// `z * scale + mean`.
    pub fn unapply(&self, z: f64) -> f64 {
        z * self.scale + self.mean
    }

    /// Maps a variance in standardized units back to original units.
    pub fn unapply_variance(&self, v: f64) -> f64 {
        v * self.scale * self.scale
    }
}

impl PartialEq for Scaling {
    fn eq(&self, other: &Self) -> bool {
        self.mean.to_bits() == other.mean.to_bits() && self.scale.to_bits() == other.scale.to_bits()
    }
}

impl Eq for Scaling {}

/// What to do with a series that cannot be standardized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsufficientPolicy {
    /// Fail the whole fit.
    #[default]
    Abort,
    /// Warn, record the series as excluded and continue without it.
    Exclude,
}

/// Configuration for [`Standardizer`].
///
/// # Example
///
/// ```
/// use nowcast_panel::{InsufficientPolicy, StandardizeConfig};
///
/// let config = StandardizeConfig::new()
///     .with_min_observations(24)
///     .with_policy(InsufficientPolicy::Exclude);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StandardizeConfig {
    min_observations: usize,
    policy: InsufficientPolicy,
}

impl StandardizeConfig {
    /// Defaults: `min_observations = 12`, `policy = Abort`.
    pub fn new() -> Self {
        Self {
            min_observations: 12,
            policy: InsufficientPolicy::Abort,
        }
    }

    /// Sets the minimum number of non-missing observations per series.
    pub fn with_min_observations(mut self, n: usize) -> Self {
        self.min_observations = n;
        self
    }

    /// Sets the policy for series that cannot be standardized.
    pub fn with_policy(mut self, policy: InsufficientPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the minimum number of non-missing observations per series.
    pub fn min_observations(&self) -> usize {
        self.min_observations
    }

    /// Returns the insufficient-data policy.
    pub fn policy(&self) -> InsufficientPolicy {
        self.policy
    }

    /// Validates this configuration.
    ///
    /// A sample standard deviation needs at least two observations.
    pub fn validate(&self) -> Result<(), PanelError> {
        if self.min_observations < 2 {
            return Err(PanelError::InvalidConfig {
                reason: format!(
                    "min_observations must be >= 2, got {}",
                    self.min_observations
                ),
            });
        }
        Ok(())
    }
}

impl Default for StandardizeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Standardization parameters of one epoch.
///
/// Two parameter sets compare equal only if every scaling is bit-identical,
/// so equality doubles as the "same standardization" check required before
/// comparing two fitted models.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizationParams {
    epoch: Quarter,
    reference_date: NaiveDate,
    scalings: BTreeMap<String, Scaling>,
    excluded: Vec<String>,
}

impl StandardizationParams {
    /// Builds a parameter set directly, e.g. when loading a stored epoch.
    pub fn new(
        epoch: Quarter,
        reference_date: NaiveDate,
        scalings: BTreeMap<String, Scaling>,
        excluded: Vec<String>,
    ) -> Self {
        Self {
            epoch,
            reference_date,
            scalings,
            excluded,
        }
    }

    /// Quarter these parameters belong to.
    pub fn epoch(&self) -> Quarter {
        self.epoch
    }

    /// Release date of the vintage the parameters were computed from.
    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// Scaling of `id`, if it was standardized.
    pub fn get(&self, id: &str) -> Option<&Scaling> {
        self.scalings.get(id)
    }

    /// All scalings keyed by series id.
    pub fn scalings(&self) -> &BTreeMap<String, Scaling> {
        &self.scalings
    }

    /// Series dropped under [`InsufficientPolicy::Exclude`].
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Standardized value of `x` for series `id`.
    pub fn apply_value(&self, id: &str, x: f64) -> Option<f64> {
        self.scalings.get(id).map(|s| s.apply(x))
    }

    /// Original-unit value of `z` for series `id`.
    pub fn unapply_value(&self, id: &str, z: f64) -> Option<f64> {
        self.scalings.get(id).map(|s| s.unapply(z))
    }

    /// Returns the standardized copy of `vintage`.
    ///
    /// Excluded series are dropped. Missing values stay missing.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::UnknownSeries`] if the vintage carries a series
    /// that is neither scaled nor excluded.
    pub fn standardize(&self, vintage: &Vintage) -> Result<Vintage, PanelError> {
        if let Some(id) = vintage
            .series_ids()
            .find(|id| !self.scalings.contains_key(*id) && !self.excluded.iter().any(|e| e == id))
        {
            return Err(PanelError::UnknownSeries {
                series: id.to_string(),
            });
        }
        let kept = vintage.retain_series(|id| self.scalings.contains_key(id));
        Ok(kept.map_panels(|id, x| match self.scalings.get(id) {
            Some(s) => s.apply(x),
            None => x,
        }))
    }
}

/// Computes [`StandardizationParams`] from a vintage.
#[derive(Debug, Clone, Default)]
pub struct Standardizer {
    config: StandardizeConfig,
}

impl Standardizer {
    /// Creates a standardizer with the given configuration.
    pub fn new(config: StandardizeConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StandardizeConfig {
        &self.config
    }

    /// Fits per-series mean and sample standard deviation, ignoring `NaN`.
    ///
    /// The epoch is the quarter containing the vintage's release date.
    ///
    /// # Errors
    ///
    /// | Variant | Trigger |
    /// |---------|---------|
    /// | [`PanelError::InvalidConfig`] | configuration fails validation |
    /// | [`PanelError::EmptyPanel`] | the monthly panel has no rows |
    /// | [`PanelError::InsufficientData`] | fewer than `min_observations` values (policy `Abort`) |
    /// | [`PanelError::ConstantSeries`] | zero sample variance (policy `Abort`) |
    pub fn fit(&self, vintage: &Vintage) -> Result<StandardizationParams, PanelError> {
        self.config.validate()?;
        if vintage.monthly().n_periods() == 0 {
            return Err(PanelError::EmptyPanel {
                release_date: vintage.release_date(),
            });
        }

        let min = self.config.min_observations;
        let mut scalings = BTreeMap::new();
        let mut excluded = Vec::new();

        for id in vintage.series_ids() {
            let obs = vintage.observations(id);
            let n = obs.len();
            let outcome = if n < min {
                Err(PanelError::InsufficientData {
                    series: id.to_string(),
                    n,
                    min,
                })
            } else {
                let (mean, sd) = mean_sd(&obs);
                if sd > 0.0 && sd.is_finite() {
                    Ok(Scaling::new(mean, sd))
                } else {
                    Err(PanelError::ConstantSeries {
                        series: id.to_string(),
                    })
                }
            };
            match (outcome, self.config.policy) {
                (Ok(s), _) => {
                    scalings.insert(id.to_string(), s);
                }
                (Err(e), InsufficientPolicy::Abort) => return Err(e),
                (Err(e), InsufficientPolicy::Exclude) => {
                    warn!(series = id, error = %e, "excluding series from standardization");
                    excluded.push(id.to_string());
                }
            }
        }

        Ok(StandardizationParams {
            epoch: vintage.quarter(),
            reference_date: vintage.release_date(),
            scalings,
            excluded,
        })
    }
}

/// Mean and sample standard deviation (N-1 denominator). Needs `x.len() >= 2`.
fn mean_sd(x: &[f64]) -> (f64, f64) {
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let ss: f64 = x.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (ss / (n - 1.0)).sqrt())
}
