//! Pipeline configuration.

use std::collections::BTreeMap;

use nowcast_calendar::Month;
use nowcast_dfm::{EmConfig, GLOBAL_BLOCK, TimeAggregation};
use nowcast_panel::StandardizeConfig;

use crate::error::PipelineError;

/// When model parameters are re-estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefitPolicy {
    /// Estimate at the first vintage of each standardization epoch and
    /// re-filter later vintages of the epoch with those parameters.
    #[default]
    EpochStart,
    /// Re-estimate on every vintage, warm-started from the previous
    /// parameters within an epoch.
    EveryVintage,
}

/// Configuration for a [`crate::Nowcaster`].
///
/// Use the builder methods to customize; [`PipelineConfig::new()`] gives the
/// production layout.
///
/// # Example
///
/// ```
/// use nowcast_dfm::EmConfig;
/// use nowcast_pipeline::{PipelineConfig, RefitPolicy};
///
/// let config = PipelineConfig::new()
///     .with_targets(["RGDP"])
///     .with_refit(RefitPolicy::EveryVintage)
///     .with_em(EmConfig::new().with_max_iterations(100));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    targets: Vec<String>,
    sample_start: Option<Month>,
    refit: RefitPolicy,
    multiplicities: BTreeMap<String, usize>,
    default_factors: usize,
    factor_order: usize,
    aggregation: TimeAggregation,
    idiosyncratic_ar1: bool,
    em: EmConfig,
    standardize: StandardizeConfig,
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    ///
    /// Defaults: targets `UNEMP`, `GDP`, `RGDP`; sample from 2000-01;
    /// [`RefitPolicy::EpochStart`]; two factors in `Global`, `Real`,
    /// `Fiscal` and `External`, one in `Financial`, one in any other block;
    /// VAR order 2; [`TimeAggregation::Sum`]; white-noise idiosyncratic
    /// errors; default [`EmConfig`] and [`StandardizeConfig`].
    pub fn new() -> Self {
        let multiplicities = [
            (GLOBAL_BLOCK, 2),
            ("Real", 2),
            ("Financial", 1),
            ("Fiscal", 2),
            ("External", 2),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            targets: ["UNEMP", "GDP", "RGDP"].map(String::from).to_vec(),
            sample_start: Month::new(2000, 1).ok(),
            refit: RefitPolicy::default(),
            multiplicities,
            default_factors: 1,
            factor_order: 2,
            aggregation: TimeAggregation::default(),
            idiosyncratic_ar1: false,
            em: EmConfig::new(),
            standardize: StandardizeConfig::new(),
        }
    }

    /// Sets the quarterly variables to nowcast.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the first month used for estimation, or `None` for the full
    /// sample.
    pub fn with_sample_start(mut self, start: Option<Month>) -> Self {
        self.sample_start = start;
        self
    }

    /// Sets the re-estimation policy.
    pub fn with_refit(mut self, refit: RefitPolicy) -> Self {
        self.refit = refit;
        self
    }

    /// Replaces the per-block factor counts.
    pub fn with_multiplicities(mut self, multiplicities: BTreeMap<String, usize>) -> Self {
        self.multiplicities = multiplicities;
        self
    }

    /// Sets the factor count of blocks without an explicit multiplicity.
    pub fn with_default_factors(mut self, n: usize) -> Self {
        self.default_factors = n;
        self
    }

    /// Sets the VAR order of every block.
    pub fn with_factor_order(mut self, order: usize) -> Self {
        self.factor_order = order;
        self
    }

    /// Sets how quarterly series aggregate the monthly factors.
    pub fn with_aggregation(mut self, aggregation: TimeAggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Models each series' idiosyncratic error as an AR(1) state instead of
    /// white noise.
    pub fn with_idiosyncratic_ar1(mut self, on: bool) -> Self {
        self.idiosyncratic_ar1 = on;
        self
    }

    /// Sets the EM configuration.
    pub fn with_em(mut self, em: EmConfig) -> Self {
        self.em = em;
        self
    }

    /// Sets the standardization configuration.
    pub fn with_standardize(mut self, standardize: StandardizeConfig) -> Self {
        self.standardize = standardize;
        self
    }

    /// Returns the target variables.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Returns the sample start, if any.
    pub fn sample_start(&self) -> Option<Month> {
        self.sample_start
    }

    /// Returns the re-estimation policy.
    pub fn refit(&self) -> RefitPolicy {
        self.refit
    }

    /// Returns the per-block factor counts.
    pub fn multiplicities(&self) -> &BTreeMap<String, usize> {
        &self.multiplicities
    }

    /// Returns the default factor count.
    pub fn default_factors(&self) -> usize {
        self.default_factors
    }

    /// Returns the VAR order.
    pub fn factor_order(&self) -> usize {
        self.factor_order
    }

    /// Returns the quarterly aggregation scheme.
    pub fn aggregation(&self) -> &TimeAggregation {
        &self.aggregation
    }

    /// Returns `true` if idiosyncratic errors are AR(1) states.
    pub fn idiosyncratic_ar1(&self) -> bool {
        self.idiosyncratic_ar1
    }

    /// Returns the EM configuration.
    pub fn em(&self) -> &EmConfig {
        &self.em
    }

    /// Returns the standardization configuration.
    pub fn standardize(&self) -> &StandardizeConfig {
        &self.standardize
    }

    /// Validates this configuration and the nested library configurations.
    ///
    /// # Errors
    ///
    /// | Variant | Trigger |
    /// |---------|---------|
    /// | [`PipelineError::InvalidConfig`] | no targets, a repeated target, or a zero factor count / order |
    /// | [`PipelineError::Dfm`] | the EM configuration is invalid |
    /// | [`PipelineError::Panel`] | the standardization configuration is invalid |
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |reason: String| Err(PipelineError::InvalidConfig { reason });
        if self.targets.is_empty() {
            return invalid("at least one target is required".to_string());
        }
        for (i, t) in self.targets.iter().enumerate() {
            if self.targets[..i].contains(t) {
                return invalid(format!("target '{t}' listed twice"));
            }
        }
        if self.default_factors == 0 {
            return invalid("default_factors must be >= 1".to_string());
        }
        if self.factor_order == 0 {
            return invalid("factor_order must be >= 1".to_string());
        }
        if let Some((block, _)) = self.multiplicities.iter().find(|(_, n)| **n == 0) {
            return invalid(format!("block '{block}' has zero factors"));
        }
        self.em.validate()?;
        self.standardize.validate()?;
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::new();
        assert_eq!(config.targets(), ["UNEMP", "GDP", "RGDP"]);
        assert_eq!(config.sample_start(), Some(Month::new(2000, 1).unwrap()));
        assert_eq!(config.refit(), RefitPolicy::EpochStart);
        assert_eq!(config.multiplicities()["Global"], 2);
        assert_eq!(config.multiplicities()["Financial"], 1);
        assert_eq!(config.factor_order(), 2);
        assert_eq!(config.aggregation(), &TimeAggregation::Sum);
        assert!(!config.idiosyncratic_ar1());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            PipelineConfig::new().with_targets(Vec::<String>::new()).validate(),
            Err(PipelineError::InvalidConfig { .. })
        ));
        assert!(matches!(
            PipelineConfig::new().with_targets(["GDP", "GDP"]).validate(),
            Err(PipelineError::InvalidConfig { .. })
        ));
        assert!(matches!(
            PipelineConfig::new().with_factor_order(0).validate(),
            Err(PipelineError::InvalidConfig { .. })
        ));
        let mut zero = BTreeMap::new();
        zero.insert("Real".to_string(), 0);
        assert!(matches!(
            PipelineConfig::new().with_multiplicities(zero).validate(),
            Err(PipelineError::InvalidConfig { .. })
        ));
        assert!(matches!(
            PipelineConfig::new()
                .with_em(EmConfig::new().with_max_iterations(0))
                .validate(),
            Err(PipelineError::Dfm(_))
        ));
        assert!(matches!(
            PipelineConfig::new()
                .with_standardize(StandardizeConfig::new().with_min_observations(1))
                .validate(),
            Err(PipelineError::Panel(_))
        ));
    }
}
