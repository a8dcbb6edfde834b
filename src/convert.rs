//! Pure conversion functions: TOML config structs -> crate API config types.

use anyhow::{Context, Result, bail};

use crate::config::*;

use nowcast_calendar::{Month, Quarter};
use nowcast_dfm::{EmConfig, TimeAggregation};
use nowcast_io::{Compression, WriterConfig};
use nowcast_panel::{InsufficientPolicy, StandardizeConfig};
use nowcast_pipeline::{PipelineConfig, RefitPolicy};

/// Parses a compression algorithm name string into the corresponding enum variant.
pub fn parse_compression(s: &str) -> Result<Compression> {
    match s.to_lowercase().as_str() {
        "none" => Ok(Compression::None),
        "snappy" => Ok(Compression::Snappy),
        other => bail!("unknown compression: {other:?}"),
    }
}

/// Parses a refit policy name.
pub fn parse_refit(s: &str) -> Result<RefitPolicy> {
    match s.to_lowercase().replace('-', "_").as_str() {
        "epoch_start" => Ok(RefitPolicy::EpochStart),
        "every_vintage" => Ok(RefitPolicy::EveryVintage),
        other => bail!("unknown refit policy: {other:?}"),
    }
}

/// Parses a quarterly aggregation scheme name.
pub fn parse_aggregation(s: &str) -> Result<TimeAggregation> {
    match s.to_lowercase().replace('-', "_").as_str() {
        "sum" => Ok(TimeAggregation::Sum),
        "average" => Ok(TimeAggregation::Average),
        "mariano_murasawa" => Ok(TimeAggregation::MarianoMurasawa),
        other => bail!("unknown aggregation: {other:?}"),
    }
}

/// Parses an insufficient-data policy name.
pub fn parse_policy(s: &str) -> Result<InsufficientPolicy> {
    match s.to_lowercase().as_str() {
        "abort" => Ok(InsufficientPolicy::Abort),
        "exclude" => Ok(InsufficientPolicy::Exclude),
        other => bail!("unknown standardization policy: {other:?}"),
    }
}

/// Parses a sample start: a `YYYY-MM` month, or `full` for no cut-off.
pub fn parse_sample_start(s: &str) -> Result<Option<Month>> {
    if s.eq_ignore_ascii_case("full") {
        return Ok(None);
    }
    let month = s
        .parse::<Month>()
        .with_context(|| format!("invalid sample_start: {s:?}"))?;
    Ok(Some(month))
}

/// Parses a `YYYYQn` quarter.
pub fn parse_quarter(s: &str) -> Result<Quarter> {
    s.parse::<Quarter>()
        .with_context(|| format!("invalid quarter: {s:?}"))
}

/// Builds an [`EmConfig`] from the TOML EM configuration.
pub fn build_em_config(em: &EmToml) -> EmConfig {
    let mut cfg = EmConfig::new();
    if let Some(n) = em.max_iterations {
        cfg = cfg.with_max_iterations(n);
    }
    if let Some(tol) = em.tolerance {
        cfg = cfg.with_tolerance(tol);
    }
    if let Some(v) = em.min_obs_variance {
        cfg = cfg.with_min_obs_variance(v);
    }
    if let Some(n) = em.min_observations {
        cfg = cfg.with_min_observations(n);
    }
    cfg
}

/// Builds a [`StandardizeConfig`] from the TOML standardization configuration.
pub fn build_standardize_config(standardize: &StandardizeToml) -> Result<StandardizeConfig> {
    let mut cfg = StandardizeConfig::new();
    if let Some(n) = standardize.min_observations {
        cfg = cfg.with_min_observations(n);
    }
    if let Some(ref policy) = standardize.policy {
        cfg = cfg.with_policy(parse_policy(policy)?);
    }
    Ok(cfg)
}

/// Builds a [`PipelineConfig`] from the whole TOML configuration.
///
/// The result is validated.
pub fn build_pipeline_config(config: &NowcastToml) -> Result<PipelineConfig> {
    let model = &config.model;
    let mut cfg = PipelineConfig::new()
        .with_em(build_em_config(&config.em))
        .with_standardize(build_standardize_config(&config.standardize)?);
    if let Some(ref targets) = model.targets {
        cfg = cfg.with_targets(targets.iter().cloned());
    }
    if let Some(ref start) = model.sample_start {
        cfg = cfg.with_sample_start(parse_sample_start(start)?);
    }
    if let Some(ref refit) = model.refit {
        cfg = cfg.with_refit(parse_refit(refit)?);
    }
    if let Some(ref multiplicities) = model.multiplicities {
        cfg = cfg.with_multiplicities(multiplicities.clone());
    }
    if let Some(n) = model.default_factors {
        cfg = cfg.with_default_factors(n);
    }
    if let Some(order) = model.factor_order {
        cfg = cfg.with_factor_order(order);
    }
    if let Some(ref aggregation) = model.aggregation {
        cfg = cfg.with_aggregation(parse_aggregation(aggregation)?);
    }
    if let Some(on) = model.idiosyncratic_ar1 {
        cfg = cfg.with_idiosyncratic_ar1(on);
    }
    cfg.validate().context("invalid pipeline configuration")?;
    Ok(cfg)
}

/// Builds a [`WriterConfig`] from the TOML I/O configuration.
pub fn build_writer_config(io: &IoToml) -> Result<WriterConfig> {
    let compression = parse_compression(&io.compression)?;
    let cfg = WriterConfig::default()
        .with_compression(compression)
        .with_row_group_size(io.row_group_size);
    cfg.validate().context("invalid writer configuration")?;
    Ok(cfg)
}
