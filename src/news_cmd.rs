//! News command: decompose the revision between two vintages.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde_json::{Value, json};
use tracing::{info, info_span, warn};

use nowcast_dfm::{FactorSpec, NewsDecomposition, NewsRequest, news};
use nowcast_io::{read_catalog, read_vintage};
use nowcast_panel::{Standardizer, Vintage};

use crate::cli::NewsArgs;
use crate::{CATALOG_FILE, config, convert};

/// Estimate on the earlier vintage, re-filter the later one with the same
/// parameters and report the news.
pub fn run(args: NewsArgs) -> Result<()> {
    let _cmd = info_span!("news").entered();
    if args.current <= args.previous {
        bail!(
            "--current ({}) must be after --previous ({})",
            args.current,
            args.previous
        );
    }
    let config = config::load(&args.config)?;
    let data = args.data.unwrap_or_else(|| config.io.data.clone());
    let cfg = convert::build_pipeline_config(&config)?;

    let catalog_path = data.join(CATALOG_FILE);
    let catalog = read_catalog(&catalog_path)
        .with_context(|| format!("failed to read catalog: {}", catalog_path.display()))?;
    let load = |date: NaiveDate| -> Result<Vintage> {
        let vintage = read_vintage_on(&data, date)?;
        Ok(match cfg.sample_start() {
            Some(start) => vintage.since(start),
            None => vintage,
        })
    };
    let previous = load(args.previous)?;
    let current = load(args.current)?;

    // Both vintages share the standardization fixed on the earlier one.
    let standardization = Arc::new(
        Standardizer::new(cfg.standardize().clone())
            .fit(&previous)
            .context("failed to standardize the previous vintage")?,
    );
    let spec = FactorSpec::from_catalog(
        &catalog,
        cfg.multiplicities(),
        cfg.default_factors(),
        cfg.factor_order(),
        cfg.aggregation().clone(),
    )?
    .with_idiosyncratic_ar1(cfg.idiosyncratic_ar1())
    .without_series(standardization.excluded());
    let previous_model = spec
        .fit(&previous, Arc::clone(&standardization), cfg.em())
        .context("failed to estimate the model on the previous vintage")?;
    let current_model = previous_model
        .refilter(&current)
        .context("failed to filter the current vintage")?;

    let requested: Vec<String> = if args.targets.is_empty() {
        cfg.targets().to_vec()
    } else {
        args.targets
    };
    let targets: Vec<String> = requested
        .into_iter()
        .filter(|t| {
            let known = previous_model.series().any(|s| s == t.as_str());
            if !known {
                warn!(variable = %t, "target not in the model; skipped");
            }
            known
        })
        .collect();
    if targets.is_empty() {
        bail!("none of the targets is a series of the model");
    }

    let mut request = NewsRequest::new(targets).with_catalog(catalog);
    if let Some(ref q) = args.quarter {
        request = request.with_quarter(convert::parse_quarter(q)?);
    }
    let decomposition = news(&previous_model, &current_model, &request).context("news decomposition failed")?;
    info!(
        quarter = %decomposition.quarter(),
        rows = decomposition.records().len(),
        "news computed"
    );

    let text = serde_json::to_string_pretty(&report(args.previous, args.current, &decomposition))?;
    match args.json {
        Some(path) => {
            std::fs::write(&path, text)
                .with_context(|| format!("failed to write report: {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn read_vintage_on(data: &Path, date: NaiveDate) -> Result<Vintage> {
    let dir = data.join(date.format("%Y-%m-%d").to_string());
    read_vintage(&dir).with_context(|| format!("failed to read vintage: {}", dir.display()))
}

fn report(previous: NaiveDate, current: NaiveDate, decomposition: &NewsDecomposition) -> Value {
    let summaries: serde_json::Map<String, Value> = decomposition
        .summaries()
        .iter()
        .map(|(variable, s)| {
            (
                variable.clone(),
                json!({
                    "previous_forecast": s.previous_forecast,
                    "updated_forecast": s.updated_forecast,
                    "total_revision": s.total_revision(),
                    "news_impact": s.news_impact,
                    "revision_impact": s.revision_impact,
                    "parameter_revision": s.parameter_revision,
                }),
            )
        })
        .collect();
    let updates: Vec<Value> = decomposition
        .records()
        .iter()
        .map(|r| {
            json!({
                "impacted_variable": r.impacted_variable,
                "updated_variable": r.updated_variable,
                "update_date": r.update_date.to_string(),
                "update_kind": r.update_kind.to_string(),
                "impact_date": r.impact_date.to_string(),
                "observed": finite(r.observed),
                "forecast": finite(r.forecast),
                "news": finite(r.news),
                "weight": r.weight,
                "impact": r.impact,
                "broad_sector": r.sector,
                "topic": r.topic,
            })
        })
        .collect();
    json!({
        "previous": previous.to_string(),
        "current": current.to_string(),
        "quarter": decomposition.quarter().to_string(),
        "summaries": summaries,
        "updates": updates,
    })
}

/// JSON has no NaN; withdrawn observations become `null`.
fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}
