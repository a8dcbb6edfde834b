//! News decomposition between vintages of one standardization epoch.

mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use common::{catalog, date, month, quarter, simulated_vintage, three_factor_spec};
use nowcast_dfm::{DfmError, EmConfig, FittedModel, NewsRequest, news};
use nowcast_history::UpdateKind;
use nowcast_panel::{StandardizationParams, StandardizeConfig, Standardizer, Vintage};

fn standardization(v: &Vintage) -> Arc<StandardizationParams> {
    Arc::new(Standardizer::new(StandardizeConfig::new()).fit(v).unwrap())
}

fn fit(v: &Vintage, params: Arc<StandardizationParams>) -> FittedModel {
    three_factor_spec()
        .fit(v, params, &EmConfig::new().with_max_iterations(30).with_tolerance(1e-5))
        .unwrap()
}

/// The simulated vintage with IP for 2023-11 not yet released.
fn vintage_pair(seed: u64) -> (Vintage, Vintage) {
    let full = simulated_vintage(seed);
    let ip = full.monthly().get(month(2023, 11), "IP").unwrap();
    let previous = full.with_monthly_value(month(2023, 11), "IP", f64::NAN).unwrap();
    let current = previous
        .with_monthly_value(month(2023, 11), "IP", ip)
        .unwrap()
        .with_release_date(date(2023, 12, 20));
    (previous, current)
}

#[test]
fn single_release_explains_the_whole_revision() {
    let (v1, v2) = vintage_pair(11);
    let params = standardization(&v1);
    let previous = fit(&v1, params);
    let current = previous.refilter(&v2).unwrap();

    let request = NewsRequest::new(["RGDP"]).with_catalog(catalog());
    let decomposition = news(&previous, &current, &request).unwrap();
    assert_eq!(decomposition.quarter(), quarter(2023, 4));

    let rows = decomposition.records();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.updated_variable, "IP");
    assert_eq!(row.update_kind, UpdateKind::Release);
    assert_eq!(row.update_date, month(2023, 11));
    assert_eq!(row.impact_date, month(2023, 12));
    assert_eq!(row.impacted_variable, "RGDP");
    assert_eq!(row.date, date(2023, 12, 20));
    assert_eq!(row.sector, "Real");
    assert_eq!(row.topic, "Production");
    assert_relative_eq!(
        row.observed,
        v2.monthly().get(month(2023, 11), "IP").unwrap(),
        max_relative = 1e-12
    );
    assert_relative_eq!(row.news, row.observed - row.forecast, max_relative = 1e-9);
    assert_relative_eq!(row.impact, row.news * row.weight, max_relative = 1e-9);

    let summary = decomposition.summary("RGDP").unwrap();
    assert_relative_eq!(row.impact, summary.total_revision(), max_relative = 1e-6);
    assert_relative_eq!(summary.news_impact, row.impact, max_relative = 1e-12);
    assert_eq!(summary.revision_impact, 0.0);
    assert_eq!(summary.parameter_revision, None);
    assert!(rows.iter().all(|r| r.update_kind != UpdateKind::Reestimation));

    let before = previous.forecast(quarter(2023, 4)).unwrap();
    let after = current.forecast(quarter(2023, 4)).unwrap();
    assert_relative_eq!(
        summary.previous_forecast,
        before.get("RGDP").unwrap().mean(),
        max_relative = 1e-8
    );
    assert_relative_eq!(
        summary.updated_forecast,
        after.get("RGDP").unwrap().mean(),
        max_relative = 1e-8
    );
}

#[test]
fn releases_revisions_and_withdrawals_reconcile() {
    let (v1, _) = vintage_pair(12);
    let params = standardization(&v1);
    let previous = fit(&v1, Arc::clone(&params));

    let retail = v1.monthly().get(month(2023, 9), "RETAIL").unwrap();
    let v3 = v1
        .with_monthly_value(month(2023, 9), "RETAIL", retail + 2.0)
        .unwrap()
        .with_monthly_value(month(2023, 10), "SPREAD", f64::NAN)
        .unwrap()
        .with_monthly_value(month(2023, 11), "IP", 3.0)
        .unwrap()
        .with_monthly_value(month(2023, 12), "M3", 1.0)
        .unwrap()
        .with_quarterly_value(quarter(2023, 4), "RGDP", 2.5)
        .unwrap()
        .with_release_date(date(2023, 12, 28));
    let current = previous.refilter(&v3).unwrap();

    let request = NewsRequest::new(["RGDP", "IP"]).with_quarter(quarter(2024, 1));
    let decomposition = news(&previous, &current, &request).unwrap();
    assert_eq!(decomposition.quarter(), quarter(2024, 1));

    for kind in [UpdateKind::Release, UpdateKind::Revision, UpdateKind::Withdrawal] {
        assert!(
            decomposition.records().iter().any(|r| r.update_kind == kind),
            "no {kind} row"
        );
    }
    let rgdp_release = decomposition
        .records()
        .iter()
        .find(|r| r.updated_variable == "RGDP" && r.impacted_variable == "RGDP")
        .unwrap();
    assert_eq!(rgdp_release.update_date, month(2023, 12));

    for target in ["RGDP", "IP"] {
        let summary = decomposition.summary(target).unwrap();
        let total: f64 = decomposition
            .records()
            .iter()
            .filter(|r| r.impacted_variable == target)
            .map(|r| r.impact)
            .sum();
        assert_relative_eq!(total, summary.total_revision(), max_relative = 1e-6);
        assert_relative_eq!(
            summary.news_impact + summary.revision_impact,
            summary.total_revision(),
            max_relative = 1e-6
        );
    }
}

#[test]
fn parameter_revision_reported_after_reestimation() {
    let (v1, v2) = vintage_pair(13);
    let params = standardization(&v1);
    let previous = fit(&v1, params);
    let current = previous
        .reestimate(&v2, &EmConfig::new().with_max_iterations(10))
        .unwrap();

    let decomposition = news(&previous, &current, &NewsRequest::new(["RGDP"])).unwrap();
    let summary = decomposition.summary("RGDP").unwrap();
    let own = current.forecast(quarter(2023, 4)).unwrap();
    let revision = summary.parameter_revision.unwrap();
    assert_relative_eq!(
        summary.updated_forecast + revision,
        own.get("RGDP").unwrap().mean(),
        max_relative = 1e-9
    );

    let reestimation: Vec<_> = decomposition
        .records()
        .iter()
        .filter(|r| r.update_kind == UpdateKind::Reestimation)
        .collect();
    assert_eq!(reestimation.len(), 1);
    assert_eq!(reestimation[0].impacted_variable, "RGDP");
    assert_relative_eq!(reestimation[0].impact, revision, max_relative = 1e-12);

    // data news plus the re-estimation row add up to the change between the
    // two models' own forecasts
    let total: f64 = decomposition.records().iter().map(|r| r.impact).sum();
    let before = previous.forecast(quarter(2023, 4)).unwrap();
    assert_relative_eq!(
        total,
        own.get("RGDP").unwrap().mean() - before.get("RGDP").unwrap().mean(),
        max_relative = 1e-6
    );
}

#[test]
fn models_from_different_epochs_are_incomparable() {
    let (v1, v2) = vintage_pair(14);
    let previous = fit(&v1, standardization(&v1));
    let current = fit(&v2, standardization(&v2));
    assert_eq!(
        news(&previous, &current, &NewsRequest::new(["RGDP"])).unwrap_err(),
        DfmError::IncomparableModels
    );
}

#[test]
fn unknown_target_rejected() {
    let (v1, v2) = vintage_pair(15);
    let previous = fit(&v1, standardization(&v1));
    let current = previous.refilter(&v2).unwrap();
    assert_eq!(
        news(&previous, &current, &NewsRequest::new(["GDP"])).unwrap_err(),
        DfmError::UnknownVariable {
            variable: "GDP".to_string()
        }
    );
}
