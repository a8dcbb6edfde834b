//! Integration tests: the pipeline over a sequence of simulated vintages.

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use chrono::NaiveDate;
use ndarray::{Array2, s};
use nowcast_calendar::{Month, Quarter};
use nowcast_dfm::{EmConfig, TimeAggregation};
use nowcast_history::UpdateKind;
use nowcast_panel::{Frequency, Panel, SeriesCatalog, SeriesMeta, Vintage};
use nowcast_pipeline::{Nowcaster, PipelineConfig, PipelineError, RefitPolicy};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

const MONTHLY: [&str; 5] = ["IP", "RETAIL", "EMPL", "M3", "SPREAD"];

fn month(y: i32, m: u8) -> Month {
    Month::new(y, m).unwrap()
}

fn quarter(y: i32, q: u8) -> Quarter {
    Quarter::new(y, q).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Three-factor data for 2014-01..=2023-12 and RGDP for 2014Q1..=2023Q4.
fn simulated(seed: u64) -> (Array2<f64>, Array2<f64>) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let n = 120;
    let (mut g, mut r, mut f) = (vec![0.0; n], vec![0.0; n], vec![0.0; n]);
    for t in 1..n {
        g[t] = 0.6 * g[t - 1] + normal.sample(&mut rng);
        r[t] = 0.4 * r[t - 1] + normal.sample(&mut rng);
        f[t] = 0.5 * f[t - 1] + normal.sample(&mut rng);
    }
    let loadings = [(1.0, 0.8, 0.0), (0.7, 0.6, 0.0), (0.9, 0.4, 0.0), (0.8, 0.0, 0.9), (0.5, 0.0, 0.7)];
    let mut monthly = Array2::<f64>::zeros((n, MONTHLY.len()));
    for t in 0..n {
        for (j, (lg, lr, lf)) in loadings.iter().enumerate() {
            monthly[[t, j]] = 0.2 + lg * g[t] + lr * r[t] + lf * f[t] + 0.5 * normal.sample(&mut rng);
        }
    }
    let mut quarterly = Array2::<f64>::zeros((n / 3, 1));
    for k in 0..n / 3 {
        let end = 3 * k + 2;
        let sum: f64 = (0..3).map(|j| 0.5 * g[end - j] + 0.4 * r[end - j]).sum();
        quarterly[[k, 0]] = 1.0 + sum + 0.3 * normal.sample(&mut rng);
    }
    (monthly, quarterly)
}

/// Vintage released on `release` holding `n_months` monthly rows and
/// `n_quarters` quarterly rows, with the listed monthly cells withheld.
fn vintage(
    data: &(Array2<f64>, Array2<f64>),
    release: NaiveDate,
    n_months: usize,
    n_quarters: usize,
    withheld: &[(Month, &str)],
) -> Vintage {
    let monthly = Panel::new(
        month(2014, 1),
        MONTHLY.iter().map(|s| s.to_string()).collect(),
        data.0.slice(s![..n_months, ..]).to_owned(),
    )
    .unwrap();
    let quarterly = Panel::new(
        quarter(2014, 1),
        vec!["RGDP".to_string()],
        data.1.slice(s![..n_quarters, ..]).to_owned(),
    )
    .unwrap();
    withheld.iter().fold(
        Vintage::new(release, monthly, quarterly).unwrap(),
        |v, (m, id)| v.with_monthly_value(*m, id, f64::NAN).unwrap(),
    )
}

/// Three vintages in 2023Q4 and one opening 2024Q1.
fn vintages(seed: u64) -> Vec<Vintage> {
    let data = simulated(seed);
    let nov = month(2023, 11);
    vec![
        vintage(&data, date(2023, 12, 5), 119, 39, &[(nov, "IP"), (nov, "RETAIL"), (nov, "EMPL")]),
        vintage(&data, date(2023, 12, 15), 119, 39, &[(nov, "EMPL")]),
        vintage(&data, date(2023, 12, 28), 119, 39, &[]),
        vintage(&data, date(2024, 1, 10), 120, 39, &[]),
    ]
}

fn catalog() -> SeriesCatalog {
    SeriesCatalog::new(vec![
        SeriesMeta::new("IP", Frequency::Monthly).with_sector("Real").with_topic("Production"),
        SeriesMeta::new("RETAIL", Frequency::Monthly).with_sector("Real").with_topic("Consumption"),
        SeriesMeta::new("EMPL", Frequency::Monthly).with_sector("Real").with_topic("Labour"),
        SeriesMeta::new("M3", Frequency::Monthly).with_sector("Financial").with_topic("Money"),
        SeriesMeta::new("SPREAD", Frequency::Monthly).with_sector("Financial").with_topic("Rates"),
        SeriesMeta::new("RGDP", Frequency::Quarterly).with_sector("Real").with_topic("National accounts"),
    ])
    .unwrap()
}

fn config() -> PipelineConfig {
    let mut multiplicities = BTreeMap::new();
    multiplicities.insert("Global".to_string(), 1);
    PipelineConfig::new()
        .with_targets(["RGDP"])
        .with_sample_start(Some(month(2015, 1)))
        .with_multiplicities(multiplicities)
        .with_default_factors(1)
        .with_factor_order(1)
        .with_em(EmConfig::new().with_max_iterations(15).with_tolerance(1e-4))
}

#[test]
fn history_accumulates_in_release_order() {
    let mut vs = vintages(21);
    vs.swap(0, 2);
    let mut nowcaster = Nowcaster::new(config(), catalog()).unwrap();
    let summary = nowcaster.run(vs);

    assert!(summary.skipped.is_empty(), "{:?}", summary.skipped);
    let dates: Vec<NaiveDate> = summary.processed.iter().map(|o| o.release_date).collect();
    assert_eq!(
        dates,
        vec![date(2023, 12, 5), date(2023, 12, 15), date(2023, 12, 28), date(2024, 1, 10)]
    );

    let flags: Vec<(bool, bool)> = summary
        .processed
        .iter()
        .map(|o| (o.epoch_start, o.estimated))
        .collect();
    assert_eq!(flags, vec![(true, true), (false, false), (false, false), (true, true)]);
    assert_eq!(summary.processed[0].news_rows, 0);
    assert!(summary.processed[1].news_rows > 0);
    assert_eq!(summary.processed[3].news_rows, 0);
    assert_eq!(summary.processed[3].quarter, quarter(2024, 1));

    let nowcasts = nowcaster.nowcasts().records();
    assert_eq!(nowcasts.len(), 4);
    assert!(nowcasts.iter().all(|r| r.values.keys().map(String::as_str).eq(["RGDP"])));
    let finals = nowcaster.nowcasts().final_by_quarter();
    assert_eq!(finals[&quarter(2023, 4)].date, date(2023, 12, 28));
    assert_eq!(finals[&quarter(2024, 1)].date, date(2024, 1, 10));

    // Within an epoch parameters are held, so the news explains the whole
    // revision between consecutive nowcasts.
    for k in 1..3 {
        let total: f64 = nowcaster
            .news()
            .records()
            .iter()
            .filter(|r| r.date == dates[k])
            .map(|r| r.impact)
            .sum();
        let revision = nowcasts[k].values["RGDP"] - nowcasts[k - 1].values["RGDP"];
        assert_relative_eq!(total, revision, epsilon = 1e-10, max_relative = 1e-6);
    }
    assert!(
        nowcaster
            .news()
            .records()
            .iter()
            .all(|r| r.quarter == quarter(2023, 4) && !r.sector.is_empty())
    );

    let model = nowcaster.model().unwrap();
    assert_eq!(model.grid_start(), month(2015, 1));
    assert_eq!(nowcaster.book().len(), 2);
}

#[test]
fn failed_vintage_leaves_history_untouched() {
    let vs = vintages(22);
    let mut nowcaster = Nowcaster::new(config(), catalog()).unwrap();
    nowcaster.process(&vs[0]).unwrap();

    let empty = Vintage::new(
        date(2024, 1, 3),
        Panel::empty(month(2015, 1), MONTHLY.iter().map(|s| s.to_string()).collect()).unwrap(),
        vs[0].quarterly().clone(),
    )
    .unwrap();
    assert!(matches!(
        nowcaster.process(&empty),
        Err(PipelineError::Panel(_))
    ));
    assert_eq!(nowcaster.nowcasts().len(), 1);
    assert!(nowcaster.news().is_empty());
    assert_eq!(nowcaster.book().len(), 1);
    assert_eq!(nowcaster.model().unwrap().data_date(), date(2023, 12, 5));

    assert_eq!(
        nowcaster.process(&vs[0]).unwrap_err(),
        PipelineError::OutOfOrder {
            release_date: date(2023, 12, 5),
            last: date(2023, 12, 5)
        }
    );

    // The next good vintage still produces news against the last good one.
    let outcome = nowcaster.process(&vs[1]).unwrap();
    assert!(outcome.news_rows > 0);
}

#[test]
fn every_vintage_policy_reestimates() {
    let vs = vintages(23);
    let mut nowcaster =
        Nowcaster::new(config().with_refit(RefitPolicy::EveryVintage), catalog()).unwrap();
    let first = nowcaster.process(&vs[0]).unwrap();
    let params = nowcaster.model().unwrap().params().clone();
    let second = nowcaster.process(&vs[1]).unwrap();

    assert!(first.estimated && second.estimated);
    assert!(!second.epoch_start);
    assert_ne!(nowcaster.model().unwrap().params(), &params);
    assert_eq!(nowcaster.model().unwrap().estimation_date(), date(2023, 12, 15));
}

#[test]
fn reestimated_vintages_reconcile_with_consecutive_nowcasts() {
    let vs = vintages(25);
    let mut nowcaster =
        Nowcaster::new(config().with_refit(RefitPolicy::EveryVintage), catalog()).unwrap();
    let summary = nowcaster.run(vs[..3].to_vec());
    assert!(summary.skipped.is_empty(), "{:?}", summary.skipped);

    let nowcasts = nowcaster.nowcasts().records();
    for k in 1..3 {
        let rows: Vec<_> = nowcaster
            .news()
            .records()
            .iter()
            .filter(|r| r.date == nowcasts[k].date)
            .collect();
        let reestimation: Vec<_> = rows
            .iter()
            .filter(|r| r.update_kind == UpdateKind::Reestimation)
            .collect();
        assert_eq!(reestimation.len(), 1);
        assert!(reestimation[0].updated_variable.is_empty());

        let total: f64 = rows.iter().map(|r| r.impact).sum();
        let revision = nowcasts[k].values["RGDP"] - nowcasts[k - 1].values["RGDP"];
        assert_relative_eq!(total, revision, epsilon = 1e-10, max_relative = 1e-6);
    }
}

#[test]
fn rerun_supersedes_stored_rows() {
    let vs = vintages(24);
    let mut first = Nowcaster::new(config(), catalog()).unwrap();
    first.run(vs[..2].to_vec());
    let (nowcasts, news) = first.into_histories();
    let (n_nowcasts, n_news) = (nowcasts.len(), news.len());

    let mut again = Nowcaster::new(config(), catalog())
        .unwrap()
        .with_history(nowcasts.clone(), news.clone());
    again.run(vs[..2].to_vec());
    assert_eq!(again.nowcasts().len(), n_nowcasts);
    assert_eq!(again.news().len(), n_news);
    assert_eq!(again.nowcasts(), &nowcasts);
}

#[test]
fn rerun_from_a_later_epoch_start_drops_stale_news() {
    let vs = vintages(26);
    let mut first = Nowcaster::new(config(), catalog()).unwrap();
    first.run(vs[..3].to_vec());
    let (nowcasts, news) = first.into_histories();
    assert!(news.records().iter().any(|r| r.date == date(2023, 12, 15)));

    // 12-15 now opens the epoch, so it has no earlier vintage to explain.
    let mut again = Nowcaster::new(config(), catalog())
        .unwrap()
        .with_history(nowcasts, news);
    let summary = again.run(vs[1..3].to_vec());
    assert!(summary.processed[0].epoch_start);
    assert_eq!(summary.processed[0].news_rows, 0);
    assert!(again.news().records().iter().all(|r| r.date != date(2023, 12, 15)));
    assert!(again.news().records().iter().any(|r| r.date == date(2023, 12, 28)));
    assert_eq!(again.nowcasts().len(), 3);
}

#[test]
fn configured_aggregation_reaches_the_model() {
    let vs = vintages(27);
    let mut sum = Nowcaster::new(config(), catalog()).unwrap();
    let mut mm = Nowcaster::new(
        config().with_aggregation(TimeAggregation::MarianoMurasawa),
        catalog(),
    )
    .unwrap();
    assert_eq!(sum.spec().aggregation(), &TimeAggregation::Sum);
    assert_eq!(mm.spec().aggregation(), &TimeAggregation::MarianoMurasawa);

    let a = sum.process(&vs[0]).unwrap();
    let b = mm.process(&vs[0]).unwrap();
    assert!(a.nowcast.values["RGDP"].is_finite() && b.nowcast.values["RGDP"].is_finite());
    assert!((a.nowcast.values["RGDP"] - b.nowcast.values["RGDP"]).abs() > 1e-9);
}

#[test]
fn targets_must_be_quarterly_catalog_series() {
    for target in ["GDP", "IP"] {
        let err = Nowcaster::new(config().with_targets([target]), catalog()).unwrap_err();
        assert_eq!(
            err,
            PipelineError::UnknownTarget {
                target: target.to_string()
            }
        );
    }
}
