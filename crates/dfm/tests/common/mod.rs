//! Simulated three-factor panel shared by the integration tests.

#![allow(dead_code)]

use chrono::NaiveDate;
use ndarray::Array2;
use nowcast_calendar::{Month, Quarter};
use nowcast_dfm::{FactorSpec, TimeAggregation};
use nowcast_panel::{Frequency, Panel, SeriesCatalog, SeriesMeta, Vintage};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

pub const MONTHLY: [&str; 5] = ["IP", "RETAIL", "EMPL", "M3", "SPREAD"];

pub fn month(y: i32, m: u8) -> Month {
    Month::new(y, m).unwrap()
}

pub fn quarter(y: i32, q: u8) -> Quarter {
    Quarter::new(y, q).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Monthly data 2014-01..=2023-11 and RGDP 2014Q1..=2023Q3, released on
/// 2023-12-10.
///
/// Global, real and financial factors follow AR(1) processes; the real
/// series load on global + real, the financial ones on global + financial,
/// and RGDP is the three-month sum of a global + real combination.
pub fn simulated_vintage(seed: u64) -> Vintage {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let n = 119;
    let mut g = vec![0.0; n];
    let mut r = vec![0.0; n];
    let mut f = vec![0.0; n];
    for t in 1..n {
        g[t] = 0.6 * g[t - 1] + normal.sample(&mut rng);
        r[t] = 0.4 * r[t - 1] + normal.sample(&mut rng);
        f[t] = 0.5 * f[t - 1] + normal.sample(&mut rng);
    }

    let loadings = [(1.0, 0.8, 0.0), (0.7, 0.6, 0.0), (0.9, 0.4, 0.0), (0.8, 0.0, 0.9), (0.5, 0.0, 0.7)];
    let mut monthly = Array2::<f64>::zeros((n, MONTHLY.len()));
    for t in 0..n {
        for (j, (lg, lr, lf)) in loadings.iter().enumerate() {
            let common = lg * g[t] + lr * r[t] + lf * f[t];
            monthly[[t, j]] = 0.5 + 1.5 * (common + 0.5 * normal.sample(&mut rng));
        }
    }

    let n_q = 39;
    let mut quarterly = Array2::<f64>::zeros((n_q, 1));
    for k in 0..n_q {
        let end = 3 * k + 2;
        let sum: f64 = (0..3).map(|j| 0.5 * g[end - j] + 0.4 * r[end - j]).sum();
        quarterly[[k, 0]] = 2.0 + sum + 0.3 * normal.sample(&mut rng);
    }

    Vintage::new(
        date(2023, 12, 10),
        Panel::new(
            month(2014, 1),
            MONTHLY.iter().map(|s| s.to_string()).collect(),
            monthly,
        )
        .unwrap(),
        Panel::new(quarter(2014, 1), vec!["RGDP".to_string()], quarterly).unwrap(),
    )
    .unwrap()
}

pub fn catalog() -> SeriesCatalog {
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

/// Global + Real + Financial, one factor each, VAR(1).
pub fn three_factor_spec() -> FactorSpec {
    let mut multiplicities = std::collections::BTreeMap::new();
    multiplicities.insert("Global".to_string(), 1);
    FactorSpec::from_catalog(&catalog(), &multiplicities, 1, 1, TimeAggregation::Sum).unwrap()
}
