use chrono::NaiveDate;
use nowcast_calendar::{Month, Period, Quarter, period_range};

#[test]
fn full_year_of_months_maps_to_four_quarters() {
    let months = period_range(Month::new(2021, 1).unwrap(), Month::new(2021, 12).unwrap());
    assert_eq!(months.len(), 12);

    let quarters: Vec<Quarter> = months.iter().map(|m| m.quarter()).collect();
    for (i, q) in quarters.iter().enumerate() {
        assert_eq!(q.quarter() as usize, i / 3 + 1);
        assert_eq!(q.year(), 2021);
    }

    let ends: Vec<Month> = months.iter().copied().filter(|m| m.is_quarter_end()).collect();
    let expected: Vec<Month> = period_range(Quarter::new(2021, 1).unwrap(), Quarter::new(2021, 4).unwrap())
        .into_iter()
        .map(|q| q.last_month())
        .collect();
    assert_eq!(ends, expected);
}

#[test]
fn release_date_to_target_quarter() {
    let release = NaiveDate::from_ymd_opt(2023, 8, 14).unwrap();
    let q = Quarter::from_date(release);
    assert_eq!(q.to_string(), "2023Q3");
    assert_eq!(Month::from_date(release).quarter(), q);
    assert_eq!(q.last_month().to_string(), "2023-09");
}

#[test]
fn month_offsets_are_consistent_with_quarter_offsets() {
    let q = Quarter::new(2019, 4).unwrap();
    for k in -9..9 {
        let shifted = q.offset(k);
        assert_eq!(q.last_month().offset(3 * k), shifted.last_month());
    }
}

#[test]
fn negative_years_index_round_trip() {
    let m = Month::new(-1, 12).unwrap();
    assert_eq!(Month::from_index(m.index()), m);
    let q = Quarter::new(-1, 1).unwrap();
    assert_eq!(Quarter::from_index(q.index()), q);
}
