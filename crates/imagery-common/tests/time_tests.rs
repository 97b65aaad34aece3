//! Tests for acquisition date expansion.

use chrono::NaiveDate;
use imagery_common::TimeInterval;
use test_utils::fixtures;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

#[test]
fn test_three_listed_dates_yield_three_instants() {
    let interval = TimeInterval::from_date_strings(&fixtures::dates::THREE_DAYS).unwrap();
    let dates = interval.acquisition_dates(today()).unwrap();
    assert_eq!(dates.len(), 3);
    assert!(dates.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(dates[0].to_string(), "2019-08-01");
    assert_eq!(dates[2].to_string(), "2019-08-03");
}

#[test]
fn test_single_date_yields_one_instant() {
    let interval = TimeInterval::from_date_strings(&[fixtures::dates::SINGLE_DAY]).unwrap();
    assert!(matches!(interval, TimeInterval::Single(_)));
    let dates = interval.acquisition_dates(today()).unwrap();
    assert_eq!(dates.len(), 1);
}

#[test]
fn test_days_back_from_today() {
    let dates = TimeInterval::DaysBack(10).acquisition_dates(today()).unwrap();
    assert_eq!(dates.len(), 11);
    assert_eq!(*dates.last().unwrap(), today());
}

#[test]
fn test_zero_days_back_is_today_only() {
    let dates = TimeInterval::DaysBack(0).acquisition_dates(today()).unwrap();
    assert_eq!(dates, vec![today()]);
}

#[test]
fn test_invalid_date_string() {
    assert!(TimeInterval::from_date_strings(&["2019-13-01"]).is_err());
    assert!(TimeInterval::from_date_strings::<&str>(&[]).is_err());
}
