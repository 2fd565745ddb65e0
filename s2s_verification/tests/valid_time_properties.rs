/// Valid-time index laws and competition calendar scenarios.
///
/// These tests exercise the public index API only:
/// 1. Every cell equals its init plus its lead
/// 2. Building twice gives the same index
/// 3. Each lead column increases with the init
/// 4. The operational and reforecast calendars have the expected layout
///
/// Run with: cargo test --test valid_time_properties

use chrono::{Datelike, NaiveDate, Weekday};

use s2s_verification::calendar::{CalendarConfig, ordinals};
use s2s_verification::valid_time::{forecast_valid_times, reforecast_valid_times};
use s2s_verification::{IndexError, LeadTime, build_valid_times};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn all_leads() -> Vec<LeadTime> {
    CalendarConfig::default().leads()
}

// ---------------------------------------------------------------------------
// Laws
// ---------------------------------------------------------------------------

#[test]
fn test_every_cell_is_init_plus_lead() {
    let index = reforecast_valid_times().unwrap();
    let mut cells = 0;
    for (init, lead, valid) in index.iter() {
        assert_eq!(
            (valid - init).num_days(),
            i64::from(lead.days()),
            "cell ({}, {}) has valid date {}",
            init,
            lead,
            valid
        );
        cells += 1;
    }
    assert_eq!(cells, 1045 * 46);
}

#[test]
fn test_build_is_idempotent() {
    let inits = CalendarConfig::default().forecast_inits();
    let first = build_valid_times(&inits, &all_leads()).unwrap();
    let second = build_valid_times(&inits, &all_leads()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_lead_columns_strictly_increase() {
    let index = reforecast_valid_times().unwrap();
    for j in 0..index.shape().1 {
        let column = index.lead_column(j).to_vec();
        for pair in column.windows(2) {
            assert!(pair[0] < pair[1], "lead {} not increasing: {:?}", j, pair);
        }
    }
}

#[test]
fn test_shape_is_inits_by_46() {
    for inits in [
        vec![ymd(2020, 1, 2)],
        CalendarConfig::default().forecast_inits(),
        CalendarConfig::default().reforecast_inits(),
    ] {
        let index = build_valid_times(&inits, &all_leads()).unwrap();
        assert_eq!(index.shape(), (inits.len(), 46));
        assert_eq!(index.values().dim(), (inits.len(), 46));
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_two_inits_two_leads() {
    let inits = [ymd(2020, 1, 2), ymd(2020, 1, 9)];
    let index = build_valid_times(&inits, &[LeadTime(0), LeadTime(1)]).unwrap();
    assert_eq!(index.get(ymd(2020, 1, 2), LeadTime(0)), Some(ymd(2020, 1, 2)));
    assert_eq!(index.get(ymd(2020, 1, 2), LeadTime(1)), Some(ymd(2020, 1, 3)));
    assert_eq!(index.get(ymd(2020, 1, 9), LeadTime(0)), Some(ymd(2020, 1, 9)));
    assert_eq!(index.get(ymd(2020, 1, 9), LeadTime(1)), Some(ymd(2020, 1, 10)));
}

#[test]
fn test_operational_calendar() {
    let index = forecast_valid_times().unwrap();
    let inits = index.inits();
    assert_eq!(inits.len(), 53);
    assert_eq!(inits[0], ymd(2020, 1, 2));
    assert!(*inits.last().unwrap() <= ymd(2020, 12, 31));
    for pair in inits.windows(2) {
        assert_eq!((pair[1] - pair[0]).num_days(), 7);
    }
    assert!(inits.iter().all(|d| d.weekday() == Weekday::Thu));
    assert_eq!(index.valid_range(), (ymd(2020, 1, 2), ymd(2021, 2, 14)));
}

#[test]
fn test_reforecast_calendar_repeats_2020_pattern() {
    let index = reforecast_valid_times().unwrap();
    let years: Vec<i32> = index.inits().iter().map(|d| d.year()).collect();
    assert_eq!(years.first(), Some(&2000));
    assert_eq!(years.last(), Some(&2019));

    let calendar = CalendarConfig::default();
    let pattern_2020 = ordinals(&calendar.forecast_inits());
    for year in calendar.reforecast_years() {
        let year_inits: Vec<NaiveDate> =
            index.inits().iter().copied().filter(|d| d.year() == year).collect();
        assert_eq!(year_inits[0], ymd(year, 1, 2), "{} restarts on Jan 2", year);
        // Same offsets from Jan 2 as in 2020.
        let days_from_jan2: Vec<i64> = year_inits
            .iter()
            .map(|d| (*d - ymd(year, 1, 2)).num_days())
            .collect();
        let expected: Vec<i64> = pattern_2020
            .iter()
            .take(year_inits.len())
            .map(|o| i64::from(*o) - 2)
            .collect();
        assert_eq!(days_from_jan2, expected, "{} weekly pattern", year);
    }
}

#[test]
fn test_reforecast_seam_is_not_weekly() {
    let index = reforecast_valid_times().unwrap();
    let inits = index.inits();
    let seam = inits.iter().position(|d| *d == ymd(2001, 1, 2)).unwrap();
    assert_eq!(inits[seam - 1], ymd(2000, 12, 31), "leap year ends on Dec 31");
    assert_eq!((inits[seam] - inits[seam - 1]).num_days(), 2);

    let seam = inits.iter().position(|d| *d == ymd(2002, 1, 2)).unwrap();
    assert_eq!(inits[seam - 1], ymd(2001, 12, 25));
    assert_eq!((inits[seam] - inits[seam - 1]).num_days(), 8);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn test_invalid_inputs_are_rejected() {
    assert_eq!(build_valid_times(&[], &[LeadTime(0)]), Err(IndexError::EmptyInits));
    assert_eq!(build_valid_times(&[ymd(2020, 1, 2)], &[]), Err(IndexError::EmptyLeads));
    assert!(matches!(
        build_valid_times(&[ymd(2020, 1, 2), ymd(2020, 1, 2)], &[LeadTime(0)]),
        Err(IndexError::NonIncreasingInits { position: 1, .. })
    ));
    assert!(matches!(
        build_valid_times(&[ymd(2020, 1, 9), ymd(2020, 1, 2)], &[LeadTime(0)]),
        Err(IndexError::NonIncreasingInits { .. })
    ));
}
