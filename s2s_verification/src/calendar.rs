//! Forecast calendars for the S2S competition.
//!
//! Defines which forecast reference times are issued (weekly Thursdays
//! starting on 2 January) and the fixed lead-time horizon. This is the single
//! source of truth for the competition time grid; other modules should take
//! inits and leads from here rather than hardcoding dates.

use chrono::{Datelike, Days, NaiveDate};
use serde::Deserialize;

use crate::model::LeadTime;

// ---------------------------------------------------------------------------
// Competition constants
// ---------------------------------------------------------------------------

/// Number of daily lead times (0 through 45 days).
pub const LEAD_DAYS: u32 = 46;

/// Spacing between consecutive forecast reference times.
pub const INIT_INTERVAL_DAYS: u32 = 7;

/// Year of the operational forecasts.
pub const FORECAST_YEAR: i32 = 2020;

/// First and last reforecast year, inclusive.
pub const REFORECAST_START_YEAR: i32 = 2000;
pub const REFORECAST_END_YEAR: i32 = 2019;

// ---------------------------------------------------------------------------
// Calendar description
// ---------------------------------------------------------------------------

/// Describes both competition calendars. `Default` gives the 2020
/// operational / 2000 to 2019 reforecast setup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalendarConfig {
    #[serde(default = "default_forecast_year")]
    pub forecast_year: i32,
    #[serde(default = "default_reforecast_start_year")]
    pub reforecast_start_year: i32,
    #[serde(default = "default_reforecast_end_year")]
    pub reforecast_end_year: i32,
    #[serde(default = "default_lead_days")]
    pub lead_days: u32,
    #[serde(default = "default_init_interval_days")]
    pub init_interval_days: u32,
}

fn default_forecast_year() -> i32 {
    FORECAST_YEAR
}
fn default_reforecast_start_year() -> i32 {
    REFORECAST_START_YEAR
}
fn default_reforecast_end_year() -> i32 {
    REFORECAST_END_YEAR
}
fn default_lead_days() -> u32 {
    LEAD_DAYS
}
fn default_init_interval_days() -> u32 {
    INIT_INTERVAL_DAYS
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            forecast_year: FORECAST_YEAR,
            reforecast_start_year: REFORECAST_START_YEAR,
            reforecast_end_year: REFORECAST_END_YEAR,
            lead_days: LEAD_DAYS,
            init_interval_days: INIT_INTERVAL_DAYS,
        }
    }
}

impl CalendarConfig {
    /// Lead times `0..lead_days`, identical for both calendars.
    pub fn leads(&self) -> Vec<LeadTime> {
        (0..self.lead_days).map(LeadTime).collect()
    }

    /// Inits of the operational calendar.
    pub fn forecast_inits(&self) -> Vec<NaiveDate> {
        year_inits(self.forecast_year, self.init_interval_days)
    }

    /// Inits of the reforecast calendar: each year restarts on 2 January, so
    /// the gap across a year boundary is not a whole interval.
    pub fn reforecast_inits(&self) -> Vec<NaiveDate> {
        (self.reforecast_start_year..=self.reforecast_end_year)
            .flat_map(|year| year_inits(year, self.init_interval_days))
            .collect()
    }

    /// Years covered by the reforecast calendar.
    pub fn reforecast_years(&self) -> std::ops::RangeInclusive<i32> {
        self.reforecast_start_year..=self.reforecast_end_year
    }
}

/// Every `interval_days`-th day from `year`-01-02 through `year`-12-31.
///
/// Returns an empty vector for years outside chrono's range or a zero
/// interval.
pub fn year_inits(year: i32, interval_days: u32) -> Vec<NaiveDate> {
    let (Some(start), Some(end)) = (
        NaiveDate::from_ymd_opt(year, 1, 2),
        NaiveDate::from_ymd_opt(year, 12, 31),
    ) else {
        return Vec::new();
    };
    if interval_days == 0 {
        return Vec::new();
    }

    let step = Days::new(u64::from(interval_days));
    std::iter::successors(Some(start), |d| d.checked_add_days(step))
        .take_while(|d| *d <= end)
        .collect()
}

/// The day-of-year pattern of a list of inits, used to compare calendars
/// across years.
pub fn ordinals(inits: &[NaiveDate]) -> Vec<u32> {
    inits.iter().map(|d| d.ordinal()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
