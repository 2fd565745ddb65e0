//! Valid-time index construction.
//!
//! Maps every (forecast reference time, lead time) pair onto the calendar
//! date an observation must correspond to. The resulting table is used to
//! pick observations out of a daily series and is attached to the
//! forecast-indexed products as their 2-D `valid_time` coordinate.
//!
//! Building an index is a pure calculation: the same inputs always produce
//! the same table, and any malformed input is rejected rather than clamped.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use ndarray::{Array2, ArrayView1, Axis};

use crate::calendar;
use crate::model::{IndexError, LeadTime};

// ---------------------------------------------------------------------------
// Index type
// ---------------------------------------------------------------------------

/// Table of valid dates indexed by `forecast_reference_time` (rows) and
/// `lead_time` (columns).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTimeIndex {
    inits: Vec<NaiveDate>,
    leads: Vec<LeadTime>,
    values: Array2<NaiveDate>,
}

impl ValidTimeIndex {
    /// Forecast reference times, in the order given to the builder.
    pub fn inits(&self) -> &[NaiveDate] {
        &self.inits
    }

    /// Lead times, in the order given to the builder.
    pub fn leads(&self) -> &[LeadTime] {
        &self.leads
    }

    /// The full `(init, lead)` table.
    pub fn values(&self) -> &Array2<NaiveDate> {
        &self.values
    }

    /// `(number of inits, number of leads)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.inits.len(), self.leads.len())
    }

    /// Valid date at positional indices. Panics when out of bounds, like
    /// ndarray indexing.
    pub fn at(&self, init_idx: usize, lead_idx: usize) -> NaiveDate {
        self.values[[init_idx, lead_idx]]
    }

    /// Valid date for a given init and lead, or `None` if either label is
    /// not on the index.
    pub fn get(&self, init: NaiveDate, lead: LeadTime) -> Option<NaiveDate> {
        let i = self.inits.binary_search(&init).ok()?;
        let j = self.leads.iter().position(|&l| l == lead)?;
        Some(self.values[[i, j]])
    }

    /// All valid dates for one lead time, ordered by init.
    pub fn lead_column(&self, lead_idx: usize) -> ArrayView1<'_, NaiveDate> {
        self.values.index_axis(Axis(1), lead_idx)
    }

    /// Earliest and latest valid date on the index.
    pub fn valid_range(&self) -> (NaiveDate, NaiveDate) {
        let mut iter = self.values.iter().copied();
        // Non-empty by construction.
        let first = iter.next().unwrap_or(NaiveDate::MIN);
        iter.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)))
    }

    /// Iterate `(init, lead, valid)` triples in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, LeadTime, NaiveDate)> + '_ {
        self.values
            .indexed_iter()
            .map(|((i, j), &valid)| (self.inits[i], self.leads[j], valid))
    }

    /// One sub-index per calendar year of the inits, in year order. Each
    /// keeps that year's inits and every lead.
    pub fn split_by_year(&self) -> Result<Vec<(i32, ValidTimeIndex)>, IndexError> {
        let mut years: BTreeMap<i32, Vec<NaiveDate>> = BTreeMap::new();
        for init in &self.inits {
            years.entry(init.year()).or_default().push(*init);
        }
        years
            .into_iter()
            .map(|(year, inits)| Ok((year, build_valid_times(&inits, &self.leads)?)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds the valid-time table `valid[init, lead] = init + lead days`.
///
/// `inits` must be non-empty and strictly increasing; `leads` must be
/// non-empty. Fails with `CalendarOverflow` if any sum leaves chrono's date
/// range.
pub fn build_valid_times(
    inits: &[NaiveDate],
    leads: &[LeadTime],
) -> Result<ValidTimeIndex, IndexError> {
    if inits.is_empty() {
        return Err(IndexError::EmptyInits);
    }
    if leads.is_empty() {
        return Err(IndexError::EmptyLeads);
    }
    for (position, pair) in inits.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(IndexError::NonIncreasingInits {
                position: position + 1,
                previous: pair[0],
                current: pair[1],
            });
        }
    }

    // The latest init plus the longest lead is the largest cell; if it fits
    // in chrono's range every other cell does too.
    let last = inits[inits.len() - 1];
    let longest = leads.iter().copied().max().unwrap_or(LeadTime(0));
    if last.checked_add_days(days(longest)).is_none() {
        return Err(IndexError::CalendarOverflow {
            init: last,
            lead_days: longest.days(),
        });
    }

    let values = Array2::from_shape_fn((inits.len(), leads.len()), |(i, j)| {
        inits[i] + days(leads[j])
    });

    Ok(ValidTimeIndex {
        inits: inits.to_vec(),
        leads: leads.to_vec(),
        values,
    })
}

fn days(lead: LeadTime) -> Days {
    Days::new(u64::from(lead.days()))
}

/// Valid times for the operational forecast calendar (weekly Thursdays of
/// 2020, 46 lead days).
pub fn forecast_valid_times() -> Result<ValidTimeIndex, IndexError> {
    let calendar = calendar::CalendarConfig::default();
    build_valid_times(&calendar.forecast_inits(), &calendar.leads())
}

/// Valid times for the reforecast calendar (the 2020 weekly pattern repeated
/// for 2000 through 2019, 46 lead days).
pub fn reforecast_valid_times() -> Result<ValidTimeIndex, IndexError> {
    let calendar = calendar::CalendarConfig::default();
    build_valid_times(&calendar.reforecast_inits(), &calendar.leads())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
