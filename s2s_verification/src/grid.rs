//! In-memory gridded observation series and the transforms applied to them.
//!
//! A `GriddedSeries` holds one variable on a `(time, latitude, longitude)`
//! grid with `NaN` marking missing cells. The build pipelines chain the
//! operations here: member averaging, time trimming, unit conversion,
//! regridding onto the reference grid and weekly aggregation.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Days, NaiveDate, Weekday};
use ndarray::{Array3, Axis, s};

use crate::reference::ReferenceGrid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("values have shape {found:?}, axes imply {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    #[error("time axis not increasing at position {position}: {current} after {previous}")]
    UnsortedTime {
        position: usize,
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("cannot combine series: {0}")]
    GridMismatch(String),

    #[error("no time steps on or after {from}")]
    EmptySelection { from: NaiveDate },

    #[error("weekly resampling needs at least two Thursdays, found {found}")]
    MissingThursday { found: usize },

    #[error("no series given")]
    NoMembers,
}

// ---------------------------------------------------------------------------
// Series type
// ---------------------------------------------------------------------------

/// One observed variable on a `(time, latitude, longitude)` grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedSeries {
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    pub time: Vec<NaiveDate>,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub values: Array3<f32>,
}

impl GriddedSeries {
    /// Builds a series, checking the value shape against the axes and that
    /// the time axis is strictly increasing.
    pub fn new(
        name: impl Into<String>,
        time: Vec<NaiveDate>,
        latitude: Vec<f64>,
        longitude: Vec<f64>,
        values: Array3<f32>,
    ) -> Result<Self, GridError> {
        let expected = (time.len(), latitude.len(), longitude.len());
        if values.dim() != expected {
            return Err(GridError::ShapeMismatch {
                expected,
                found: values.dim(),
            });
        }
        check_increasing(&time)?;

        Ok(Self {
            name: name.into(),
            attrs: BTreeMap::new(),
            time,
            latitude,
            longitude,
            values,
        })
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Adds a constant to every value (e.g. Celsius to Kelvin).
    pub fn add_offset(&mut self, offset: f32) {
        self.values.mapv_inplace(|v| v + offset);
    }

    /// Keeps only time steps on or after `from`.
    pub fn since(self, from: NaiveDate) -> Result<Self, GridError> {
        let start = self.time.partition_point(|d| *d < from);
        if start == self.time.len() {
            return Err(GridError::EmptySelection { from });
        }
        let values = self.values.slice(s![start.., .., ..]).to_owned();
        Ok(Self {
            time: self.time[start..].to_vec(),
            values,
            ..self
        })
    }

    /// Replaces the time axis with consecutive days starting at the first
    /// time step, one per existing step.
    pub fn rebuild_daily_axis(&mut self) {
        let Some(&first) = self.time.first() else {
            return;
        };
        self.time = first
            .iter_days()
            .take(self.time.len())
            .collect();
    }

    /// Position of each date on the time axis.
    pub fn time_positions(&self) -> HashMap<NaiveDate, usize> {
        self.time.iter().enumerate().map(|(i, d)| (*d, i)).collect()
    }

    fn same_grid(&self, other: &GriddedSeries) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

fn check_increasing(time: &[NaiveDate]) -> Result<(), GridError> {
    for (position, pair) in time.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(GridError::UnsortedTime {
                position: position + 1,
                previous: pair[0],
                current: pair[1],
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Combining series
// ---------------------------------------------------------------------------

/// Concatenates yearly pieces of one variable along time. Pieces must share
/// the spatial grid and follow each other in time.
pub fn concat_time(parts: Vec<GriddedSeries>) -> Result<GriddedSeries, GridError> {
    let mut iter = parts.into_iter();
    let first = iter.next().ok_or(GridError::NoMembers)?;
    let rest: Vec<GriddedSeries> = iter.collect();
    if rest.is_empty() {
        return Ok(first);
    }

    let mut time = first.time.clone();
    let mut views = vec![first.values.view()];
    for part in &rest {
        if !first.same_grid(part) {
            return Err(GridError::GridMismatch(format!(
                "'{}' pieces are on different spatial grids",
                first.name
            )));
        }
        time.extend_from_slice(&part.time);
        views.push(part.values.view());
    }
    let values = ndarray::concatenate(Axis(0), &views)
        .map_err(|e| GridError::GridMismatch(e.to_string()))?;

    let mut combined = GriddedSeries::new(
        first.name.clone(),
        time,
        first.latitude.clone(),
        first.longitude.clone(),
        values,
    )?;
    combined.attrs = first.attrs.clone();
    Ok(combined)
}

/// Cell-wise mean of several members on the same grid and time axis,
/// ignoring missing members. Attributes come from the first member.
pub fn member_mean(members: &[GriddedSeries]) -> Result<GriddedSeries, GridError> {
    let first = members.first().ok_or(GridError::NoMembers)?;
    for member in &members[1..] {
        if member.time != first.time || !first.same_grid(member) {
            return Err(GridError::GridMismatch(format!(
                "'{}' and '{}' do not share time and grid",
                first.name, member.name
            )));
        }
    }

    let mut values = Array3::<f32>::zeros(first.values.dim());
    for (idx, out) in values.indexed_iter_mut() {
        *out = nan_mean(members.iter().map(|m| m.values[idx]));
    }

    Ok(GriddedSeries {
        name: first.name.clone(),
        attrs: first.attrs.clone(),
        time: first.time.clone(),
        latitude: first.latitude.clone(),
        longitude: first.longitude.clone(),
        values,
    })
}

/// Mean of the finite values, or `NaN` if there are none.
fn nan_mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values
        .filter(|v| !v.is_nan())
        .fold((0.0f64, 0usize), |(s, n), v| (s + f64::from(v), n + 1));
    if count == 0 {
        f32::NAN
    } else {
        (sum / count as f64) as f32
    }
}

// ---------------------------------------------------------------------------
// Regridding
// ---------------------------------------------------------------------------

/// Locates `x` on a monotonic axis: returns the lower node and the
/// fractional distance to the next one. `None` outside the axis.
fn bracket(axis: &[f64], x: f64) -> Option<(usize, f64)> {
    let n = axis.len();
    if n == 0 || !x.is_finite() {
        return None;
    }
    if n == 1 {
        return (axis[0] == x).then_some((0, 0.0));
    }

    let ascending = axis[n - 1] >= axis[0];
    let (lo, hi) = if ascending {
        (axis[0], axis[n - 1])
    } else {
        (axis[n - 1], axis[0])
    };
    if x < lo || x > hi {
        return None;
    }

    let pos = if ascending {
        axis.partition_point(|&a| a <= x)
    } else {
        axis.partition_point(|&a| a >= x)
    };
    let i = pos.saturating_sub(1).min(n - 2);
    let span = axis[i + 1] - axis[i];
    let t = if span == 0.0 { 0.0 } else { (x - axis[i]) / span };
    Some((i, t.clamp(0.0, 1.0)))
}

impl GriddedSeries {
    /// Bilinear interpolation onto the reference latitude/longitude grid.
    ///
    /// Target points outside the source coverage, or touching a missing
    /// source cell, are `NaN`. Longitudes are not wrapped.
    pub fn interp_like(&self, target: &ReferenceGrid) -> GriddedSeries {
        let nt = self.time.len();
        let mut values =
            Array3::<f32>::from_elem((nt, target.latitude.len(), target.longitude.len()), f32::NAN);

        for (a, &lat) in target.latitude.iter().enumerate() {
            let Some((i, ty)) = bracket(&self.latitude, lat) else {
                continue;
            };
            for (b, &lon) in target.longitude.iter().enumerate() {
                let Some((j, tx)) = bracket(&self.longitude, lon) else {
                    continue;
                };
                let corners = [
                    (i, j, (1.0 - ty) * (1.0 - tx)),
                    (i + 1, j, ty * (1.0 - tx)),
                    (i, j + 1, (1.0 - ty) * tx),
                    (i + 1, j + 1, ty * tx),
                ];
                for t in 0..nt {
                    let mut acc = 0.0f64;
                    let mut missing = false;
                    for &(ci, cj, w) in &corners {
                        if w == 0.0 {
                            continue;
                        }
                        let v = self.values[[t, ci, cj]];
                        if v.is_nan() {
                            missing = true;
                            break;
                        }
                        acc += w * f64::from(v);
                    }
                    values[[t, a, b]] = if missing { f32::NAN } else { acc as f32 };
                }
            }
        }

        GriddedSeries {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
            time: self.time.clone(),
            latitude: target.latitude.clone(),
            longitude: target.longitude.clone(),
            values,
        }
    }
}

// ---------------------------------------------------------------------------
// Weekly aggregation
// ---------------------------------------------------------------------------

impl GriddedSeries {
    /// The date weekly bins are anchored on: the second Thursday of the
    /// series. Forecasts are issued on Thursdays, so each bin runs Thursday
    /// to Wednesday.
    pub fn weekly_anchor(&self) -> Result<NaiveDate, GridError> {
        let thursdays: Vec<NaiveDate> = self
            .time
            .iter()
            .copied()
            .filter(|d| d.weekday() == Weekday::Thu)
            .take(2)
            .collect();
        match thursdays.as_slice() {
            [_, second] => Ok(*second),
            other => Err(GridError::MissingThursday { found: other.len() }),
        }
    }

    /// Seven-day means starting at the weekly anchor, labelled by bin start.
    ///
    /// Bins are contiguous from the anchor to the last time step; a bin with
    /// no finite values is `NaN`. The last bin may be partial.
    pub fn weekly_mean(&self) -> Result<GriddedSeries, GridError> {
        let anchor = self.weekly_anchor()?;

        let mut bins: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, date) in self.time.iter().enumerate() {
            if *date < anchor {
                continue;
            }
            bins.entry((*date - anchor).num_days() / 7).or_default().push(idx);
        }
        let n_bins = bins.keys().next_back().map_or(0, |k| *k as usize + 1);

        let (_, nlat, nlon) = self.values.dim();
        let mut values = Array3::<f32>::from_elem((n_bins, nlat, nlon), f32::NAN);
        let mut time = Vec::with_capacity(n_bins);
        for k in 0..n_bins {
            time.push(anchor + Days::new(7 * k as u64));
            let Some(members) = bins.get(&(k as i64)) else {
                continue;
            };
            for a in 0..nlat {
                for b in 0..nlon {
                    values[[k, a, b]] = nan_mean(members.iter().map(|&t| self.values[[t, a, b]]));
                }
            }
        }

        let mut weekly = GriddedSeries::new(
            self.name.clone(),
            time,
            self.latitude.clone(),
            self.longitude.clone(),
            values,
        )?;
        weekly.attrs = self.attrs.clone();
        Ok(weekly)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn daily(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
        start.iter_days().take(n).collect()
    }

    /// A 1x1 series whose value on day `i` is `i`.
    fn ramp(start: NaiveDate, n: usize) -> GriddedSeries {
        let values = Array::from_shape_fn((n, 1, 1), |(t, _, _)| t as f32);
        GriddedSeries::new("t", daily(start, n), vec![0.0], vec![0.0], values).unwrap()
    }

    #[test]
    fn test_new_rejects_wrong_shape() {
        let result = GriddedSeries::new(
            "t",
            daily(ymd(2020, 1, 1), 3),
            vec![0.0, 1.0],
            vec![0.0],
            Array3::zeros((3, 1, 1)),
        );
        assert!(matches!(result, Err(GridError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_new_rejects_unsorted_time() {
        let time = vec![ymd(2020, 1, 2), ymd(2020, 1, 1)];
        let result = GriddedSeries::new("t", time, vec![0.0], vec![0.0], Array3::zeros((2, 1, 1)));
        assert!(matches!(result, Err(GridError::UnsortedTime { position: 1, .. })));
    }

    #[test]
    fn test_since_trims_leading_days() {
        let series = ramp(ymd(2001, 12, 20), 20).since(ymd(2001, 12, 24)).unwrap();
        assert_eq!(series.time[0], ymd(2001, 12, 24));
        assert_eq!(series.values[[0, 0, 0]], 4.0);
        assert_eq!(series.time.len(), 16);
    }

    #[test]
    fn test_since_past_end_is_an_error() {
        let result = ramp(ymd(2001, 1, 1), 5).since(ymd(2002, 1, 1));
        assert_eq!(result, Err(GridError::EmptySelection { from: ymd(2002, 1, 1) }));
    }

    #[test]
    fn test_member_mean_skips_missing_member() {
        let mut tmin = ramp(ymd(2020, 1, 1), 2);
        let tmax = ramp(ymd(2020, 1, 1), 2);
        tmin.values[[0, 0, 0]] = f32::NAN;
        tmin.values[[1, 0, 0]] = -1.0;
        let mean = member_mean(&[tmin, tmax]).unwrap();
        assert_eq!(mean.values[[0, 0, 0]], 0.0, "NaN member is ignored");
        assert_eq!(mean.values[[1, 0, 0]], 0.0);
    }

    #[test]
    fn test_member_mean_requires_shared_time() {
        let a = ramp(ymd(2020, 1, 1), 2);
        let b = ramp(ymd(2020, 1, 2), 2);
        assert!(matches!(member_mean(&[a, b]), Err(GridError::GridMismatch(_))));
    }

    #[test]
    fn test_concat_time_appends_years() {
        let a = ramp(ymd(2019, 12, 30), 2);
        let b = ramp(ymd(2020, 1, 1), 3);
        let joined = concat_time(vec![a, b]).unwrap();
        assert_eq!(joined.time.len(), 5);
        assert_eq!(joined.values[[2, 0, 0]], 0.0);
    }

    #[test]
    fn test_concat_time_rejects_overlap() {
        let a = ramp(ymd(2020, 1, 1), 3);
        let b = ramp(ymd(2020, 1, 2), 3);
        assert!(matches!(concat_time(vec![a, b]), Err(GridError::UnsortedTime { .. })));
    }

    #[test]
    fn test_rebuild_daily_axis_closes_gaps() {
        let time = vec![ymd(1979, 1, 1), ymd(1979, 1, 3), ymd(1979, 1, 9)];
        let mut series =
            GriddedSeries::new("t", time, vec![0.0], vec![0.0], Array3::zeros((3, 1, 1))).unwrap();
        series.rebuild_daily_axis();
        assert_eq!(series.time, daily(ymd(1979, 1, 1), 3));
    }

    #[test]
    fn test_bracket_ascending_and_descending() {
        assert_eq!(bracket(&[0.0, 1.0, 2.0], 0.5), Some((0, 0.5)));
        assert_eq!(bracket(&[0.0, 1.0, 2.0], 2.0), Some((1, 1.0)));
        assert_eq!(bracket(&[2.0, 1.0, 0.0], 1.5), Some((0, 0.5)));
        assert_eq!(bracket(&[2.0, 1.0, 0.0], 0.0), Some((1, 1.0)));
        assert_eq!(bracket(&[0.0, 1.0], 1.5), None);
    }

    #[test]
    fn test_interp_exact_at_nodes_and_linear_between() {
        // value = lat + 10 * lon on a 2x2 source grid
        let values = Array::from_shape_fn((1, 2, 2), |(_, i, j)| i as f32 + 10.0 * j as f32);
        let series =
            GriddedSeries::new("t", vec![ymd(2020, 1, 1)], vec![0.0, 1.0], vec![0.0, 1.0], values)
                .unwrap();
        let target = ReferenceGrid::new(vec![1.0, 0.5], vec![0.0, 0.5, 2.0]);
        let out = series.interp_like(&target);

        assert_eq!(out.values[[0, 0, 0]], 1.0);
        assert!((out.values[[0, 1, 1]] - 5.5).abs() < 1e-6);
        assert!(out.values[[0, 0, 2]].is_nan(), "outside source coverage");
    }

    #[test]
    fn test_interp_propagates_missing_neighbour() {
        let mut values = Array3::<f32>::ones((1, 2, 2));
        values[[0, 1, 1]] = f32::NAN;
        let series =
            GriddedSeries::new("t", vec![ymd(2020, 1, 1)], vec![0.0, 1.0], vec![0.0, 1.0], values)
                .unwrap();
        let out = series.interp_like(&ReferenceGrid::new(vec![0.0, 0.5], vec![0.0, 0.5]));
        assert_eq!(out.values[[0, 0, 0]], 1.0, "exact node ignores zero-weight corners");
        assert!(out.values[[0, 1, 1]].is_nan());
    }

    #[test]
    fn test_weekly_anchor_is_second_thursday() {
        // 2001-12-24 is a Monday; Thursdays are 12-27 and 2002-01-03.
        let series = ramp(ymd(2001, 12, 24), 14);
        assert_eq!(series.weekly_anchor().unwrap(), ymd(2002, 1, 3));
    }

    #[test]
    fn test_weekly_anchor_needs_two_thursdays() {
        let series = ramp(ymd(2020, 1, 1), 5);
        assert_eq!(series.weekly_anchor(), Err(GridError::MissingThursday { found: 1 }));
    }

    #[test]
    fn test_weekly_mean_bins_thursday_to_wednesday() {
        let series = ramp(ymd(2001, 12, 24), 24); // through 2002-01-16
        let weekly = series.weekly_mean().unwrap();

        assert_eq!(weekly.time, vec![ymd(2002, 1, 3), ymd(2002, 1, 10)]);
        // Day indices 10..=16 average to 13, 17..=23 to 20.
        assert_eq!(weekly.values[[0, 0, 0]], 13.0);
        assert_eq!(weekly.values[[1, 0, 0]], 20.0);
    }

    #[test]
    fn test_weekly_mean_skips_missing_days() {
        let mut series = ramp(ymd(2001, 12, 24), 17);
        series.values[[10, 0, 0]] = f32::NAN;
        let weekly = series.weekly_mean().unwrap();
        assert_eq!(weekly.values[[0, 0, 0]], 13.5);
    }
}
