//! Forecast-indexed observation grids.
//!
//! Reshapes a daily observation series into the competition layout
//! `(forecast_reference_time, lead_time, latitude, longitude)` by looking up
//! each cell's valid date on the series.
//!
//! Cells hold the daily value on the valid date, not a weekly aggregate.
//! The `lead_time_weekly` part of the product file names refers to the
//! weekly cadence of the forecast reference times.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::{Array2, Array4, Axis, s};

use crate::grid::GriddedSeries;
use crate::model::{DIM_FORECAST_REFERENCE_TIME, DIM_LATITUDE, DIM_LEAD_TIME, DIM_LONGITUDE};
use crate::valid_time::ValidTimeIndex;

/// Observations arranged by forecast reference time and lead time.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastGrid {
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    pub index: ValidTimeIndex,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    /// `(init, lead, latitude, longitude)`
    pub values: Array4<f32>,
    /// Whether the series had an observation for the cell's valid date.
    pub available: Array2<bool>,
}

impl ForecastGrid {
    /// Picks the series value at every valid date of `index`. Valid dates the
    /// series does not cover are left `NaN` and marked unavailable.
    pub fn select(series: &GriddedSeries, index: &ValidTimeIndex) -> ForecastGrid {
        let (n_init, n_lead) = index.shape();
        let (_, n_lat, n_lon) = series.values.dim();
        let positions = series.time_positions();

        let mut values = Array4::<f32>::from_elem((n_init, n_lead, n_lat, n_lon), f32::NAN);
        let mut available = Array2::<bool>::from_elem((n_init, n_lead), false);
        for ((i, j), valid) in index.values().indexed_iter() {
            let Some(&t) = positions.get(valid) else {
                continue;
            };
            values
                .slice_mut(s![i, j, .., ..])
                .assign(&series.values.index_axis(Axis(0), t));
            available[[i, j]] = true;
        }

        ForecastGrid {
            name: series.name.clone(),
            attrs: series.attrs.clone(),
            index: index.clone(),
            latitude: series.latitude.clone(),
            longitude: series.longitude.clone(),
            values,
            available,
        }
    }

    /// Dimension names of `values`, in order.
    pub fn dims(&self) -> [&'static str; 4] {
        [
            DIM_FORECAST_REFERENCE_TIME,
            DIM_LEAD_TIME,
            DIM_LATITUDE,
            DIM_LONGITUDE,
        ]
    }

    /// True when `name` is a dimension whose length agrees with the index.
    pub fn has_dim(&self, name: &str) -> bool {
        let Some(axis) = self.dims().iter().position(|d| *d == name) else {
            return false;
        };
        let (n_init, n_lead) = self.index.shape();
        let expected = [n_init, n_lead, self.latitude.len(), self.longitude.len()];
        self.values.shape()[axis] == expected[axis]
    }

    /// Number of `(init, lead)` cells.
    pub fn cell_count(&self) -> usize {
        self.available.len()
    }

    /// Number of `(init, lead)` cells with no observation.
    pub fn missing_cells(&self) -> usize {
        self.available.iter().filter(|a| !**a).count()
    }

    /// Valid dates the series did not cover, in index order.
    pub fn missing_valid_times(&self) -> Vec<NaiveDate> {
        self.index
            .values()
            .iter()
            .zip(self.available.iter())
            .filter(|(_, a)| !**a)
            .map(|(d, _)| *d)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LeadTime;
    use crate::valid_time::build_valid_times;
    use ndarray::Array;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// 1x2 grid; value on day `t` is `t` at the first point and `-t` at the second.
    fn series(start: NaiveDate, n: usize) -> GriddedSeries {
        let time = start.iter_days().take(n).collect();
        let values = Array::from_shape_fn((n, 1, 2), |(t, _, j)| {
            if j == 0 { t as f32 } else { -(t as f32) }
        });
        GriddedSeries::new("t2m", time, vec![10.0], vec![0.0, 1.5], values).unwrap()
    }

    #[test]
    fn test_select_picks_value_on_valid_date() {
        let obs = series(ymd(2020, 1, 1), 30);
        let inits = [ymd(2020, 1, 2), ymd(2020, 1, 9)];
        let index = build_valid_times(&inits, &[LeadTime(0), LeadTime(3)]).unwrap();
        let grid = ForecastGrid::select(&obs, &index);

        assert_eq!(grid.values.shape(), &[2, 2, 1, 2]);
        // 2020-01-09 + 3 days = 2020-01-12, day index 11.
        assert_eq!(grid.values[[1, 1, 0, 0]], 11.0);
        assert_eq!(grid.values[[1, 1, 0, 1]], -11.0);
        assert_eq!(grid.missing_cells(), 0);
    }

    #[test]
    fn test_select_marks_uncovered_valid_dates() {
        let obs = series(ymd(2020, 1, 1), 10);
        let inits = [ymd(2020, 1, 2), ymd(2020, 1, 9)];
        let index = build_valid_times(&inits, &[LeadTime(0), LeadTime(3)]).unwrap();
        let grid = ForecastGrid::select(&obs, &index);

        assert_eq!(grid.missing_cells(), 1);
        assert_eq!(grid.missing_valid_times(), vec![ymd(2020, 1, 12)]);
        assert!(grid.values[[1, 1, 0, 0]].is_nan());
        assert_eq!(grid.values[[1, 0, 0, 0]], 8.0);
    }

    #[test]
    fn test_has_both_forecast_axes() {
        let obs = series(ymd(2020, 1, 1), 5);
        let index = build_valid_times(&[ymd(2020, 1, 2)], &[LeadTime(0)]).unwrap();
        let grid = ForecastGrid::select(&obs, &index);
        assert!(grid.has_dim("forecast_reference_time"));
        assert!(grid.has_dim("lead_time"));
        assert!(!grid.has_dim("time"));
    }

    #[test]
    fn test_cells_hold_daily_values_not_weekly_means() {
        let obs = series(ymd(2020, 1, 1), 60);
        let leads: Vec<LeadTime> = (0..14).map(LeadTime).collect();
        let index = build_valid_times(&[ymd(2020, 1, 2)], &leads).unwrap();
        let grid = ForecastGrid::select(&obs, &index);

        for j in 1..14 {
            let step = grid.values[[0, j, 0, 0]] - grid.values[[0, j - 1, 0, 0]];
            assert_eq!(step, 1.0, "lead {} differs from lead {} by one day", j, j - 1);
        }
    }
}
