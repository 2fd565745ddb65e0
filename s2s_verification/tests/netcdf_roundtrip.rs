//! NetCDF reading and writing against real files.
//!
//! Requires libnetcdf. Run with: cargo test --features netcdf --test netcdf_roundtrip

#![cfg(feature = "netcdf")]

use std::path::Path;

use chrono::NaiveDate;
use ndarray::Array3;

use s2s_verification::forecast::ForecastGrid;
use s2s_verification::grid::GriddedSeries;
use s2s_verification::ingest::cpc::read_cpc_file;
use s2s_verification::model::LeadTime;
use s2s_verification::store::{self, StoreError};
use s2s_verification::verify::{self, VerificationStatus};
use s2s_verification::build_valid_times;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Writes a file laid out like the CPC archive: `tmin(T, Y, X)` in degC
/// with a `-999` missing value.
fn write_cpc_like(path: &Path) {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("T", 3).unwrap();
    file.add_dimension("Y", 2).unwrap();
    file.add_dimension("X", 2).unwrap();

    let mut t = file.add_variable::<f64>("T", &["T"]).unwrap();
    t.put_attribute("units", "days since 1979-1-1 0:0:0").unwrap();
    t.put_values(&[11323.0, 11324.0, 11325.0], ..).unwrap();
    let mut y = file.add_variable::<f64>("Y", &["Y"]).unwrap();
    y.put_values(&[0.0, 0.5], ..).unwrap();
    let mut x = file.add_variable::<f64>("X", &["X"]).unwrap();
    x.put_values(&[0.0, 0.5], ..).unwrap();

    let mut v = file.add_variable::<f32>("tmin", &["T", "Y", "X"]).unwrap();
    v.put_attribute("units", "degC").unwrap();
    v.put_attribute("missing_value", -999.0f32).unwrap();
    let values: Vec<f32> = vec![1.0, 2.0, 3.0, -999.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
    v.put_values(&values, ..).unwrap();
}

#[test]
fn test_read_cpc_file_decodes_time_and_masks_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.2010.nc");
    write_cpc_like(&path);

    let series = read_cpc_file(&path, "tmin").unwrap();
    // 11323 days after 1979-01-01
    assert_eq!(series.time, vec![ymd(2010, 1, 1), ymd(2010, 1, 2), ymd(2010, 1, 3)]);
    assert_eq!(series.values.dim(), (3, 2, 2));
    assert!(series.values[[0, 1, 1]].is_nan(), "missing_value is masked");
    assert_eq!(series.values[[2, 1, 1]], 12.0);
    assert_eq!(series.attr("units"), Some("degC"));
    assert_eq!(series.attr("missing_value"), None);
}

#[test]
fn test_read_cpc_file_missing_variable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.2010.nc");
    write_cpc_like(&path);
    assert!(matches!(
        read_cpc_file(&path, "tmax"),
        Err(StoreError::MissingVariable { .. })
    ));
}

#[test]
fn test_written_forecast_carries_valid_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tp_forecast.nc");

    let time: Vec<NaiveDate> = ymd(2020, 1, 1).iter_days().take(20).collect();
    let values = Array3::ones((20, 1, 2));
    let series = GriddedSeries::new("tp", time, vec![0.0], vec![0.0, 1.5], values).unwrap();
    let inits = [ymd(2020, 1, 2), ymd(2020, 1, 9)];
    let index = build_valid_times(&inits, &[LeadTime(0), LeadTime(1)]).unwrap();
    store::write_forecast(&path, &ForecastGrid::select(&series, &index)).unwrap();

    let file = netcdf::open(&path).unwrap();
    let tp = file.variable("tp").unwrap();
    let dims: Vec<String> = tp.dimensions().iter().map(|d| d.name()).collect();
    assert_eq!(dims, ["forecast_reference_time", "lead_time", "latitude", "longitude"]);

    let valid = file.variable("valid_time").unwrap().get_values::<f64, _>(..).unwrap();
    // 2020-01-02 is day 18263 since 1970-01-01.
    assert_eq!(valid, vec![18263.0, 18264.0, 18270.0, 18271.0]);
    let leads = file.variable("lead_time").unwrap().get_values::<i32, _>(..).unwrap();
    assert_eq!(leads, vec![0, 1]);
}

#[test]
fn test_written_series_is_a_reference_template() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t2m_daily.nc");
    let series = GriddedSeries::new(
        "t2m",
        vec![ymd(2020, 1, 1)],
        vec![90.0, 88.5],
        vec![0.0, 1.5, 3.0],
        Array3::zeros((1, 2, 3)),
    )
    .unwrap();
    store::write_series(&path, &series).unwrap();

    let grid = store::read_reference_grid(&path).unwrap();
    assert_eq!(grid.latitude, vec![90.0, 88.5]);
    assert_eq!(grid.longitude, vec![0.0, 1.5, 3.0]);
}

#[test]
fn test_written_layout_is_read_back_for_verification() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t2m_forecast.nc");
    let time: Vec<NaiveDate> = ymd(2020, 1, 1).iter_days().take(10).collect();
    let series =
        GriddedSeries::new("t2m", time, vec![0.0], vec![0.0, 1.5], Array3::ones((10, 1, 2)))
            .unwrap();
    let index = build_valid_times(&[ymd(2020, 1, 2)], &[LeadTime(0), LeadTime(3)]).unwrap();
    let grid = ForecastGrid::select(&series, &index);
    store::write_forecast(&path, &grid).unwrap();

    let layout = store::read_layout(&path, "t2m").unwrap();
    let names: Vec<&str> = layout.iter().map(|(d, _)| d.as_str()).collect();
    assert_eq!(names, ["forecast_reference_time", "lead_time", "latitude", "longitude"]);
    let lengths: Vec<usize> = layout.iter().map(|(_, n)| *n).collect();
    assert_eq!(lengths, [1, 2, 1, 2]);

    let result = verify::confirm_layout(verify::verify_forecast(&path, &grid), &layout);
    assert_eq!(result.status, VerificationStatus::Success);
    assert!(matches!(
        store::read_layout(&path, "tp"),
        Err(StoreError::MissingVariable { .. })
    ));
}
