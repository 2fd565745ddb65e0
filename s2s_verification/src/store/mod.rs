//! NetCDF output for archival and forecast-indexed products.
//!
//! Files follow CF conventions: dates are stored as `days since 1970-01-01`
//! on a proleptic Gregorian calendar, missing values are `NaN` with a `NaN`
//! `_FillValue`. Reading and writing need the `netcdf` feature; without it
//! every call returns `StoreError::FeatureDisabled`. The archival series are
//! also written as Zarr stores by [`zarr`], which has no such requirement.

pub mod zarr;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::forecast::ForecastGrid;
use crate::grid::{GridError, GriddedSeries};
use crate::reference::ReferenceGrid;

/// Units of every date coordinate written by this crate.
pub const TIME_UNITS: &str = "days since 1970-01-01";
pub const TIME_CALENDAR: &str = "proleptic_gregorian";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("missing variable '{variable}' in {path}")]
    MissingVariable { path: PathBuf, variable: String },

    #[error("unexpected layout of '{variable}' in {path}: {detail}")]
    UnexpectedLayout {
        path: PathBuf,
        variable: String,
        detail: String,
    },

    #[error("cannot decode time units '{0}'")]
    TimeUnits(String),

    #[error("no input files {pattern} in {dir}")]
    NoInputFiles { dir: PathBuf, pattern: String },

    #[error("year {year} present in {present} but not in {absent}")]
    UnpairedInput {
        year: i32,
        present: PathBuf,
        absent: PathBuf,
    },

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("NetCDF support not enabled (rebuild with --features netcdf)")]
    FeatureDisabled,
}

// ---------------------------------------------------------------------------
// Date encoding
// ---------------------------------------------------------------------------

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Dates as `days since 1970-01-01`.
pub fn encode_days(dates: &[NaiveDate]) -> Vec<f64> {
    let epoch = epoch();
    dates
        .iter()
        .map(|d| (*d - epoch).num_days() as f64)
        .collect()
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

#[cfg(feature = "netcdf")]
mod nc {
    use super::*;
    use crate::model::{
        COORD_VALID_TIME, DIM_FORECAST_REFERENCE_TIME, DIM_LATITUDE, DIM_LEAD_TIME,
        DIM_LONGITUDE, DIM_TIME,
    };
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn put_time_coord(
        file: &mut netcdf::FileMut,
        name: &str,
        dates: &[NaiveDate],
    ) -> Result<(), StoreError> {
        let mut var = file.add_variable::<f64>(name, &[name])?;
        var.put_attribute("standard_name", "time")?;
        var.put_attribute("units", TIME_UNITS)?;
        var.put_attribute("calendar", TIME_CALENDAR)?;
        var.put_values(&encode_days(dates), ..)?;
        Ok(())
    }

    fn put_axis(
        file: &mut netcdf::FileMut,
        name: &str,
        values: &[f64],
        units: &str,
    ) -> Result<(), StoreError> {
        let mut var = file.add_variable::<f64>(name, &[name])?;
        var.put_attribute("standard_name", name)?;
        var.put_attribute("units", units)?;
        var.put_values(values, ..)?;
        Ok(())
    }

    fn put_spatial_axes(
        file: &mut netcdf::FileMut,
        latitude: &[f64],
        longitude: &[f64],
    ) -> Result<(), StoreError> {
        file.add_dimension(DIM_LATITUDE, latitude.len())?;
        file.add_dimension(DIM_LONGITUDE, longitude.len())?;
        put_axis(file, DIM_LATITUDE, latitude, "degrees_north")?;
        put_axis(file, DIM_LONGITUDE, longitude, "degrees_east")?;
        Ok(())
    }

    fn put_data(
        file: &mut netcdf::FileMut,
        name: &str,
        dims: &[&str],
        attrs: &BTreeMap<String, String>,
        values: Vec<f32>,
    ) -> Result<(), StoreError> {
        let mut var = file.add_variable::<f32>(name, dims)?;
        for (key, value) in attrs {
            var.put_attribute(key, value.as_str())?;
        }
        var.put_attribute("_FillValue", f32::NAN)?;
        var.put_values(&values, ..)?;
        Ok(())
    }

    fn put_history(file: &mut netcdf::FileMut) -> Result<(), StoreError> {
        file.add_attribute("Conventions", "CF-1.8")?;
        let now = Utc::now();
        file.add_attribute(
            "history",
            format!(
                "{}: created by s2s_verification",
                now.format("%Y-%m-%d %H:%M:%S UTC")
            )
            .as_str(),
        )?;
        Ok(())
    }

    pub fn write_series(path: &Path, series: &GriddedSeries) -> Result<(), StoreError> {
        let mut file = netcdf::create(path)?;
        file.add_dimension(DIM_TIME, series.time.len())?;
        put_time_coord(&mut file, DIM_TIME, &series.time)?;
        put_spatial_axes(&mut file, &series.latitude, &series.longitude)?;
        put_data(
            &mut file,
            &series.name,
            &[DIM_TIME, DIM_LATITUDE, DIM_LONGITUDE],
            &series.attrs,
            series.values.iter().copied().collect(),
        )?;
        put_history(&mut file)?;
        Ok(())
    }

    pub fn write_forecast(path: &Path, grid: &ForecastGrid) -> Result<(), StoreError> {
        let (n_init, n_lead) = grid.index.shape();
        let mut file = netcdf::create(path)?;

        file.add_dimension(DIM_FORECAST_REFERENCE_TIME, n_init)?;
        file.add_dimension(DIM_LEAD_TIME, n_lead)?;
        put_time_coord(&mut file, DIM_FORECAST_REFERENCE_TIME, grid.index.inits())?;
        {
            let leads: Vec<i32> = grid.index.leads().iter().map(|l| l.days() as i32).collect();
            let mut var = file.add_variable::<i32>(DIM_LEAD_TIME, &[DIM_LEAD_TIME])?;
            var.put_attribute("long_name", "lead time")?;
            var.put_attribute("units", "days")?;
            var.put_values(&leads, ..)?;
        }
        {
            let valid: Vec<NaiveDate> = grid.index.values().iter().copied().collect();
            let mut var = file.add_variable::<f64>(
                COORD_VALID_TIME,
                &[DIM_FORECAST_REFERENCE_TIME, DIM_LEAD_TIME],
            )?;
            var.put_attribute("standard_name", "time")?;
            var.put_attribute("units", TIME_UNITS)?;
            var.put_attribute("calendar", TIME_CALENDAR)?;
            var.put_values(&encode_days(&valid), ..)?;
        }
        put_spatial_axes(&mut file, &grid.latitude, &grid.longitude)?;

        let mut attrs = grid.attrs.clone();
        attrs.insert("coordinates".to_string(), COORD_VALID_TIME.to_string());
        put_data(
            &mut file,
            &grid.name,
            &[DIM_FORECAST_REFERENCE_TIME, DIM_LEAD_TIME, DIM_LATITUDE, DIM_LONGITUDE],
            &attrs,
            grid.values.iter().copied().collect(),
        )?;
        put_history(&mut file)?;
        Ok(())
    }

    pub fn read_reference_grid(path: &Path) -> Result<ReferenceGrid, StoreError> {
        let file = netcdf::open(path)?;
        let axis = |names: [&str; 2]| -> Result<Vec<f64>, StoreError> {
            for name in names {
                if let Some(var) = file.variable(name) {
                    return Ok(var.get_values::<f64, _>(..)?);
                }
            }
            Err(StoreError::MissingVariable {
                path: path.to_path_buf(),
                variable: names[0].to_string(),
            })
        };
        let latitude = axis([DIM_LATITUDE, "lat"])?;
        let longitude = axis([DIM_LONGITUDE, "lon"])?;
        Ok(ReferenceGrid::new(latitude, longitude))
    }

    pub fn read_layout(path: &Path, variable: &str) -> Result<Vec<(String, usize)>, StoreError> {
        let file = netcdf::open(path)?;
        let var = file.variable(variable).ok_or_else(|| StoreError::MissingVariable {
            path: path.to_path_buf(),
            variable: variable.to_string(),
        })?;
        Ok(var.dimensions().iter().map(|d| (d.name(), d.len())).collect())
    }
}

/// Writes an archival `(time, latitude, longitude)` file.
pub fn write_series(path: &Path, series: &GriddedSeries) -> Result<(), StoreError> {
    #[cfg(feature = "netcdf")]
    {
        nc::write_series(path, series)
    }
    #[cfg(not(feature = "netcdf"))]
    {
        let _ = (path, series);
        Err(StoreError::FeatureDisabled)
    }
}

/// Writes a `(forecast_reference_time, lead_time, latitude, longitude)` file
/// with the 2-D `valid_time` coordinate.
pub fn write_forecast(path: &Path, grid: &ForecastGrid) -> Result<(), StoreError> {
    #[cfg(feature = "netcdf")]
    {
        nc::write_forecast(path, grid)
    }
    #[cfg(not(feature = "netcdf"))]
    {
        let _ = (path, grid);
        Err(StoreError::FeatureDisabled)
    }
}

/// Reads `latitude`/`longitude` (or `lat`/`lon`) from a template file.
pub fn read_reference_grid(path: &Path) -> Result<ReferenceGrid, StoreError> {
    #[cfg(feature = "netcdf")]
    {
        nc::read_reference_grid(path)
    }
    #[cfg(not(feature = "netcdf"))]
    {
        let _ = path;
        Err(StoreError::FeatureDisabled)
    }
}

/// Dimension names and lengths of `variable` as stored in a NetCDF file.
pub fn read_layout(path: &Path, variable: &str) -> Result<Vec<(String, usize)>, StoreError> {
    #[cfg(feature = "netcdf")]
    {
        nc::read_layout(path, variable)
    }
    #[cfg(not(feature = "netcdf"))]
    {
        let _ = (path, variable);
        Err(StoreError::FeatureDisabled)
    }
}
