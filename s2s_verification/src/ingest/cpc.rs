//! NOAA CPC gridded daily observations.
//!
//! The archive is laid out as one NetCDF file per year and variable:
//!
//! ```text
//! {input}/tmin/data.{YEAR}.nc   variable `tmin` (degC)
//! {input}/tmax/data.{YEAR}.nc   variable `tmax` (degC)
//! {input}/rain/data.{YEAR}.nc   variable `rain` (mm/day)
//! ```
//!
//! Each variable is laid out `(T, Y, X)`: time, latitude, longitude.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, TimeDelta};

use crate::dev_mode::InputYears;
use crate::grid::GriddedSeries;
use crate::store::StoreError;

pub const VAR_TMIN: &str = "tmin";
pub const VAR_TMAX: &str = "tmax";
pub const VAR_RAIN: &str = "rain";

/// Attributes describing the raw encoding, not carried to the outputs.
const ENCODING_ATTRS: &[&str] = &["_FillValue", "missing_value", "scale_factor", "add_offset"];

// ---------------------------------------------------------------------------
// File discovery
// ---------------------------------------------------------------------------

/// One yearly input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearFile {
    pub year: i32,
    pub path: PathBuf,
}

/// Lists the selected `data.{YEAR}.nc` files in `dir`, ordered by year.
pub fn list_year_files(dir: &Path, years: InputYears) -> Result<Vec<YearFile>, StoreError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(year) = name.to_str().and_then(|n| years.select(n)) else {
            continue;
        };
        files.push(YearFile {
            year,
            path: entry.path(),
        });
    }
    if files.is_empty() {
        return Err(StoreError::NoInputFiles {
            dir: dir.to_path_buf(),
            pattern: years.pattern(),
        });
    }
    files.sort_by_key(|f| f.year);
    Ok(files)
}

/// Matches two member archives year by year. Every year must be present in
/// both directories.
pub fn pair_year_files(
    first: Vec<YearFile>,
    second: Vec<YearFile>,
    first_dir: &Path,
    second_dir: &Path,
) -> Result<Vec<(i32, PathBuf, PathBuf)>, StoreError> {
    for f in &second {
        if !first.iter().any(|g| g.year == f.year) {
            return Err(StoreError::UnpairedInput {
                year: f.year,
                present: second_dir.to_path_buf(),
                absent: first_dir.to_path_buf(),
            });
        }
    }

    let mut pairs = Vec::with_capacity(first.len());
    for f in first {
        let partner = second
            .iter()
            .find(|g| g.year == f.year)
            .ok_or_else(|| StoreError::UnpairedInput {
                year: f.year,
                present: first_dir.to_path_buf(),
                absent: second_dir.to_path_buf(),
            })?;
        pairs.push((f.year, f.path, partner.path.clone()));
    }
    Ok(pairs)
}

// ---------------------------------------------------------------------------
// Time decoding
// ---------------------------------------------------------------------------

/// Decodes CF time offsets such as `days since 1979-1-1 0:0:0` to calendar
/// dates. Sub-daily offsets are floored to the day they fall in.
pub fn decode_time_axis(units: &str, offsets: &[f64]) -> Result<Vec<NaiveDate>, StoreError> {
    let bad_units = || StoreError::TimeUnits(units.to_string());

    let mut parts = units.split_whitespace();
    let days_per_unit = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        Some("days" | "day") => 1.0,
        Some("hours" | "hour") => 1.0 / 24.0,
        Some("minutes" | "minute") => 1.0 / 1440.0,
        Some("seconds" | "second") => 1.0 / 86400.0,
        _ => return Err(bad_units()),
    };
    if parts.next() != Some("since") {
        return Err(bad_units());
    }
    let base = parts
        .next()
        .and_then(|token| token.split('T').next())
        .and_then(parse_loose_date)
        .ok_or_else(bad_units)?;

    offsets
        .iter()
        .map(|&offset| {
            let days = (offset * days_per_unit + 1e-9).floor() as i64;
            TimeDelta::try_days(days)
                .and_then(|delta| base.checked_add_signed(delta))
                .ok_or_else(bad_units)
        })
        .collect()
}

/// Parses `Y-M-D` with or without zero padding.
fn parse_loose_date(token: &str) -> Option<NaiveDate> {
    let mut fields = token.split('-');
    let year = fields.next()?.parse().ok()?;
    let month = fields.next()?.parse().ok()?;
    let day = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Replaces raw fill values with `NaN`.
pub fn mask_fill(values: &mut [f32], fills: &[f64]) {
    for v in values.iter_mut() {
        if fills.iter().any(|f| f64::from(*v) == *f) {
            *v = f32::NAN;
        }
    }
}

// ---------------------------------------------------------------------------
// NetCDF reading
// ---------------------------------------------------------------------------

#[cfg(feature = "netcdf")]
fn read_with_netcdf(path: &Path, variable: &str) -> Result<GriddedSeries, StoreError> {
    use netcdf::AttributeValue;

    let missing = |name: &str| StoreError::MissingVariable {
        path: path.to_path_buf(),
        variable: name.to_string(),
    };
    let layout = |detail: String| StoreError::UnexpectedLayout {
        path: path.to_path_buf(),
        variable: variable.to_string(),
        detail,
    };

    let file = netcdf::open(path)?;
    let var = file.variable(variable).ok_or_else(|| missing(variable))?;

    let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
    if dims != ["T", "Y", "X"] {
        return Err(layout(format!("dimensions {:?}, expected [T, Y, X]", dims)));
    }

    let t_var = file.variable("T").ok_or_else(|| missing("T"))?;
    let units = match t_var.attribute("units").map(|a| a.value()) {
        Some(Ok(AttributeValue::Str(units))) => units,
        _ => return Err(StoreError::TimeUnits("<missing>".to_string())),
    };
    let time = decode_time_axis(&units, &t_var.get_values::<f64, _>(..)?)?;
    let latitude = file
        .variable("Y")
        .ok_or_else(|| missing("Y"))?
        .get_values::<f64, _>(..)?;
    let longitude = file
        .variable("X")
        .ok_or_else(|| missing("X"))?
        .get_values::<f64, _>(..)?;

    let fills: Vec<f64> = ["missing_value", "_FillValue"]
        .iter()
        .filter_map(|name| match var.attribute(name)?.value().ok()? {
            AttributeValue::Float(v) => Some(f64::from(v)),
            AttributeValue::Double(v) => Some(v),
            AttributeValue::Short(v) => Some(f64::from(v)),
            AttributeValue::Int(v) => Some(f64::from(v)),
            _ => None,
        })
        .collect();
    let mut raw = var.get_values::<f32, _>(..)?;
    mask_fill(&mut raw, &fills);

    let shape = (time.len(), latitude.len(), longitude.len());
    let values =
        ndarray::Array3::from_shape_vec(shape, raw).map_err(|e| layout(e.to_string()))?;

    let mut series = GriddedSeries::new(variable, time, latitude, longitude, values)?;
    for attr in var.attributes() {
        if ENCODING_ATTRS.contains(&attr.name()) {
            continue;
        }
        if let Ok(AttributeValue::Str(text)) = attr.value() {
            series.set_attr(attr.name(), text);
        }
    }
    Ok(series)
}

/// Reads one yearly file as a series named after `variable`.
pub fn read_cpc_file(path: &Path, variable: &str) -> Result<GriddedSeries, StoreError> {
    #[cfg(feature = "netcdf")]
    {
        read_with_netcdf(path, variable)
    }
    #[cfg(not(feature = "netcdf"))]
    {
        let _ = (path, variable, ENCODING_ATTRS);
        Err(StoreError::FeatureDisabled)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
