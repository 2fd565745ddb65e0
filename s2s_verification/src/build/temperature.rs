//! 2 metre temperature from the CPC daily `tmin`/`tmax` archives.
//!
//! The daily temperature is the mean of the two members. Each year is
//! averaged and regridded on its own before the years are joined, so only
//! one year of native-resolution data is held at a time.

use crate::grid::{GriddedSeries, concat_time, member_mean};
use crate::ingest::cpc::{VAR_TMAX, VAR_TMIN, list_year_files, pair_year_files, read_cpc_file};
use crate::logging::{self, Stage};
use crate::model::{CELSIUS_TO_KELVIN, Parameter};
use crate::reference::ReferenceGrid;

use super::{BuildContext, BuildError, Products, archive_start};

pub fn build(ctx: &BuildContext<'_>) -> Result<Products, BuildError> {
    logging::info(Stage::Temperature, None, "Building temperature data");

    let input = &ctx.config.io.input;
    let (tmin_dir, tmax_dir) = (input.join(VAR_TMIN), input.join(VAR_TMAX));
    let pairs = pair_year_files(
        list_year_files(&tmin_dir, ctx.input_years)?,
        list_year_files(&tmax_dir, ctx.input_years)?,
        &tmin_dir,
        &tmax_dir,
    )?;
    let grid = ctx.reference.get()?;

    let mut years = Vec::with_capacity(pairs.len());
    for (year, tmin_path, tmax_path) in pairs {
        logging::debug(Stage::Temperature, None, &format!("reading {}", year));
        let tmin = read_cpc_file(&tmin_path, VAR_TMIN)?;
        let tmax = read_cpc_file(&tmax_path, VAR_TMAX)?;
        years.push(prepare_year(tmin, tmax, grid)?);
    }

    let daily = finalize(years, ctx.start_year())?;
    Products::derive(Parameter::Temperature, daily, ctx)
}

/// Member mean of one year, interpolated onto `grid`. Attributes are taken
/// from `tmin`.
pub fn prepare_year(
    tmin: GriddedSeries,
    tmax: GriddedSeries,
    grid: &ReferenceGrid,
) -> Result<GriddedSeries, BuildError> {
    let mean = member_mean(&[tmin, tmax])?;
    Ok(mean.interp_like(grid))
}

/// Joins the yearly pieces into the daily `t2m` series in Kelvin, starting
/// on the archive start date.
pub fn finalize(years: Vec<GriddedSeries>, start_year: i32) -> Result<GriddedSeries, BuildError> {
    let mut joined = concat_time(years)?;
    // Decoded CPC time stamps are not trusted; the archive is daily and gap-free.
    joined.rebuild_daily_axis();

    let mut t2m = joined
        .since(archive_start(start_year)?)?
        .renamed(Parameter::Temperature.short_name());
    t2m.set_attr("long_name", "Daily Temperature");
    t2m.add_offset(CELSIUS_TO_KELVIN);
    t2m.set_attr("units", "K");
    Ok(t2m)
}
