//! Total precipitation from the CPC unified gauge-based `rain` archive.

use crate::grid::{GriddedSeries, concat_time};
use crate::ingest::cpc::{VAR_RAIN, list_year_files, read_cpc_file};
use crate::logging::{self, Stage};
use crate::model::Parameter;

use super::{BuildContext, BuildError, Products, archive_start};

pub fn build(ctx: &BuildContext<'_>) -> Result<Products, BuildError> {
    logging::info(Stage::Precipitation, None, "Building rain data");

    let rain_dir = ctx.config.io.input.join(VAR_RAIN);
    let files = list_year_files(&rain_dir, ctx.input_years)?;
    let grid = ctx.reference.get()?;

    let mut years = Vec::with_capacity(files.len());
    for file in files {
        logging::debug(Stage::Precipitation, None, &format!("reading {}", file.year));
        years.push(read_cpc_file(&file.path, VAR_RAIN)?.interp_like(grid));
    }

    let daily = finalize(years, ctx.start_year())?;
    Products::derive(Parameter::Precipitation, daily, ctx)
}

/// Joins the yearly pieces into the daily `tp` series, starting on the
/// archive start date. Units are kept as read.
pub fn finalize(years: Vec<GriddedSeries>, start_year: i32) -> Result<GriddedSeries, BuildError> {
    Ok(concat_time(years)?
        .since(archive_start(start_year)?)?
        .renamed(Parameter::Precipitation.short_name()))
}
