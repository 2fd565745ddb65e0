//! Product builds: from raw CPC files to the verification datasets.
//!
//! Each parameter pipeline (`temperature`, `rain`) produces a daily series
//! on the reference grid. `Products::derive` adds the weekly means, and
//! `Products::write` saves, per parameter:
//!
//! - daily archival series since `start_year` (NetCDF and Zarr),
//! - weekly archival series of Thursday to Wednesday means (NetCDF and Zarr),
//! - forecast-indexed grid for the operational calendar,
//! - forecast-indexed grid for the reforecast calendar, whole or per year.
//!
//! Both valid-time indexes are built before any input is read, so calendar
//! errors stop the run before it touches the output directory. Parameters
//! are then built and written one at a time, and each forecast-indexed grid
//! is selected just before its file is written and dropped right after.
//! At the default calendar a whole reforecast grid is about 5 GiB of `f32`;
//! `split_reforecast` keeps one year of it in memory instead.

pub mod rain;
pub mod temperature;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::config::{Config, ConfigError};
use crate::dev_mode::InputYears;
use crate::forecast::ForecastGrid;
use crate::grid::{GridError, GriddedSeries};
use crate::logging::{self, Stage};
use crate::model::{
    DIM_FORECAST_REFERENCE_TIME, DIM_LEAD_TIME, Frequency, IndexError, Parameter,
};
use crate::reference::ReferenceGridCache;
use crate::store::{self, StoreError};
use crate::valid_time::{ValidTimeIndex, build_valid_times};
use crate::verify::{self, ProductVerification, VerificationReport};

/// Name of the JSON report written next to the products.
pub const REPORT_FILE: &str = "verification_report.json";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("start year {0} is outside the supported calendar")]
    StartYear(i32),

    #[error("{product} lacks the '{axis}' axis")]
    MissingAxis { product: String, axis: &'static str },

    #[error("building {parameter}: {source}")]
    Parameter {
        parameter: Parameter,
        #[source]
        source: Box<BuildError>,
    },
}

impl BuildError {
    fn during(self, parameter: Parameter) -> Self {
        BuildError::Parameter {
            parameter,
            source: Box::new(self),
        }
    }
}

/// Log stage of a parameter pipeline.
pub fn stage(parameter: Parameter) -> Stage {
    match parameter {
        Parameter::Temperature => Stage::Temperature,
        Parameter::Precipitation => Stage::Precipitation,
    }
}

// ---------------------------------------------------------------------------
// Dates and file names
// ---------------------------------------------------------------------------

/// First day kept from the raw archive: a week before `start_year` so the
/// first weekly bin can be anchored.
pub fn archive_start(start_year: i32) -> Result<NaiveDate, BuildError> {
    NaiveDate::from_ymd_opt(start_year - 1, 12, 24).ok_or(BuildError::StartYear(start_year))
}

/// First weekly bin kept in the weekly product.
pub fn weekly_start(start_year: i32) -> Result<NaiveDate, BuildError> {
    NaiveDate::from_ymd_opt(start_year, 1, 1).ok_or(BuildError::StartYear(start_year))
}

pub fn series_path(
    outdir: &Path,
    parameter: Parameter,
    freq: Frequency,
    start_year: i32,
) -> PathBuf {
    outdir.join(format!(
        "{}_verification_{}_since_{}.nc",
        parameter, freq, start_year
    ))
}

/// Zarr store holding the same series as `series_path`.
pub fn zarr_path(outdir: &Path, parameter: Parameter, freq: Frequency, start_year: i32) -> PathBuf {
    series_path(outdir, parameter, freq, start_year).with_extension("zarr")
}

/// Operational forecast-indexed file. `lead_time_weekly` names the weekly
/// init cadence; the cells hold daily values.
pub fn forecast_path(outdir: &Path, parameter: Parameter, forecast_year: i32) -> PathBuf {
    outdir.join(format!(
        "{}_verification_forecast_reference_time_{}_lead_time_weekly.nc",
        parameter, forecast_year
    ))
}

/// Reforecast file, optionally restricted to one year of inits.
pub fn reforecast_path(
    outdir: &Path,
    parameter: Parameter,
    first_year: i32,
    last_year: i32,
    year: Option<i32>,
) -> PathBuf {
    let suffix = year.map(|y| format!("_{}", y)).unwrap_or_default();
    outdir.join(format!(
        "{}_verification_forecast_reference_time_{}_{}_lead_time_weekly{}.nc",
        parameter, first_year, last_year, suffix
    ))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// Build context
// ---------------------------------------------------------------------------

/// Everything a parameter pipeline needs, resolved once per run.
pub struct BuildContext<'a> {
    pub config: &'a Config,
    pub input_years: InputYears,
    pub reference: ReferenceGridCache,
    pub forecast_index: ValidTimeIndex,
    pub reforecast_index: ValidTimeIndex,
}

impl<'a> BuildContext<'a> {
    /// Validates `config` and builds both valid-time indexes. The reference
    /// grid is resolved on first use.
    pub fn new(config: &'a Config) -> Result<Self, BuildError> {
        config.validate()?;
        archive_start(config.build.start_year)?;

        let calendar = &config.calendar;
        let leads = calendar.leads();
        let forecast_index = build_valid_times(&calendar.forecast_inits(), &leads)?;
        let reforecast_index = build_valid_times(&calendar.reforecast_inits(), &leads)?;
        for (label, index) in [("forecast", &forecast_index), ("reforecast", &reforecast_index)] {
            let (n_init, n_lead) = index.shape();
            let (first, last) = index.valid_range();
            logging::info(
                Stage::Calendar,
                None,
                &format!(
                    "{} calendar: {} inits x {} leads, valid {} to {}",
                    label, n_init, n_lead, first, last
                ),
            );
        }

        let input_years = InputYears::from_test_flag(config.build.test);
        if config.build.test {
            logging::info(
                Stage::System,
                None,
                &format!("test mode: reading only {}", input_years.pattern()),
            );
        }

        Ok(Self {
            config,
            input_years,
            reference: ReferenceGridCache::new(config.reference.source()),
            forecast_index,
            reforecast_index,
        })
    }

    pub fn start_year(&self) -> i32 {
        self.config.build.start_year
    }
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// The archival series of one parameter. Forecast-indexed grids are
/// selected from `daily` while writing.
#[derive(Debug)]
pub struct Products {
    pub parameter: Parameter,
    pub daily: GriddedSeries,
    pub weekly: GriddedSeries,
}

/// One forecast-indexed file and the inits it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastTarget {
    pub path: PathBuf,
    pub index: ValidTimeIndex,
}

type SeriesWriter = fn(&Path, &GriddedSeries) -> Result<(), StoreError>;
type LayoutReader = fn(&Path, &str) -> Result<Vec<(String, usize)>, StoreError>;

impl Products {
    /// Derives the weekly series from a daily series already on the
    /// reference grid and trimmed to the archive start.
    pub fn derive(
        parameter: Parameter,
        daily: GriddedSeries,
        ctx: &BuildContext<'_>,
    ) -> Result<Self, BuildError> {
        let weekly = daily.weekly_mean()?.since(weekly_start(ctx.start_year())?)?;
        logging::debug(
            stage(parameter),
            None,
            &format!(
                "{} daily steps, {} weekly bins from {}",
                daily.time.len(),
                weekly.time.len(),
                weekly.time[0]
            ),
        );
        Ok(Self {
            parameter,
            daily,
            weekly,
        })
    }

    /// Forecast-indexed files to write: the operational calendar, then the
    /// reforecast calendar as one file or one file per year.
    pub fn forecast_targets(
        &self,
        ctx: &BuildContext<'_>,
    ) -> Result<Vec<ForecastTarget>, BuildError> {
        let outdir = &ctx.config.io.outdir;
        let calendar = &ctx.config.calendar;
        let (first, last) = (calendar.reforecast_start_year, calendar.reforecast_end_year);

        let mut targets = vec![ForecastTarget {
            path: forecast_path(outdir, self.parameter, calendar.forecast_year),
            index: ctx.forecast_index.clone(),
        }];
        if ctx.config.build.split_reforecast {
            for (year, index) in ctx.reforecast_index.split_by_year()? {
                targets.push(ForecastTarget {
                    path: reforecast_path(outdir, self.parameter, first, last, Some(year)),
                    index,
                });
            }
        } else {
            targets.push(ForecastTarget {
                path: reforecast_path(outdir, self.parameter, first, last, None),
                index: ctx.reforecast_index.clone(),
            });
        }
        Ok(targets)
    }

    /// Daily values at every valid date of `target`.
    pub fn select(&self, target: &ForecastTarget) -> ForecastGrid {
        ForecastGrid::select(&self.daily, &target.index)
    }

    /// Writes every product under the configured output directory and
    /// checks what was written.
    pub fn write(&self, ctx: &BuildContext<'_>) -> Result<Vec<ProductVerification>, BuildError> {
        let outdir = &ctx.config.io.outdir;
        let stage = stage(self.parameter);
        let mut results = Vec::new();

        for (freq, series) in self.series() {
            let path = series_path(outdir, self.parameter, freq, ctx.start_year());
            results.push(write_series_checked(
                stage,
                &path,
                series,
                store::write_series,
                store::read_layout,
            )?);
        }
        if ctx.config.build.zarr {
            results.extend(self.write_zarr(ctx)?);
        }

        for target in self.forecast_targets(ctx)? {
            let grid = self.select(&target);
            report_missing(stage, &target.path, &grid);
            results.push(write_forecast_checked(stage, &target.path, &grid)?);
        }
        Ok(results)
    }

    /// Writes the daily and weekly series as Zarr stores.
    pub fn write_zarr(
        &self,
        ctx: &BuildContext<'_>,
    ) -> Result<Vec<ProductVerification>, BuildError> {
        let outdir = &ctx.config.io.outdir;
        let stage = stage(self.parameter);
        self.series()
            .into_iter()
            .map(|(freq, series)| {
                let path = zarr_path(outdir, self.parameter, freq, ctx.start_year());
                write_series_checked(
                    stage,
                    &path,
                    series,
                    store::zarr::write_series,
                    store::zarr::read_layout,
                )
            })
            .collect()
    }

    fn series(&self) -> [(Frequency, &GriddedSeries); 2] {
        [(Frequency::Daily, &self.daily), (Frequency::Weekly, &self.weekly)]
    }
}

fn announce(stage: Stage, name: &str, path: &Path) {
    logging::info(
        stage,
        None,
        &format!("Writing {} in \"{}\"", name, path.display()),
    );
}

fn report_missing(stage: Stage, path: &Path, grid: &ForecastGrid) {
    let missing = grid.missing_cells();
    if missing == 0 {
        return;
    }
    let product = file_name(path);
    logging::warn(
        stage,
        Some(&product),
        &format!(
            "{} of {} (init, lead) cells have no observation",
            missing,
            grid.cell_count()
        ),
    );
    let dates = grid.missing_valid_times();
    logging::debug(
        stage,
        Some(&product),
        &format!(
            "uncovered valid dates from {} to {}",
            dates[0],
            dates[dates.len() - 1]
        ),
    );
}

/// Both forecast axes must be present before a grid is written.
pub fn ensure_forecast_axes(grid: &ForecastGrid, product: &str) -> Result<(), BuildError> {
    for axis in [DIM_FORECAST_REFERENCE_TIME, DIM_LEAD_TIME] {
        if !grid.has_dim(axis) {
            return Err(BuildError::MissingAxis {
                product: product.to_string(),
                axis,
            });
        }
    }
    Ok(())
}

fn write_series_checked(
    stage: Stage,
    path: &Path,
    series: &GriddedSeries,
    write: SeriesWriter,
    read_layout: LayoutReader,
) -> Result<ProductVerification, BuildError> {
    announce(stage, &series.name, path);
    write(path, series)?;
    let written = read_layout(path, &series.name)?;
    Ok(verify::confirm_layout(verify::verify_series(path, series), &written))
}

fn write_forecast_checked(
    stage: Stage,
    path: &Path,
    grid: &ForecastGrid,
) -> Result<ProductVerification, BuildError> {
    ensure_forecast_axes(grid, &file_name(path))?;
    announce(stage, &grid.name, path);
    store::write_forecast(path, grid)?;
    let written = store::read_layout(path, &grid.name)?;
    Ok(verify::confirm_layout(verify::verify_forecast(path, grid), &written))
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Runs every enabled build and writes the verification report. Each
/// parameter is built, written and released before the next one is read.
pub fn run(config: &Config) -> Result<VerificationReport, BuildError> {
    let ctx = BuildContext::new(config)?;

    let mut enabled = Vec::new();
    if config.build.temperature {
        enabled.push(Parameter::Temperature);
    }
    if config.build.rain {
        enabled.push(Parameter::Precipitation);
    }
    if enabled.is_empty() {
        logging::warn(
            Stage::System,
            None,
            "nothing to build: enable temperature and/or rain",
        );
        return Ok(VerificationReport::new(Vec::new()));
    }

    let mut results = Vec::new();
    for parameter in enabled {
        let products = match parameter {
            Parameter::Temperature => temperature::build(&ctx),
            Parameter::Precipitation => rain::build(&ctx),
        }
        .map_err(|e| e.during(parameter))?;

        std::fs::create_dir_all(&config.io.outdir).map_err(StoreError::from)?;
        results.extend(products.write(&ctx).map_err(|e| e.during(parameter))?);
    }

    let report = VerificationReport::new(results);
    let failed = report.summary.failed;
    logging::log_build_summary(
        Stage::System,
        report.summary.total,
        report.summary.total - failed,
        failed,
    );

    let report_path = config.io.outdir.join(REPORT_FILE);
    verify::write_report(&report_path, &report)?;
    logging::info(
        Stage::Io,
        None,
        &format!("Verification report written to {}", report_path.display()),
    );
    verify::print_summary(&report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::VerificationStatus;
    use ndarray::Array3;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Small calendars keep the selected grids light.
    fn small_config() -> Config {
        let mut config = Config::default();
        config.calendar.forecast_year = 2011;
        config.calendar.reforecast_start_year = 2009;
        config.calendar.reforecast_end_year = 2010;
        config.calendar.lead_days = 3;
        config.build.start_year = 2010;
        config
    }

    fn daily_series(start: NaiveDate, n: usize) -> GriddedSeries {
        let time = start.iter_days().take(n).collect();
        let values = Array3::from_shape_fn((n, 1, 1), |(t, _, _)| t as f32);
        GriddedSeries::new("tp", time, vec![0.0], vec![0.0], values).unwrap()
    }

    #[test]
    fn test_file_names() {
        let out = Path::new("/out");
        assert_eq!(
            series_path(out, Parameter::Temperature, Frequency::Daily, 2002),
            PathBuf::from("/out/t2m_verification_daily_since_2002.nc")
        );
        assert_eq!(
            forecast_path(out, Parameter::Precipitation, 2020),
            PathBuf::from("/out/tp_verification_forecast_reference_time_2020_lead_time_weekly.nc")
        );
        assert_eq!(
            reforecast_path(out, Parameter::Temperature, 2000, 2019, None),
            PathBuf::from(
                "/out/t2m_verification_forecast_reference_time_2000_2019_lead_time_weekly.nc"
            )
        );
        assert_eq!(
            reforecast_path(out, Parameter::Temperature, 2000, 2019, Some(2005)),
            PathBuf::from(
                "/out/t2m_verification_forecast_reference_time_2000_2019_lead_time_weekly_2005.nc"
            )
        );
    }

    #[test]
    fn test_zarr_store_sits_next_to_netcdf_file() {
        assert_eq!(
            zarr_path(Path::new("/out"), Parameter::Precipitation, Frequency::Weekly, 2002),
            PathBuf::from("/out/tp_verification_weekly_since_2002.zarr")
        );
    }

    #[test]
    fn test_archive_start_is_christmas_eve_before() {
        assert_eq!(archive_start(2002).unwrap(), ymd(2001, 12, 24));
        assert_eq!(weekly_start(2002).unwrap(), ymd(2002, 1, 1));
        assert!(matches!(archive_start(i32::MAX), Err(BuildError::StartYear(_))));
    }

    #[test]
    fn test_context_builds_both_indexes() {
        let config = small_config();
        let ctx = BuildContext::new(&config).unwrap();
        assert_eq!(ctx.forecast_index.shape(), (52, 3));
        assert_eq!(ctx.reforecast_index.shape(), (52 + 52, 3));
        assert_eq!(ctx.input_years, InputYears::All);
        assert!(!ctx.reference.is_resolved(), "grid is resolved lazily");
    }

    #[test]
    fn test_context_rejects_invalid_config() {
        let mut config = small_config();
        config.calendar.init_interval_days = 0;
        assert!(matches!(BuildContext::new(&config), Err(BuildError::Config(_))));
    }

    #[test]
    fn test_derive_products_from_daily_series() {
        let config = small_config();
        let ctx = BuildContext::new(&config).unwrap();
        // 2009-12-24 through 2011-12-31
        let daily = daily_series(ymd(2009, 12, 24), 738);
        let products = Products::derive(Parameter::Precipitation, daily, &ctx).unwrap();
        assert_eq!(products.weekly.time[0], ymd(2010, 1, 7), "first bin on/after Jan 1");

        let targets = products.forecast_targets(&ctx).unwrap();
        assert_eq!(targets.len(), 2);
        let forecast = products.select(&targets[0]);
        assert_eq!(forecast.missing_cells(), 0);
        // 2011-01-02 is day 374 of the series.
        assert_eq!(forecast.values[[0, 0, 0, 0]], 374.0);
        // Only the last 2009 init (Dec 25) falls inside the series.
        assert_eq!(products.select(&targets[1]).missing_cells(), 51 * 3);
    }

    #[test]
    fn test_split_reforecast_targets_one_file_per_year() {
        let mut config = small_config();
        config.build.split_reforecast = true;
        config.io.outdir = PathBuf::from("/out");
        let ctx = BuildContext::new(&config).unwrap();
        let daily = daily_series(ymd(2009, 12, 24), 738);
        let products = Products::derive(Parameter::Precipitation, daily, &ctx).unwrap();

        let targets = products.forecast_targets(&ctx).unwrap();
        assert_eq!(targets.len(), 3, "forecast plus one reforecast file per year");
        assert_eq!(
            targets[2].path,
            PathBuf::from(
                "/out/tp_verification_forecast_reference_time_2009_2010_lead_time_weekly_2010.nc"
            )
        );
        assert_eq!(targets[1].index.shape(), (52, 3));

        // A per-year grid matches the same rows of the whole reforecast grid.
        let whole = ForecastGrid::select(&products.daily, &ctx.reforecast_index);
        let year_2010 = products.select(&targets[2]);
        assert_eq!(year_2010.values.dim(), (52, 3, 1, 1));
        assert_eq!(year_2010.values[[4, 2, 0, 0]], whole.values[[52 + 4, 2, 0, 0]]);
        assert_eq!(year_2010.missing_cells(), 0);
    }

    #[test]
    fn test_zarr_products_are_verified_from_the_stores() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config();
        config.io.outdir = dir.path().to_path_buf();
        let ctx = BuildContext::new(&config).unwrap();
        let daily = daily_series(ymd(2009, 12, 24), 738);
        let products = Products::derive(Parameter::Precipitation, daily, &ctx).unwrap();

        let results = products.write_zarr(&ctx).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].product, "tp_verification_daily_since_2010.zarr");
        assert_eq!(results[1].product, "tp_verification_weekly_since_2010.zarr");
        assert!(results.iter().all(|r| r.status == VerificationStatus::Success));

        let weekly = store::zarr::read_series(&dir.path().join(&results[1].product)).unwrap();
        assert_eq!(weekly.time, products.weekly.time);
        assert_eq!(weekly.values, products.weekly.values);
    }

    #[test]
    fn test_run_without_parameters_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config();
        config.io.outdir = dir.path().join("out");
        let report = run(&config).unwrap();
        assert_eq!(report.summary.total, 0);
        assert!(!config.io.outdir.exists());
    }
}
