use std::path::PathBuf;

use clap::Parser;

use s2s_verification::config::Config;
use s2s_verification::logging::LogLevel;

/// Builds the S2S verification datasets from CPC observations.
#[derive(Debug, Parser)]
#[command(
    name = "build_verification",
    version,
    about = "Build forecast-verification datasets from CPC observations"
)]
pub struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Root of the input NetCDF archive.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory for the output NetCDF files.
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Build the 2 metre temperature products.
    #[arg(long)]
    pub temperature: bool,

    /// Build the precipitation products.
    #[arg(long)]
    pub rain: bool,

    /// For dev purpose, read only one year of input.
    #[arg(long)]
    pub test: bool,

    /// First year of the archival products.
    #[arg(long = "start-year")]
    pub start_year: Option<i32>,

    /// Write one reforecast file per year.
    #[arg(long = "split-reforecast")]
    pub split_reforecast: bool,

    /// Skip the Zarr copies of the daily and weekly series.
    #[arg(long = "no-zarr")]
    pub no_zarr: bool,

    /// Log threshold (debug, info, warn, error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Increase verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Applies the command-line overrides on top of `config`. Build switches
    /// only turn things on, and `--no-zarr` only turns Zarr output off.
    pub fn apply(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.io.input = input.clone();
        }
        if let Some(outdir) = &self.outdir {
            config.io.outdir = outdir.clone();
        }
        if let Some(year) = self.start_year {
            config.build.start_year = year;
        }
        config.build.temperature |= self.temperature;
        config.build.rain |= self.rain;
        config.build.test |= self.test;
        config.build.split_reforecast |= self.split_reforecast;
        if self.no_zarr {
            config.build.zarr = false;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}
