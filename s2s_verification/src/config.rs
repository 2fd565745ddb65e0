//! Build configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. `s2s_verification.toml` (or the file given with `--config`),
//! 2. `S2S_OBS_INPUT` / `S2S_OBS_OUTDIR`, also read from a `.env` file,
//! 3. command-line flags.
//!
//! Every section and key is optional.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::calendar::CalendarConfig;
use crate::logging::LogLevel;
use crate::reference::{ReferenceSource, S2S_RESOLUTION_DEGREES};

/// Config file read from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "s2s_verification.toml";

pub const ENV_INPUT: &str = "S2S_OBS_INPUT";
pub const ENV_OUTDIR: &str = "S2S_OBS_OUTDIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    /// Root of the raw CPC archive (`tmin/`, `tmax/`, `rain/`).
    #[serde(default = "default_input")]
    pub input: PathBuf,
    /// Directory the products are written to.
    #[serde(default = "default_outdir")]
    pub outdir: PathBuf,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            outdir: default_outdir(),
        }
    }
}

fn default_input() -> PathBuf {
    PathBuf::from("/s2s-obs/")
}
fn default_outdir() -> PathBuf {
    PathBuf::from("/s2s-obs/forecast-benchmark")
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default)]
    pub temperature: bool,
    #[serde(default)]
    pub rain: bool,
    /// Read only one year of input.
    #[serde(default)]
    pub test: bool,
    /// First year of the archival products.
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    /// Write one reforecast file per year instead of a single file.
    #[serde(default)]
    pub split_reforecast: bool,
    /// Also write the daily and weekly series as Zarr stores.
    #[serde(default = "default_true")]
    pub zarr: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            temperature: false,
            rain: false,
            test: false,
            start_year: default_start_year(),
            split_reforecast: false,
            zarr: true,
        }
    }
}

fn default_start_year() -> i32 {
    2002
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceConfig {
    /// NetCDF file whose `latitude`/`longitude` define the target grid.
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default = "default_resolution")]
    pub resolution_degrees: f64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            template: None,
            resolution_degrees: default_resolution(),
        }
    }
}

fn default_resolution() -> f64 {
    S2S_RESOLUTION_DEGREES
}

impl ReferenceConfig {
    /// A template file takes precedence over the regular grid.
    pub fn source(&self) -> ReferenceSource {
        match &self.template {
            Some(path) => ReferenceSource::Template(path.clone()),
            None => ReferenceSource::Regular {
                resolution_degrees: self.resolution_degrees,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: LogLevel,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            timestamps: true,
        }
    }
}

fn default_level() -> LogLevel {
    LogLevel::Info
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Parses a TOML document.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Reads `path`, or `DEFAULT_CONFIG_FILE` if it exists, or falls back to
    /// the built-in defaults. An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&text, &path)
    }

    /// Applies `S2S_OBS_INPUT` / `S2S_OBS_OUTDIR` from the process
    /// environment, after loading a `.env` file if one is present.
    pub fn apply_environment(&mut self) {
        dotenv::dotenv().ok();
        self.apply_env_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`; empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(input) = lookup(ENV_INPUT).filter(|v| !v.is_empty()) {
            self.io.input = PathBuf::from(input);
        }
        if let Some(outdir) = lookup(ENV_OUTDIR).filter(|v| !v.is_empty()) {
            self.io.outdir = PathBuf::from(outdir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cal = &self.calendar;
        if cal.reforecast_start_year > cal.reforecast_end_year {
            return Err(ConfigError::Invalid(format!(
                "reforecast_start_year {} is after reforecast_end_year {}",
                cal.reforecast_start_year, cal.reforecast_end_year
            )));
        }
        if cal.lead_days == 0 {
            return Err(ConfigError::Invalid("lead_days must be positive".to_string()));
        }
        if cal.init_interval_days == 0 {
            return Err(ConfigError::Invalid(
                "init_interval_days must be positive".to_string(),
            ));
        }
        let res = self.reference.resolution_degrees;
        if !(res.is_finite() && res > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "resolution_degrees must be positive, got {}",
                res
            )));
        }
        Ok(())
    }
}
