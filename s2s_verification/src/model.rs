//! Core data types for the S2S verification dataset builder.
//!
//! This module defines the shared domain model imported by all other modules:
//! lead times, the observed parameters and output frequencies, and the error
//! types raised while building the valid-time index. It contains no I/O.

use std::fmt;

use chrono::NaiveDate;

// ---------------------------------------------------------------------------
// Coordinate names
// ---------------------------------------------------------------------------

/// Name of the forecast initialisation axis in forecast-indexed products.
pub const DIM_FORECAST_REFERENCE_TIME: &str = "forecast_reference_time";

/// Name of the lead-time axis in forecast-indexed products.
pub const DIM_LEAD_TIME: &str = "lead_time";

/// Name of the 2-D valid-time coordinate.
pub const COORD_VALID_TIME: &str = "valid_time";

pub const DIM_TIME: &str = "time";
pub const DIM_LATITUDE: &str = "latitude";
pub const DIM_LONGITUDE: &str = "longitude";

/// Offset from degrees Celsius to Kelvin.
pub const CELSIUS_TO_KELVIN: f32 = 273.15;

// ---------------------------------------------------------------------------
// Lead time
// ---------------------------------------------------------------------------

/// Offset in whole days from a forecast reference time to its valid time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeadTime(pub u32);

impl LeadTime {
    pub fn days(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LeadTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} d", self.0)
    }
}

// ---------------------------------------------------------------------------
// Parameters and frequencies
// ---------------------------------------------------------------------------

/// Observed parameters written by this tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    /// 2 metre temperature, daily mean of CPC tmin/tmax, in Kelvin.
    Temperature,
    /// Total precipitation from the CPC unified gauge analysis.
    Precipitation,
}

impl Parameter {
    /// Short name used for the output variable and file names.
    pub fn short_name(self) -> &'static str {
        match self {
            Parameter::Temperature => "t2m",
            Parameter::Precipitation => "tp",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Temporal aggregation of an archival time-series product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while building a valid-time index.
///
/// Any of these must abort the batch job: a malformed index would silently
/// misalign forecasts and observations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexError {
    #[error("invalid input: no forecast reference times given")]
    EmptyInits,

    #[error("invalid input: no lead times given")]
    EmptyLeads,

    /// Reference times must be strictly increasing (no duplicates).
    #[error(
        "invalid input: forecast reference time {current} at position {position} \
         does not follow {previous}"
    )]
    NonIncreasingInits {
        position: usize,
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("calendar overflow: {init} + {lead_days} days is not a representable date")]
    CalendarOverflow { init: NaiveDate, lead_days: u32 },
}
