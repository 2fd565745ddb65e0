//! Verification datasets for the S2S forecast competition.
//!
//! Turns daily CPC gridded observations into archival daily/weekly series
//! and into grids indexed by forecast reference time and lead time, so
//! forecasts can be scored cell by cell.

pub mod build;
pub mod calendar;
pub mod config;
pub mod dev_mode;
pub mod forecast;
pub mod grid;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod reference;
pub mod store;
pub mod valid_time;
pub mod verify;

pub use model::{IndexError, LeadTime};
pub use valid_time::{ValidTimeIndex, build_valid_times};
