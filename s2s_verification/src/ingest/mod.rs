//! Readers for raw observation archives.
//!
//! Submodules:
//! - `cpc`: NOAA CPC daily temperature and unified precipitation files.

pub mod cpc;
