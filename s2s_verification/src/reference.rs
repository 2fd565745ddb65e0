//! Target latitude/longitude grid of the competition datasets.
//!
//! Every product is interpolated onto this grid before it is written. The
//! grid is either a regular global lat/lon grid or read from a template file,
//! and is resolved at most once per run through `ReferenceGridCache`.

use std::path::PathBuf;

use once_cell::unsync::OnceCell;

use crate::logging::{self, Stage};
use crate::store::{self, StoreError};

/// Resolution of the S2S competition grid, in degrees.
pub const S2S_RESOLUTION_DEGREES: f64 = 1.5;

/// Target latitude and longitude axes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGrid {
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
}

impl ReferenceGrid {
    pub fn new(latitude: Vec<f64>, longitude: Vec<f64>) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Global regular grid: latitudes from 90 down to -90, longitudes from 0
    /// eastwards up to (but excluding) 360.
    pub fn regular(resolution_degrees: f64) -> Self {
        let n_lat = (180.0 / resolution_degrees).round() as usize + 1;
        let n_lon = (360.0 / resolution_degrees).round() as usize;
        Self {
            latitude: (0..n_lat)
                .map(|i| 90.0 - i as f64 * resolution_degrees)
                .collect(),
            longitude: (0..n_lon).map(|i| i as f64 * resolution_degrees).collect(),
        }
    }

    /// `(latitudes, longitudes)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.latitude.len(), self.longitude.len())
    }
}

/// Where the reference grid comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceSource {
    Regular { resolution_degrees: f64 },
    /// NetCDF file carrying `latitude` and `longitude` coordinate variables.
    Template(PathBuf),
}

impl Default for ReferenceSource {
    fn default() -> Self {
        ReferenceSource::Regular {
            resolution_degrees: S2S_RESOLUTION_DEGREES,
        }
    }
}

/// Lazily resolved reference grid, shared by reference between the product
/// builders of one run. Resolved on first use and never replaced.
#[derive(Debug)]
pub struct ReferenceGridCache {
    source: ReferenceSource,
    grid: OnceCell<ReferenceGrid>,
}

impl ReferenceGridCache {
    pub fn new(source: ReferenceSource) -> Self {
        Self {
            source,
            grid: OnceCell::new(),
        }
    }

    /// Returns the grid, resolving it on the first call.
    pub fn get(&self) -> Result<&ReferenceGrid, StoreError> {
        self.grid.get_or_try_init(|| {
            let grid = match &self.source {
                ReferenceSource::Regular { resolution_degrees } => {
                    ReferenceGrid::regular(*resolution_degrees)
                }
                ReferenceSource::Template(path) => store::read_reference_grid(path)?,
            };
            let (n_lat, n_lon) = grid.shape();
            logging::info(
                Stage::Reference,
                None,
                &format!("target final coords: {} latitudes x {} longitudes", n_lat, n_lon),
            );
            Ok(grid)
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.grid.get().is_some()
    }
}
