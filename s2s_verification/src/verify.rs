//! Output Verification Module
//!
//! Checks every written product against what it is supposed to contain and
//! collects the results in a `VerificationReport`, saved as JSON next to
//! the products.
//!
//! A product is `Success` when every time step (archival series) or every
//! `(init, lead)` cell (forecast grids) has observations, `PartialSuccess`
//! when some are missing, and `Failed` when its layout is wrong or nothing
//! was observed at all. After writing, `confirm_layout` compares the result
//! with the dimensions read back from the file.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::forecast::ForecastGrid;
use crate::grid::GriddedSeries;
use crate::logging::{self, Stage};
use crate::model::{
    DIM_FORECAST_REFERENCE_TIME, DIM_LATITUDE, DIM_LEAD_TIME, DIM_LONGITUDE, DIM_TIME,
};
use crate::store::StoreError;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub products: Vec<ProductVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub complete: usize,
    pub partial: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVerification {
    /// File name of the product.
    pub product: String,
    pub variable: String,
    pub status: VerificationStatus,
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    /// Time steps or `(init, lead)` cells checked.
    pub total_cells: usize,
    pub missing_cells: usize,
    pub missing_fraction: f64,
    pub first_time: Option<String>,
    pub last_time: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl VerificationStatus {
    fn from_counts(total: usize, missing: usize) -> Self {
        if total == 0 || missing == total {
            VerificationStatus::Failed
        } else if missing > 0 {
            VerificationStatus::PartialSuccess
        } else {
            VerificationStatus::Success
        }
    }
}

fn fraction(missing: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        missing as f64 / total as f64
    }
}

fn product_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Product checks
// ============================================================================

/// Checks an archival `(time, latitude, longitude)` series. A time step
/// counts as missing when no grid cell has a value.
pub fn verify_series(path: &Path, series: &GriddedSeries) -> ProductVerification {
    let total = series.time.len();
    let missing = series
        .values
        .outer_iter()
        .filter(|step| step.iter().all(|v| v.is_nan()))
        .count();

    let status = VerificationStatus::from_counts(total, missing);
    let error_message = match status {
        VerificationStatus::Failed => Some("no observed values".to_string()),
        _ => None,
    };

    ProductVerification {
        product: product_name(path),
        variable: series.name.clone(),
        status,
        dims: [DIM_TIME, DIM_LATITUDE, DIM_LONGITUDE]
            .iter()
            .map(|d| d.to_string())
            .collect(),
        shape: series.values.shape().to_vec(),
        total_cells: total,
        missing_cells: missing,
        missing_fraction: fraction(missing, total),
        first_time: series.time.first().map(|d| d.to_string()),
        last_time: series.time.last().map(|d| d.to_string()),
        error_message,
    }
}

/// Checks a forecast-indexed grid: both forecast axes present, value shape
/// agreeing with its valid-time index, and the share of missing cells.
pub fn verify_forecast(path: &Path, grid: &ForecastGrid) -> ProductVerification {
    let total = grid.cell_count();
    let missing = grid.missing_cells();
    let (n_init, n_lead) = grid.index.shape();
    let shape = grid.values.shape().to_vec();

    let mut problems = Vec::new();
    for axis in [DIM_FORECAST_REFERENCE_TIME, DIM_LEAD_TIME] {
        if !grid.has_dim(axis) {
            problems.push(format!("missing '{}' axis", axis));
        }
    }
    if shape[..2] != [n_init, n_lead] || grid.available.dim() != (n_init, n_lead) {
        problems.push(format!(
            "values {:?} disagree with index {}x{}",
            shape, n_init, n_lead
        ));
    }

    let (status, error_message) = if problems.is_empty() {
        let status = VerificationStatus::from_counts(total, missing);
        let message =
            (status == VerificationStatus::Failed).then(|| "no observed values".to_string());
        (status, message)
    } else {
        (VerificationStatus::Failed, Some(problems.join("; ")))
    };

    let (first, last) = grid.index.valid_range();
    ProductVerification {
        product: product_name(path),
        variable: grid.name.clone(),
        status,
        dims: grid.dims().iter().map(|d| d.to_string()).collect(),
        shape,
        total_cells: total,
        missing_cells: missing,
        missing_fraction: fraction(missing, total),
        first_time: Some(first.to_string()),
        last_time: Some(last.to_string()),
        error_message,
    }
}

/// Checks the dimensions stored in the written file against the product's
/// expected `dims` and `shape`. A mismatch fails the product.
pub fn confirm_layout(
    mut result: ProductVerification,
    written: &[(String, usize)],
) -> ProductVerification {
    let expected: Vec<(String, usize)> = result
        .dims
        .iter()
        .cloned()
        .zip(result.shape.iter().copied())
        .collect();
    if written != expected.as_slice() {
        let problem = format!("file stores {:?}, expected {:?}", written, expected);
        result.status = VerificationStatus::Failed;
        result.error_message = Some(match result.error_message.take() {
            Some(previous) => format!("{}; {}", previous, problem),
            None => problem,
        });
    }
    result
}

// ============================================================================
// Report
// ============================================================================

impl VerificationReport {
    pub fn new(products: Vec<ProductVerification>) -> Self {
        let count =
            |status: VerificationStatus| products.iter().filter(|p| p.status == status).count();
        let summary = VerificationSummary {
            total: products.len(),
            complete: count(VerificationStatus::Success),
            partial: count(VerificationStatus::PartialSuccess),
            failed: count(VerificationStatus::Failed),
        };
        Self {
            timestamp: Utc::now().to_rfc3339(),
            products,
            summary,
        }
    }
}

/// Saves the report as pretty-printed JSON.
pub fn write_report(path: &Path, report: &VerificationReport) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn print_summary(report: &VerificationReport) {
    let s = &report.summary;
    logging::info(Stage::System, None, "═══════════════════════════════════════════");
    logging::info(Stage::System, None, "VERIFICATION SUMMARY");
    logging::info(Stage::System, None, "═══════════════════════════════════════════");
    for p in &report.products {
        let line = format!(
            "{:<70} {:?} ({}/{} missing)",
            p.product, p.status, p.missing_cells, p.total_cells
        );
        match p.status {
            VerificationStatus::Success => logging::info(Stage::System, None, &line),
            VerificationStatus::PartialSuccess => {
                logging::warn(Stage::System, Some(&p.variable), &line)
            }
            VerificationStatus::Failed => logging::error(Stage::System, Some(&p.variable), &line),
        }
    }
    logging::info(
        Stage::System,
        None,
        &format!(
            "Products: {} complete, {} partial, {} failed (of {})",
            s.complete, s.partial, s.failed, s.total
        ),
    );
}
