//! Period-vs-climatology anomaly grids
//!
//! An anomaly is the per-cell mean over a target period minus the per-cell
//! mean over a climatological reference period. The reference period is the
//! same calendar window in every other year: it is computed as the symmetric
//! difference of "this month/day window in any year" and the exact target
//! window, which naturally excludes the target year's own window while
//! keeping the same dates of all other years.

use crate::errors::{AridityError, Result};
use crate::grid::{AnomalyGrid, RasterSeries};
use chrono::{Datelike, NaiveDate};
use ndarray::Array2;
use std::ops::RangeInclusive;

/// Computes period-vs-climatology anomaly layers from a raster stack
pub struct AnomalyCalculator;

impl AnomalyCalculator {
    /// Anomaly of `[target_start, target_end)` against the climatology of
    /// `reference_day_range` within `reference_month` across all other years.
    ///
    /// Missing cells are skipped in each period mean; a cell missing in every
    /// contributing layer of a period yields a missing anomaly.
    ///
    /// # Errors
    ///
    /// Returns `EmptyRange` when either period selects zero layers.
    pub fn compute_anomaly(
        series: &RasterSeries,
        target_start: NaiveDate,
        target_end_exclusive: NaiveDate,
        reference_month: u32,
        reference_day_range: RangeInclusive<u32>,
    ) -> Result<AnomalyGrid> {
        let target: Vec<bool> = series
            .timestamps
            .iter()
            .map(|ts| *ts >= target_start && *ts < target_end_exclusive)
            .collect();
        let calendar: Vec<bool> = series
            .timestamps
            .iter()
            .map(|ts| ts.month() == reference_month && reference_day_range.contains(&ts.day()))
            .collect();
        let reference: Vec<bool> = calendar
            .iter()
            .zip(&target)
            .map(|(c, t)| c != t)
            .collect();

        Self::anomaly_between(series, &target, &reference)
    }

    /// Mask-level anomaly primitive: mean over `target`-selected layers minus
    /// mean over `reference`-selected layers.
    ///
    /// Identical masks produce an all-zero grid (all-missing where the inputs
    /// are missing), which pins down the sign and pairing of the two means.
    ///
    /// # Errors
    ///
    /// Returns `EmptyRange` when either mask selects zero layers, and
    /// `InvalidSeries` when a mask length does not match the stack.
    pub fn anomaly_between(
        series: &RasterSeries,
        target: &[bool],
        reference: &[bool],
    ) -> Result<AnomalyGrid> {
        if target.len() != series.len() || reference.len() != series.len() {
            return Err(AridityError::InvalidSeries(format!(
                "mask lengths {}/{} do not match {} layers",
                target.len(),
                reference.len(),
                series.len()
            )));
        }
        let target_mean = masked_mean(series, target, "target")?;
        let reference_mean = masked_mean(series, reference, "reference")?;

        Ok(AnomalyGrid {
            crs: series.crs.clone(),
            extent: series.extent.clone(),
            data: &target_mean - &reference_mean,
        })
    }
}

/// NaN-skipping elementwise mean over the mask-selected layers.
fn masked_mean(series: &RasterSeries, mask: &[bool], period: &str) -> Result<Array2<f32>> {
    let selected: Vec<&Array2<f32>> = series
        .layers
        .iter()
        .zip(mask)
        .filter_map(|(layer, keep)| keep.then_some(layer))
        .collect();
    if selected.is_empty() {
        return Err(AridityError::EmptyRange {
            window: format!("{period} period"),
        });
    }

    Ok(Array2::from_shape_fn(series.extent.shape(), |(row, col)| {
        let mut sum = 0.0_f64;
        let mut count = 0_u32;
        for layer in &selected {
            let v = layer[[row, col]];
            if v.is_finite() {
                sum += f64::from(v);
                count += 1;
            }
        }
        if count > 0 {
            (sum / f64::from(count)) as f32
        } else {
            f32::NAN
        }
    }))
}
