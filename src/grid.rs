//! Spatial-temporal raster stacks and grid transformations
//!
//! This module provides the [`RasterSeries`] type, an ordered-by-time stack of
//! 2-D layers sharing a coordinate reference system and extent, together with
//! the time-filter, resample and aggregate operations the analysis pipeline is
//! built on. Raster container decoding is delegated to a [`RasterSource`]
//! collaborator; the core only ever sees in-memory layers.
//!
//! All transformations return a new series; inputs are never mutated in place.
//! Missing values are represented as NaN throughout.

use crate::errors::{AridityError, Result};
use chrono::NaiveDate;
use ndarray::Array2;
use std::path::Path;

/// Coordinate reference system identifier (e.g. "EPSG:4326")
///
/// Two systems are considered compatible if and only if their codes are
/// equal; reconciling different systems is the job of the GIS collaborators,
/// not of this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crs(pub String);

impl Crs {
    pub fn new(code: &str) -> Self {
        Self(code.to_string())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

/// Georeference of a regular grid.
///
/// `x0` is the left edge and `y0` the top edge; `dy` is measured downward so
/// row 0 is the northernmost row, matching the usual raster layout.
#[derive(Debug, Clone, PartialEq)]
pub struct GridExtent {
    pub x0: f64,
    pub y0: f64,
    pub dx: f64,
    pub dy: f64,
    pub width: usize,
    pub height: usize,
}

impl GridExtent {
    /// Shape as (rows, cols), matching `Array2` layout.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// World coordinate of a cell center.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.x0 + (col as f64 + 0.5) * self.dx,
            self.y0 - (row as f64 + 0.5) * self.dy,
        )
    }

    /// Cell index containing a world coordinate, or `None` when outside.
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = (x - self.x0) / self.dx;
        let row = (self.y0 - y) / self.dy;
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        if row < self.height && col < self.width {
            Some((row, col))
        } else {
            None
        }
    }

    /// Extent of this grid coarsened by an integer factor.
    ///
    /// Partial blocks at the right/bottom margin are kept, so the coarse
    /// dimensions are rounded up.
    pub fn coarsen(&self, factor: usize) -> Self {
        Self {
            x0: self.x0,
            y0: self.y0,
            dx: self.dx * factor as f64,
            dy: self.dy * factor as f64,
            width: self.width.div_ceil(factor),
            height: self.height.div_ceil(factor),
        }
    }
}

/// Interpolation method used when regridding onto another footprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResampleMethod {
    /// Bilinear interpolation, the default for continuous fields.
    /// A target cell touching any missing source neighbour becomes missing.
    #[default]
    Bilinear,
    /// Nearest-cell lookup, for categorical or already-aligned fields
    Nearest,
}

/// Ordered-by-time stack of 2-D layers sharing CRS, resolution and extent.
///
/// Invariants, enforced at construction: timestamps strictly increasing with
/// no duplicates, one layer per timestamp, and every layer shaped exactly
/// like the extent.
#[derive(Debug, Clone)]
pub struct RasterSeries {
    pub crs: Crs,
    pub extent: GridExtent,
    pub timestamps: Vec<NaiveDate>,
    pub layers: Vec<Array2<f32>>,
}

impl RasterSeries {
    /// Create a new raster series, validating the stack invariants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSeries` if the timestamp and layer counts differ, if
    /// timestamps are not strictly increasing, or if any layer's shape does
    /// not match the extent.
    pub fn new(
        crs: Crs,
        extent: GridExtent,
        timestamps: Vec<NaiveDate>,
        layers: Vec<Array2<f32>>,
    ) -> Result<Self> {
        if timestamps.len() != layers.len() {
            return Err(AridityError::InvalidSeries(format!(
                "{} timestamps but {} layers",
                timestamps.len(),
                layers.len()
            )));
        }
        if timestamps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AridityError::InvalidSeries(
                "timestamps must be strictly increasing with no duplicates".to_string(),
            ));
        }
        for (i, layer) in layers.iter().enumerate() {
            if layer.dim() != extent.shape() {
                return Err(AridityError::InvalidSeries(format!(
                    "layer {} has shape {:?}, extent expects {:?}",
                    i,
                    layer.dim(),
                    extent.shape()
                )));
            }
        }
        Ok(Self {
            crs,
            extent,
            timestamps,
            layers,
        })
    }

    /// Number of layers (timestamps) in the stack.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Keep only layers with timestamp in `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns `EmptyRange` when no layer falls inside the window; an empty
    /// selection always indicates a wrong analysis setup here, so it is never
    /// silently returned.
    pub fn restrict_to_time_range(&self, start: NaiveDate, end: NaiveDate) -> Result<RasterSeries> {
        let mut timestamps = Vec::new();
        let mut layers = Vec::new();
        for (ts, layer) in self.timestamps.iter().zip(&self.layers) {
            if *ts >= start && *ts < end {
                timestamps.push(*ts);
                layers.push(layer.clone());
            }
        }
        if timestamps.is_empty() {
            return Err(AridityError::EmptyRange {
                window: format!("[{start}, {end})"),
            });
        }
        RasterSeries::new(self.crs.clone(), self.extent.clone(), timestamps, layers)
    }

    /// Regrid every layer onto the spatial footprint of `reference`.
    ///
    /// Timestamps are preserved unchanged. Both grids must share a CRS; this
    /// crate performs no reprojection of its own.
    ///
    /// # Errors
    ///
    /// Returns `GridMismatch` when the coordinate reference systems differ.
    pub fn resample_to(
        &self,
        reference: &RasterSeries,
        method: ResampleMethod,
    ) -> Result<RasterSeries> {
        if self.crs != reference.crs {
            return Err(AridityError::GridMismatch {
                expected: reference.crs.code().to_string(),
                found: self.crs.code().to_string(),
            });
        }

        let target = &reference.extent;
        let layers: Vec<Array2<f32>> = self
            .layers
            .iter()
            .map(|layer| {
                Array2::from_shape_fn(target.shape(), |(row, col)| {
                    let (x, y) = target.cell_center(row, col);
                    match method {
                        ResampleMethod::Nearest => self.sample_nearest(layer, x, y),
                        ResampleMethod::Bilinear => self.sample_bilinear(layer, x, y),
                    }
                })
            })
            .collect();

        RasterSeries::new(
            self.crs.clone(),
            target.clone(),
            self.timestamps.clone(),
            layers,
        )
    }

    /// Spatially downsample by block-averaging `factor x factor` cells.
    ///
    /// Missing cells are ignored in the block mean; a block that is entirely
    /// missing remains missing. Timestamps do not survive the per-layer
    /// aggregation on their own and are re-attached explicitly, with a
    /// post-condition check that the layer count is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSeries` for a zero factor or if the aggregated stack
    /// no longer matches the timestamp count.
    pub fn aggregate(&self, factor: usize) -> Result<RasterSeries> {
        if factor == 0 {
            return Err(AridityError::InvalidSeries(
                "aggregation factor must be at least 1".to_string(),
            ));
        }
        let coarse = self.extent.coarsen(factor);
        let layers: Vec<Array2<f32>> = self
            .layers
            .iter()
            .map(|layer| block_mean(layer, factor, coarse.shape()))
            .collect();

        // Aggregation must not drop or duplicate layers.
        if layers.len() != self.timestamps.len() {
            return Err(AridityError::InvalidSeries(format!(
                "aggregation produced {} layers for {} timestamps",
                layers.len(),
                self.timestamps.len()
            )));
        }

        RasterSeries::new(self.crs.clone(), coarse, self.timestamps.clone(), layers)
    }

    fn sample_nearest(&self, layer: &Array2<f32>, x: f64, y: f64) -> f32 {
        match self.extent.locate(x, y) {
            Some((row, col)) => layer[[row, col]],
            None => f32::NAN,
        }
    }

    fn sample_bilinear(&self, layer: &Array2<f32>, x: f64, y: f64) -> f32 {
        let ext = &self.extent;
        // Fractional position in cell-center space.
        let fc = (x - ext.x0) / ext.dx - 0.5;
        let fr = (ext.y0 - y) / ext.dy - 0.5;
        if fc < 0.0 || fr < 0.0 || fc > (ext.width - 1) as f64 || fr > (ext.height - 1) as f64 {
            // Outside the hull of cell centers: fall back to nearest so the
            // outermost half-cell ring still samples.
            return self.sample_nearest(layer, x, y);
        }
        let c0 = fc.floor() as usize;
        let r0 = fr.floor() as usize;
        let c1 = (c0 + 1).min(ext.width - 1);
        let r1 = (r0 + 1).min(ext.height - 1);
        let tx = (fc - c0 as f64) as f32;
        let ty = (fr - r0 as f64) as f32;

        let v00 = layer[[r0, c0]];
        let v01 = layer[[r0, c1]];
        let v10 = layer[[r1, c0]];
        let v11 = layer[[r1, c1]];

        let top = v00 * (1.0 - tx) + v01 * tx;
        let bottom = v10 * (1.0 - tx) + v11 * tx;
        top * (1.0 - ty) + bottom * ty
    }
}

/// NaN-skipping block mean of one layer.
fn block_mean(layer: &Array2<f32>, factor: usize, out_shape: (usize, usize)) -> Array2<f32> {
    let (rows, cols) = layer.dim();
    Array2::from_shape_fn(out_shape, |(br, bc)| {
        let mut sum = 0.0_f64;
        let mut count = 0_u32;
        for r in br * factor..((br + 1) * factor).min(rows) {
            for c in bc * factor..((bc + 1) * factor).min(cols) {
                let v = layer[[r, c]];
                if v.is_finite() {
                    sum += f64::from(v);
                    count += 1;
                }
            }
        }
        if count > 0 {
            (sum / f64::from(count)) as f32
        } else {
            f32::NAN
        }
    })
}

/// Single 2-D anomaly layer with the spatial footprint of its source series
#[derive(Debug, Clone)]
pub struct AnomalyGrid {
    pub crs: Crs,
    pub extent: GridExtent,
    pub data: Array2<f32>,
}

/// Opaque raster container collaborator.
///
/// Decoding and encoding of on-disk raster formats is out of scope for this
/// crate; implementations of this trait bridge to whatever container the
/// surrounding tooling uses.
pub trait RasterSource {
    /// Open a container and return its stack with time and CRS metadata.
    fn open(&self, path: &Path) -> Result<RasterSeries>;

    /// Export a single anomaly layer to a container.
    fn write_grid(&self, path: &Path, grid: &AnomalyGrid) -> Result<()>;
}
