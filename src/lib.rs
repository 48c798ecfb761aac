//! Aridity: standardized drought indices and climate anomaly grids
//!
//! A Rust library for turning gridded, time-stamped climate observations
//! (precipitation, potential evapotranspiration, temperature) into a
//! standardized drought index and into period-vs-climatology anomaly maps.
//!
//! ## Key Features
//!
//! - **Grid alignment**: time filtering, bilinear regridding and
//!   block-average aggregation of raster stacks with NaN-aware semantics
//! - **Series extraction**: long-form per-site records from point locations
//!   or synthetic grid-cell centers
//! - **Calendar regularity**: water-balance assembly with leap-day removal
//!   so every year contributes exactly 365 daily records
//! - **Parallel fitting**: per-site index computation over a fixed-size
//!   worker pool with deterministic, site-ordered results
//! - **Anomaly grids**: per-cell target-vs-climatology mean differences
//!
//! ## Module Organization
//!
//! - [`grid`]: raster stacks, extents and spatial transformations
//! - [`sampler`]: site definitions and per-site series extraction
//! - [`balance`]: water-balance joining and calendar checks
//! - [`engine`]: the per-site index engine and its normalization seam
//! - [`anomaly`]: period-vs-climatology anomaly layers
//! - [`parallel`]: explicit worker-pool configuration
//! - [`export`]: long-form result tables (CSV/JSON)
//! - [`orchestrator`]: site-level and regional end-to-end analyses
//! - [`errors`]: centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use aridity::prelude::*;
//!
//! struct MyFit;
//! impl Normalizer for MyFit {
//!     fn normalize(&self, series: &[f64], _window: usize) -> aridity::Result<Vec<f64>> {
//!         Ok(series.to_vec()) // plug in the real log-logistic transform here
//!     }
//! }
//!
//! fn run(precip: &RasterSeries, pet: &RasterSeries, sites: &[Site]) -> aridity::Result<()> {
//!     let options = AnalysisOptions {
//!         start_year: 2000,
//!         window: 21,
//!         budget: WorkerBudget::all_cores(),
//!         time_range: None,
//!     };
//!     let table = run_site_analysis(precip, pet, sites, &IdentityProjector, &MyFit, &options)?;
//!     table.write_csv("drought_index.csv".as_ref())?;
//!     Ok(())
//! }
//! ```
//!
//! Raster container decoding, vector-point parsing and the statistical
//! normalization transform itself are collaborator concerns, consumed
//! through the [`grid::RasterSource`], [`sampler::SiteProjector`] and
//! [`engine::Normalizer`] traits.

// Core modules
pub mod anomaly;
pub mod balance;
pub mod engine;
pub mod errors;
pub mod export;
pub mod grid;
pub mod orchestrator;
pub mod parallel;
pub mod sampler;

// Direct re-exports for the public API
pub use anomaly::*;
pub use balance::*;
pub use engine::*;
pub use errors::*;
pub use export::*;
pub use grid::*;
pub use orchestrator::*;
pub use parallel::*;
pub use sampler::*;

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::anomaly::AnomalyCalculator;
    pub use crate::balance::{WaterBalanceBuilder, WaterBalanceSeries};
    pub use crate::engine::{IndexEngine, IndexSeries, Normalizer};
    pub use crate::errors::{AridityError, Result};
    pub use crate::export::IndexTable;
    pub use crate::grid::{AnomalyGrid, Crs, GridExtent, RasterSeries, RasterSource, ResampleMethod};
    pub use crate::orchestrator::{run_regional_analysis, run_site_analysis, AnalysisOptions};
    pub use crate::parallel::WorkerBudget;
    pub use crate::sampler::{IdentityProjector, Sampler, Site, SiteProjector};
}
