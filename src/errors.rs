//! Centralized error handling for aridity
//!
//! This module provides structured error types to replace generic
//! `Box<dyn Error>` plumbing, separating fatal input-integrity errors from
//! per-site statistical conditions.

use std::fmt;

/// Main error type for aridity operations
#[derive(Debug)]
pub enum AridityError {
    /// A requested time window selected zero layers
    EmptyRange { window: String },

    /// Coordinate reference systems are incompatible and cannot be reconciled
    GridMismatch { expected: String, found: String },

    /// Precipitation and PET inputs describe different (site, timestamp) sets
    Alignment { message: String },

    /// Per-site record count is not a multiple of 365 after leap-day removal
    IrregularCalendar { site: usize, len: usize },

    /// A site mixes missing and present values, which the normalization
    /// capability cannot tolerate
    IncompleteSeries { site: usize, missing: usize, total: usize },

    /// The normalization capability failed for one site
    Fit { site: usize, message: String },

    /// Raster series construction or transformation errors
    InvalidSeries(String),

    /// Thread pool configuration error
    ThreadPool(String),

    /// Array shape or dimension error
    Shape(ndarray::ShapeError),

    /// I/O operation errors
    Io(std::io::Error),

    /// Generic error for collaborator-reported conditions
    Generic(String),
}

impl fmt::Display for AridityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AridityError::EmptyRange { window } => {
                write!(f, "Time window {window} selects no layers")
            }
            AridityError::GridMismatch { expected, found } => {
                write!(
                    f,
                    "Incompatible coordinate reference systems: expected '{expected}', found '{found}'"
                )
            }
            AridityError::Alignment { message } => {
                write!(f, "Precipitation/PET alignment error: {message}")
            }
            AridityError::IrregularCalendar { site, len } => {
                write!(
                    f,
                    "Site {site}: {len} records after leap-day removal is not a multiple of 365"
                )
            }
            AridityError::IncompleteSeries { site, missing, total } => {
                write!(
                    f,
                    "Site {site}: {missing} of {total} balance values missing; partial gaps are not tolerated"
                )
            }
            AridityError::Fit { site, message } => {
                write!(f, "Normalization failed for site {site}: {message}")
            }
            AridityError::InvalidSeries(msg) => write!(f, "Invalid raster series: {msg}"),
            AridityError::ThreadPool(msg) => write!(f, "Thread pool error: {msg}"),
            AridityError::Shape(e) => write!(f, "Array error: {e}"),
            AridityError::Io(e) => write!(f, "I/O error: {e}"),
            AridityError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for AridityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AridityError::Shape(e) => Some(e),
            AridityError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ndarray::ShapeError> for AridityError {
    fn from(error: ndarray::ShapeError) -> Self {
        AridityError::Shape(error)
    }
}

impl From<std::io::Error> for AridityError {
    fn from(error: std::io::Error) -> Self {
        AridityError::Io(error)
    }
}

impl From<String> for AridityError {
    fn from(error: String) -> Self {
        AridityError::Generic(error)
    }
}

impl From<&str> for AridityError {
    fn from(error: &str) -> Self {
        AridityError::Generic(error.to_string())
    }
}

/// Result type alias for aridity operations
pub type Result<T> = std::result::Result<T, AridityError>;
