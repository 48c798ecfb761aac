//! Standardized drought-index computation across independent sites
//!
//! Each site's 365-aligned balance series is handed to an injected
//! normalization capability (the published log-logistic transform for
//! drought indices lives outside this crate) together with a rolling window
//! length in days. Sites have no data dependency on one another, so dispatch
//! is embarrassingly parallel over a fixed-size local pool; results are
//! reassembled in the original site order regardless of completion order.
//!
//! Batch policy: the first per-site hard condition (a partially-missing
//! series, a non-converging fit) fails the whole batch with the offending
//! site in the error. An entirely missing site is not an error; it yields a
//! same-length all-missing result without touching the normalizer, which is
//! the expected shape of ocean and water-body cells in regional runs.

use crate::balance::WaterBalanceSeries;
use crate::errors::{AridityError, Result};
use crate::parallel::WorkerBudget;
use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;

/// Pluggable normalization capability.
///
/// Given a strictly regular series (365 samples per year, no interior holes)
/// and a rolling window length in days, returns a same-length sequence of
/// standardized values: zero for average conditions, negative for
/// drier-than-normal, positive for wetter-than-normal.
///
/// Implementations must be callable from multiple worker threads at once.
pub trait Normalizer: Sync {
    /// # Errors
    ///
    /// Non-convergence or any other fit failure; the engine wraps it into
    /// [`AridityError::Fit`] for the affected site.
    fn normalize(&self, series: &[f64], window: usize) -> Result<Vec<f64>>;
}

/// Per-site standardized index series; NaN marks missing values
#[derive(Debug, Clone)]
pub struct IndexSeries {
    pub site: usize,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl IndexSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Fits the standardized index per site, in parallel
pub struct IndexEngine<'a> {
    normalizer: &'a dyn Normalizer,
    start_year: i32,
    window: usize,
    budget: WorkerBudget,
}

impl<'a> IndexEngine<'a> {
    pub fn new(
        normalizer: &'a dyn Normalizer,
        start_year: i32,
        window: usize,
        budget: WorkerBudget,
    ) -> Self {
        Self {
            normalizer,
            start_year,
            window,
            budget,
        }
    }

    /// Compute one [`IndexSeries`] per balance series.
    ///
    /// Output order equals input order for any worker count; the parallel
    /// collect preserves indices, so ordering is a guarantee of the
    /// reassembly boundary rather than a scheduling accident.
    ///
    /// # Errors
    ///
    /// - `IncompleteSeries` when a site mixes missing and present values.
    /// - `Fit` when the normalizer fails for a site or returns a series of
    ///   the wrong length.
    /// - `Generic` when a site's series does not start in the configured
    ///   start year.
    pub fn compute(&self, series: &[WaterBalanceSeries]) -> Result<Vec<IndexSeries>> {
        let pool = self.budget.build_pool()?;
        println!(
            "⚡ Fitting {} sites across {} workers",
            series.len(),
            self.budget.workers
        );

        pool.install(|| {
            series
                .par_iter()
                .map(|s| self.compute_site(s))
                .collect::<Result<Vec<_>>>()
        })
    }

    fn compute_site(&self, s: &WaterBalanceSeries) -> Result<IndexSeries> {
        if let Some(first) = s.dates.first() {
            if first.year() != self.start_year {
                return Err(AridityError::Generic(format!(
                    "site {} series starts in {}, engine configured for start year {}",
                    s.site,
                    first.year(),
                    self.start_year
                )));
            }
        }

        let missing = s.balance.iter().filter(|v| v.is_nan()).count();
        let total = s.balance.len();

        // Ocean/water-body cells: skip, do not fail, never call the fit.
        if missing == total {
            return Ok(IndexSeries {
                site: s.site,
                dates: s.dates.clone(),
                values: vec![f64::NAN; total],
            });
        }
        if missing > 0 {
            return Err(AridityError::IncompleteSeries {
                site: s.site,
                missing,
                total,
            });
        }

        let values = self
            .normalizer
            .normalize(&s.balance, self.window)
            .map_err(|e| AridityError::Fit {
                site: s.site,
                message: e.to_string(),
            })?;
        if values.len() != total {
            return Err(AridityError::Fit {
                site: s.site,
                message: format!(
                    "normalizer returned {} values for {} inputs",
                    values.len(),
                    total
                ),
            });
        }

        Ok(IndexSeries {
            site: s.site,
            dates: s.dates.clone(),
            values,
        })
    }
}
