//! Climatic water balance assembly
//!
//! Joins per-site precipitation and potential-evapotranspiration records into
//! balance series (P − PET) and enforces the calendar regularity the
//! normalization step depends on: after removing the single intercalary day
//! of leap years, every site must contribute an exact multiple of 365 daily
//! records.
//!
//! Alignment between the two inputs is a hard precondition. A mismatch means
//! the two variables were sampled on different grids or time ranges, which no
//! amount of reconciliation can repair, so it aborts the run.

use crate::errors::{AridityError, Result};
use crate::sampler::SeriesRecord;
use chrono::{Datelike, NaiveDate};

/// Days per year after intercalary-day removal
pub const DAYS_PER_YEAR: usize = 365;

/// Per-site joined balance series with parallel, time-ordered columns
#[derive(Debug, Clone)]
pub struct WaterBalanceSeries {
    pub site: usize,
    pub dates: Vec<NaiveDate>,
    pub precip: Vec<f64>,
    pub pet: Vec<f64>,
    pub balance: Vec<f64>,
}

impl WaterBalanceSeries {
    pub fn len(&self) -> usize {
        self.balance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balance.is_empty()
    }
}

/// Joins precipitation and PET records into per-site balance series
pub struct WaterBalanceBuilder;

impl WaterBalanceBuilder {
    /// Build one [`WaterBalanceSeries`] per site.
    ///
    /// The inputs may arrive in any order; both are sorted by (site, date)
    /// before joining. Leap-day removal drops Dec-31 of leap years, the
    /// convention inherited from the upstream analysis; surrounding window
    /// calculations are intentionally not renormalized (documented
    /// limitation).
    ///
    /// # Errors
    ///
    /// - `Alignment` when the (site, date) key sequences differ by even a
    ///   single record.
    /// - `IrregularCalendar` when a site's record count is not a multiple of
    ///   365 after leap-day removal.
    pub fn build(
        precip: &[SeriesRecord],
        pet: &[SeriesRecord],
    ) -> Result<Vec<WaterBalanceSeries>> {
        let precip = sorted_by_key(precip);
        let pet = sorted_by_key(pet);

        if precip.len() != pet.len() {
            return Err(AridityError::Alignment {
                message: format!(
                    "{} precipitation records vs {} PET records",
                    precip.len(),
                    pet.len()
                ),
            });
        }
        for (p, e) in precip.iter().zip(&pet) {
            if p.site != e.site || p.date != e.date {
                return Err(AridityError::Alignment {
                    message: format!(
                        "precipitation has (site {}, {}) where PET has (site {}, {})",
                        p.site, p.date, e.site, e.date
                    ),
                });
            }
        }

        let mut series: Vec<WaterBalanceSeries> = Vec::new();
        for (p, e) in precip.iter().zip(&pet) {
            if is_removed_leap_day(p.date) {
                continue;
            }
            match series.last_mut() {
                Some(current) if current.site == p.site => {
                    current.dates.push(p.date);
                    current.precip.push(p.value);
                    current.pet.push(e.value);
                    current.balance.push(p.value - e.value);
                }
                _ => series.push(WaterBalanceSeries {
                    site: p.site,
                    dates: vec![p.date],
                    precip: vec![p.value],
                    pet: vec![e.value],
                    balance: vec![p.value - e.value],
                }),
            }
        }

        for s in &series {
            if s.len() % DAYS_PER_YEAR != 0 {
                return Err(AridityError::IrregularCalendar {
                    site: s.site,
                    len: s.len(),
                });
            }
        }

        Ok(series)
    }
}

/// The intercalary day dropped to keep every year at 365 records.
///
/// Dec-31 of leap years is removed, matching the upstream convention of
/// truncating the year's tail rather than skipping Feb-29.
pub fn is_removed_leap_day(date: NaiveDate) -> bool {
    date.leap_year() && date.month() == 12 && date.day() == 31
}

fn sorted_by_key(records: &[SeriesRecord]) -> Vec<SeriesRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| (a.site, a.date).cmp(&(b.site, b.date)));
    sorted
}
