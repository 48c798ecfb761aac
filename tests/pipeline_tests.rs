//! End-to-end pipeline tests
//!
//! These exercise the full chain from raster stacks through sampling,
//! water-balance assembly and parallel index fitting, plus the documented
//! batch policies: all-missing sites are skipped without touching the
//! normalizer, while partial gaps and fit failures fail the batch.

use aridity::{
    balance::{WaterBalanceBuilder, WaterBalanceSeries},
    engine::{IndexEngine, Normalizer},
    errors::{AridityError, Result},
    export::IndexTable,
    grid::{Crs, GridExtent, RasterSeries},
    orchestrator::{run_regional_analysis, run_site_analysis, AnalysisOptions},
    parallel::WorkerBudget,
    sampler::{IdentityProjector, Site},
};
use chrono::NaiveDate;
use ndarray::Array2;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicUsize, Ordering};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn daily_dates(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(n);
    let mut current = start;
    for _ in 0..n {
        dates.push(current);
        current = current.succ_opt().unwrap();
    }
    dates
}

fn unit_extent(width: usize, height: usize) -> GridExtent {
    GridExtent {
        x0: 0.0,
        y0: height as f64,
        dx: 1.0,
        dy: 1.0,
        width,
        height,
    }
}

/// Identity transform that counts how often the fit is invoked.
#[derive(Default)]
struct CountingIdentity {
    calls: AtomicUsize,
}

impl Normalizer for CountingIdentity {
    fn normalize(&self, series: &[f64], _window: usize) -> Result<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(series.to_vec())
    }
}

/// Deterministic z-score stand-in for the log-logistic transform.
struct ZScore;

impl Normalizer for ZScore {
    fn normalize(&self, series: &[f64], _window: usize) -> Result<Vec<f64>> {
        let n = series.len() as f64;
        let mean = series.iter().sum::<f64>() / n;
        let var = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt().max(f64::MIN_POSITIVE);
        Ok(series.iter().map(|v| (v - mean) / std).collect())
    }
}

struct NonConverging;

impl Normalizer for NonConverging {
    fn normalize(&self, _series: &[f64], _window: usize) -> Result<Vec<f64>> {
        Err(AridityError::Generic("did not converge".to_string()))
    }
}

struct WrongLength;

impl Normalizer for WrongLength {
    fn normalize(&self, series: &[f64], _window: usize) -> Result<Vec<f64>> {
        Ok(series[1..].to_vec())
    }
}

fn options(start_year: i32, workers: usize) -> AnalysisOptions {
    AnalysisOptions {
        start_year,
        window: 21,
        budget: WorkerBudget::with_workers(workers),
        time_range: None,
    }
}

/// Balance series starting at a non-leap year, so no leap-day bookkeeping.
fn synthetic_balance(site: usize, years: usize, f: impl Fn(usize) -> f64) -> WaterBalanceSeries {
    let n = years * 365;
    let dates = daily_dates(d(2001, 1, 1), n);
    let balance: Vec<f64> = (0..n).map(f).collect();
    WaterBalanceSeries {
        site,
        precip: balance.clone(),
        pet: vec![0.0; n],
        dates,
        balance,
    }
}

#[test]
fn test_sine_balance_three_years_two_sites() {
    // Two sites, three years of daily balance sin(2*pi*day/365), window 21,
    // start year 2000. 2000 is a leap year, so the raw span is 1096 days.
    let n = 1096;
    let dates = daily_dates(d(2000, 1, 1), n);
    let precip_layers: Vec<Array2<f32>> = (0..n)
        .map(|t| Array2::from_elem((1, 2), (TAU * t as f64 / 365.0).sin() as f32))
        .collect();
    let pet_layers: Vec<Array2<f32>> = (0..n).map(|_| Array2::zeros((1, 2))).collect();

    let crs = Crs::new("EPSG:4326");
    let precip =
        RasterSeries::new(crs.clone(), unit_extent(2, 1), dates.clone(), precip_layers).unwrap();
    let pet = RasterSeries::new(crs.clone(), unit_extent(2, 1), dates, pet_layers).unwrap();

    let sites = vec![
        Site::with_label(0, "west", 0.5, 0.5, crs.clone()),
        Site::with_label(1, "east", 1.5, 0.5, crs),
    ];

    let normalizer = CountingIdentity::default();
    let table = run_site_analysis(
        &precip,
        &pet,
        &sites,
        &IdentityProjector,
        &normalizer,
        &options(2000, 2),
    )
    .unwrap();

    // 3 x 365 records per site after leap-day removal.
    assert_eq!(table.len(), 2 * 1095);
    assert!(table.rows.iter().all(|r| r.date != d(2000, 12, 31)));
    assert_eq!(normalizer.calls.load(Ordering::SeqCst), 2);

    // With an identity transform the index over any full year is symmetric
    // around zero: the year mean vanishes and extremes mirror each other.
    let west: Vec<f64> = table.rows[..1095]
        .iter()
        .map(|r| r.value.expect("sine site has no missing values"))
        .collect();
    let year = &west[..365];
    let mean = year.iter().sum::<f64>() / 365.0;
    assert!(mean.abs() < 1e-4, "year mean {mean} not near zero");
    let max = year.iter().cloned().fold(f64::MIN, f64::max);
    let min = year.iter().cloned().fold(f64::MAX, f64::min);
    assert!((max + min).abs() < 1e-3);
}

#[test]
fn test_all_missing_site_skips_normalizer() {
    // 1095 records (3 x 365), every value missing.
    let mut series = synthetic_balance(0, 3, |_| f64::NAN);
    series.precip = vec![f64::NAN; series.len()];
    series.pet = vec![f64::NAN; series.len()];

    let normalizer = CountingIdentity::default();
    let engine = IndexEngine::new(&normalizer, 2001, 21, WorkerBudget::serial());
    let result = engine.compute(std::slice::from_ref(&series)).unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].len(), 1095);
    assert_eq!(result[0].len(), series.len());
    assert!(result[0].values.iter().all(|v| v.is_nan()));
    assert_eq!(normalizer.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_partial_missing_site_fails_batch() {
    let mut series = synthetic_balance(4, 1, |t| t as f64);
    series.balance[10] = f64::NAN;

    let normalizer = CountingIdentity::default();
    let engine = IndexEngine::new(&normalizer, 2001, 21, WorkerBudget::serial());
    let result = engine.compute(std::slice::from_ref(&series));

    assert!(matches!(
        result,
        Err(AridityError::IncompleteSeries {
            site: 4,
            missing: 1,
            total: 365
        })
    ));
}

#[test]
fn test_fit_failure_carries_site_and_fails_batch() {
    let series = vec![
        synthetic_balance(0, 1, |t| t as f64),
        synthetic_balance(1, 1, |t| t as f64),
    ];

    let engine = IndexEngine::new(&NonConverging, 2001, 21, WorkerBudget::serial());
    match engine.compute(&series) {
        Err(AridityError::Fit { site, message }) => {
            assert!(site == 0 || site == 1);
            assert!(message.contains("did not converge"));
        }
        other => panic!("expected Fit error, got {other:?}"),
    }

    let engine = IndexEngine::new(&WrongLength, 2001, 21, WorkerBudget::serial());
    assert!(matches!(
        engine.compute(&series),
        Err(AridityError::Fit { .. })
    ));
}

#[test]
fn test_start_year_mismatch_is_rejected() {
    let series = synthetic_balance(0, 1, |t| t as f64);
    let engine = IndexEngine::new(&ZScore, 1999, 21, WorkerBudget::serial());
    assert!(engine.compute(std::slice::from_ref(&series)).is_err());
}

#[test]
fn test_worker_counts_produce_identical_ordered_results() {
    let series: Vec<WaterBalanceSeries> = (0..9)
        .map(|site| {
            synthetic_balance(site, 2, move |t| {
                (TAU * t as f64 / 365.0 + site as f64).sin() + site as f64 * 0.1
            })
        })
        .collect();

    let mut outputs = Vec::new();
    for workers in [1, 2, 8] {
        let engine = IndexEngine::new(&ZScore, 2001, 21, WorkerBudget::with_workers(workers));
        let result = engine.compute(&series).unwrap();
        let sites: Vec<usize> = result.iter().map(|s| s.site).collect();
        assert_eq!(sites, (0..9).collect::<Vec<_>>());
        outputs.push(
            result
                .into_iter()
                .map(|s| s.values)
                .collect::<Vec<Vec<f64>>>(),
        );
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[test]
fn test_index_length_matches_balance_length() {
    let series: Vec<WaterBalanceSeries> = (0..3)
        .map(|site| synthetic_balance(site, site + 1, move |t| t as f64 + site as f64))
        .collect();

    let engine = IndexEngine::new(&ZScore, 2001, 21, WorkerBudget::with_workers(2));
    let result = engine.compute(&series).unwrap();
    for (balance, index) in series.iter().zip(&result) {
        assert_eq!(index.len(), balance.len());
        assert_eq!(index.dates, balance.dates);
    }
}

#[test]
fn test_regional_analysis_keeps_water_cells_missing() {
    // Two non-leap years on a 4x4 grid; the top-left 2x2 block is water.
    let n = 730;
    let dates = daily_dates(d(2001, 1, 1), n);
    let precip_layers: Vec<Array2<f32>> = (0..n)
        .map(|_| {
            let mut layer = Array2::from_elem((4, 4), 5.0_f32);
            for r in 0..2 {
                for c in 0..2 {
                    layer[[r, c]] = f32::NAN;
                }
            }
            layer
        })
        .collect();
    let pet_layers: Vec<Array2<f32>> = (0..n).map(|_| Array2::from_elem((4, 4), 2.0)).collect();

    let crs = Crs::new("EPSG:4326");
    let precip =
        RasterSeries::new(crs.clone(), unit_extent(4, 4), dates.clone(), precip_layers).unwrap();
    let pet = RasterSeries::new(crs, unit_extent(4, 4), dates, pet_layers).unwrap();

    let normalizer = CountingIdentity::default();
    let table =
        run_regional_analysis(&precip, &pet, 2, &normalizer, &options(2001, 2)).unwrap();

    // Four coarse cells, full footprint kept.
    assert_eq!(table.len(), 4 * n);
    // The water block is coarse cell 0: all rows missing, no fit invoked
    // for it, and the three land cells carry balance 5 - 2 = 3.
    let water: Vec<_> = table.rows.iter().filter(|r| r.site == "0").collect();
    assert_eq!(water.len(), n);
    assert!(water.iter().all(|r| r.value.is_none()));
    assert_eq!(normalizer.calls.load(Ordering::SeqCst), 3);
    let land: Vec<_> = table.rows.iter().filter(|r| r.site == "3").collect();
    assert!(land.iter().all(|r| r.value == Some(3.0)));
}

#[test]
fn test_site_analysis_with_ocean_point() {
    let n = 365;
    let dates = daily_dates(d(2001, 1, 1), n);
    let crs = Crs::new("EPSG:4326");
    let precip = RasterSeries::new(
        crs.clone(),
        unit_extent(2, 2),
        dates.clone(),
        (0..n).map(|_| Array2::from_elem((2, 2), 4.0)).collect(),
    )
    .unwrap();
    let pet = RasterSeries::new(
        crs.clone(),
        unit_extent(2, 2),
        dates,
        (0..n).map(|_| Array2::from_elem((2, 2), 1.0)).collect(),
    )
    .unwrap();

    let sites = vec![
        Site::with_label(0, "oasis", 0.5, 0.5, crs.clone()),
        // Far outside the grid: extraction yields an all-missing series.
        Site::with_label(1, "offshore", 500.0, 500.0, crs),
    ];

    let normalizer = CountingIdentity::default();
    let table = run_site_analysis(
        &precip,
        &pet,
        &sites,
        &IdentityProjector,
        &normalizer,
        &options(2001, 1),
    )
    .unwrap();

    assert_eq!(table.len(), 2 * n);
    assert_eq!(normalizer.calls.load(Ordering::SeqCst), 1);
    assert!(table
        .rows
        .iter()
        .filter(|r| r.site == "oasis")
        .all(|r| r.value == Some(3.0)));
    assert!(table
        .rows
        .iter()
        .filter(|r| r.site == "offshore")
        .all(|r| r.value.is_none()));
}

#[test]
fn test_export_csv_and_json() {
    let series = synthetic_balance(0, 1, |t| t as f64);
    let engine = IndexEngine::new(&ZScore, 2001, 21, WorkerBudget::serial());
    let mut result = engine.compute(std::slice::from_ref(&series)).unwrap();
    result[0].values[1] = f64::NAN; // exercise missing-value serialization

    let sites = vec![Site::with_label(0, "gauge-a", 0.5, 0.5, Crs::new("EPSG:4326"))];
    let table = IndexTable::from_series(&result, &sites);
    assert_eq!(table.len(), 365);

    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let csv_path = dir.path().join("index.csv");
    table.write_csv(&csv_path).unwrap();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("site,date,index"));
    let first = lines.next().unwrap();
    assert!(first.starts_with("gauge-a,2001-01-01,"));
    // The missing value on day two leaves the cell empty.
    assert_eq!(lines.next(), Some("gauge-a,2001-01-02,"));

    let json_path = dir.path().join("index.json");
    table.write_json(&json_path).unwrap();
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    let rows = doc.as_array().unwrap();
    assert_eq!(rows.len(), 365);
    assert_eq!(rows[0]["site"], "gauge-a");
    assert!(rows[1]["index"].is_null());
    assert!(rows[2]["index"].is_number());
}

#[test]
fn test_builder_output_feeds_engine_unchanged() {
    // Whole chain at the record level: builder output lengths survive the
    // engine for a leap-spanning input.
    let n = 366 + 365;
    let dates = daily_dates(d(2000, 1, 1), n);
    let precip: Vec<_> = dates
        .iter()
        .map(|date| aridity::sampler::SeriesRecord {
            site: 0,
            date: *date,
            value: 2.0,
        })
        .collect();
    let pet: Vec<_> = dates
        .iter()
        .map(|date| aridity::sampler::SeriesRecord {
            site: 0,
            date: *date,
            value: 0.5,
        })
        .collect();

    let balances = WaterBalanceBuilder::build(&precip, &pet).unwrap();
    assert_eq!(balances[0].len(), 730);

    let engine = IndexEngine::new(&ZScore, 2000, 21, WorkerBudget::serial());
    let result = engine.compute(&balances).unwrap();
    assert_eq!(result[0].len(), 730);
}
