//! Tabular export of index results
//!
//! The rendering layer that consumes these results lives outside this crate;
//! it receives a plain long-form table of (site, timestamp, index value or
//! missing). CSV leaves missing cells empty, JSON uses `null`.

use crate::engine::IndexSeries;
use crate::errors::Result;
use crate::sampler::Site;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::Path;

/// One output row; `None` marks a missing index value
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub site: String,
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Long-form (site, timestamp, index) result table
#[derive(Debug, Clone, Default)]
pub struct IndexTable {
    pub rows: Vec<IndexRow>,
}

impl IndexTable {
    /// Assemble a table from per-site index series.
    ///
    /// Site labels come from the matching [`Site`] when one is provided;
    /// synthetic or unmatched sites fall back to their positional index.
    pub fn from_series(series: &[IndexSeries], sites: &[Site]) -> Self {
        let mut rows = Vec::new();
        for s in series {
            let label = sites
                .iter()
                .find(|site| site.id == s.site)
                .map(|site| site.display_label())
                .unwrap_or_else(|| s.site.to_string());
            for (date, value) in s.dates.iter().zip(&s.values) {
                rows.push(IndexRow {
                    site: label.clone(),
                    date: *date,
                    value: if value.is_nan() { None } else { Some(*value) },
                });
            }
        }
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table as CSV with a `site,date,index` header.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut out = fs::File::create(path)?;
        writeln!(out, "site,date,index")?;
        for row in &self.rows {
            match row.value {
                Some(v) => writeln!(out, "{},{},{v}", row.site, row.date)?,
                None => writeln!(out, "{},{},", row.site, row.date)?,
            }
        }
        println!("✅ Wrote {} index rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    /// Write the table as a JSON array of row objects.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                json!({
                    "site": row.site,
                    "date": row.date.to_string(),
                    "index": row.value,
                })
            })
            .collect();
        let doc = Value::Array(rows);
        fs::write(path, serde_json::to_string_pretty(&doc).map_err(|e| e.to_string())?)?;
        println!("✅ Wrote {} index rows to {}", self.rows.len(), path.display());
        Ok(())
    }
}
