//! FRED-MD dataset and FRED CSV loading.
//!
//! A FRED-MD snapshot is a wide CSV: a `sasdate` column followed by one
//! column per series, with a `Transform:` row right below the header carrying
//! each series' transformation code. Dates are `M/D/YYYY`.

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use corrlab_core::domain::TimeSeries;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const DATE_COLUMN: &str = "sasdate";
const TRANSFORM_MARKER: &str = "Transform:";

/// Parse `M/D/YYYY` or ISO `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Empty cells and FRED's `.` placeholder are missing.
fn parse_value(raw: &str) -> f64 {
    match raw.trim() {
        "" | "." | "NA" | "NaN" => f64::NAN,
        s => s.parse().unwrap_or(f64::NAN),
    }
}

/// One FRED-MD snapshot, column-major.
#[derive(Debug, Clone, Default)]
pub struct FredMdDataset {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<f64>>,
    tcodes: BTreeMap<String, u8>,
}

impl FredMdDataset {
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open FRED-MD file {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr.headers()?.clone();
        let date_idx = headers
            .iter()
            .position(|h| h.trim() == DATE_COLUMN)
            .ok_or_else(|| anyhow!("missing '{DATE_COLUMN}' column"))?;
        let names: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != date_idx)
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();

        let mut dataset = Self {
            columns: names.iter().map(|(_, n)| (n.clone(), Vec::new())).collect(),
            ..Self::default()
        };

        for record in rdr.records() {
            let record = record?;
            let first = record.get(date_idx).unwrap_or("").trim();
            if first == TRANSFORM_MARKER {
                for (i, name) in &names {
                    if let Some(code) = record.get(*i).and_then(|c| c.trim().parse::<f64>().ok()) {
                        dataset.tcodes.insert(name.clone(), code as u8);
                    }
                }
                continue;
            }
            if first.is_empty() {
                continue;
            }
            let Some(date) = parse_date(first) else {
                bail!("unparseable date '{first}'");
            };
            dataset.dates.push(date);
            for (i, name) in &names {
                let value = record.get(*i).map_or(f64::NAN, parse_value);
                if let Some(col) = dataset.columns.get_mut(name) {
                    col.push(value);
                }
            }
        }
        Ok(dataset)
    }

    pub fn series_ids(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn tcode(&self, id: &str) -> Option<u8> {
        self.tcodes.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// The raw (untransformed) series for `id`, missing months as NaN.
    pub fn series(&self, id: &str) -> Result<TimeSeries> {
        let values = self
            .columns
            .get(id)
            .ok_or_else(|| anyhow!("series '{id}' not in FRED-MD dataset"))?;
        Ok(TimeSeries::from_daily(
            self.dates.iter().copied().zip(values.iter().copied()),
        )?)
    }
}

/// One row of the FRED-MD metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FredMdMeta {
    pub fred_md_id: String,
    #[serde(default)]
    pub api_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "tcode_from_float")]
    pub tcode: Option<u8>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub source_title: Option<String>,
    #[serde(default)]
    pub source_link: Option<String>,
    #[serde(default)]
    pub release_title: Option<String>,
    #[serde(default)]
    pub release_link: Option<String>,
}

// Spreadsheet exports write the code as `5.0`.
fn tcode_from_float<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .map(|f| f as u8))
}

/// Read the metadata table, keeping only rows that name a FRED-MD id.
pub fn load_fred_md_metadata(path: &Path) -> Result<Vec<FredMdMeta>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open FRED-MD metadata {}", path.display()))?;
    read_fred_md_metadata(file)
}

pub fn read_fred_md_metadata(reader: impl std::io::Read) -> Result<Vec<FredMdMeta>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut rows = Vec::new();
    for row in rdr.deserialize::<FredMdMeta>() {
        let row = row.context("Failed to parse FRED-MD metadata row")?;
        if !row.fred_md_id.trim().is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// A single-series FRED download: a date column then a value column.
pub fn load_fred_csv(path: &Path) -> Result<TimeSeries> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open FRED series {}", path.display()))?;
    read_fred_csv(file).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn read_fred_csv(reader: impl std::io::Read) -> Result<TimeSeries> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut points = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let (Some(date), Some(value)) = (record.get(0), record.get(1)) else {
            bail!("expected a date and a value column");
        };
        let date = parse_date(date).ok_or_else(|| anyhow!("unparseable date '{date}'"))?;
        points.push((date, parse_value(value)));
    }
    Ok(TimeSeries::from_daily(points)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = "\
sasdate,RPI,INDPRO,UNRATE
Transform:,5,5,2
1/1/2021,100.0,98.0,6.4
2/1/2021,101.0,,6.2
3/1/2021,102.5,99.1,6.0
";

    #[test]
    fn snapshot_skips_transform_row() {
        let ds = FredMdDataset::from_reader(SNAPSHOT.as_bytes()).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.tcode("UNRATE"), Some(2));
        assert_eq!(ds.series_ids().collect::<Vec<_>>(), vec!["INDPRO", "RPI", "UNRATE"]);

        let indpro = ds.series("INDPRO").unwrap();
        assert_eq!(indpro.len(), 3);
        assert!(indpro.values()[1].is_nan());
        assert_eq!(
            indpro.timestamps()[2].date(),
            NaiveDate::from_ymd_opt(2021, 3, 1).unwrap()
        );
        assert!(ds.series("GDP").is_err());
    }

    #[test]
    fn metadata_drops_rows_without_id() {
        let csv = "\
fred_md_id,api_id,title,tcode,frequency,source_title,source_link,release_title,release_link
RPI,RPI,Real Personal Income,5.0,Monthly,BEA,https://bea.gov,Personal Income,
,W875RX1,Real personal income ex transfer receipts,5,Monthly,,,,
UNRATE,UNRATE,Civilian Unemployment Rate,2,Monthly,BLS,,,
";
        let rows = read_fred_md_metadata(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tcode, Some(5));
        assert_eq!(rows[0].release_link, None);
        assert_eq!(rows[1].fred_md_id, "UNRATE");
    }

    #[test]
    fn fred_csv_dot_is_missing() {
        let csv = "DATE,DGS10\n2023-01-03,3.79\n2023-01-04,.\n2023-01-05,3.71\n";
        let s = read_fred_csv(csv.as_bytes()).unwrap();
        assert_eq!(s.len(), 3);
        assert!(s.values()[1].is_nan());
    }
}
