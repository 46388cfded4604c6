//! Loading per-subject biometric series from CSV files.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::Array2;

use crate::error::{ForecastError, Result};

/// One subject's daily records, restricted to the selected feature columns.
///
/// Rows keep the file order, which is the time order.
#[derive(Debug, Clone)]
pub struct SubjectSeries {
    pub name: String,
    pub features: Vec<String>,
    pub values: Array2<f64>,
}

impl SubjectSeries {
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }
}

/// Read one subject file, picking `features` by header name.
pub fn load_subject_csv<P: AsRef<Path>>(path: P, features: &[String]) -> Result<SubjectSeries> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let columns = features
        .iter()
        .map(|feature| {
            headers
                .iter()
                .position(|h| h == feature)
                .ok_or_else(|| ForecastError::MissingColumn {
                    file: path.to_path_buf(),
                    column: feature.clone(),
                })
        })
        .collect::<Result<Vec<usize>>>()?;

    let mut flat = Vec::new();
    let mut rows = 0;
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        for (&col, feature) in columns.iter().zip(features) {
            let raw = record.get(col).unwrap_or("");
            let value = raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ForecastError::InvalidValue {
                    file: path.to_path_buf(),
                    row: row + 1,
                    column: feature.clone(),
                    value: raw.to_string(),
                })?;
            flat.push(value);
        }
        rows += 1;
    }

    let values = Array2::from_shape_vec((rows, features.len()), flat)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("subject")
        .to_string();
    debug!("loaded {} rows from {}", rows, path.display());

    Ok(SubjectSeries {
        name,
        features: features.to_vec(),
        values,
    })
}

/// Load every `*.csv` file of a directory, sorted by file name.
pub fn load_subject_dir<P: AsRef<Path>>(dir: P, features: &[String]) -> Result<Vec<SubjectSeries>> {
    let dir = dir.as_ref();
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("csv"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(ForecastError::EmptyDataset(format!(
            "no CSV files in {}",
            dir.display()
        )));
    }

    let subjects = files
        .iter()
        .map(|file| load_subject_csv(file, features))
        .collect::<Result<Vec<_>>>()?;
    info!("loaded {} subject files from {}", subjects.len(), dir.display());
    Ok(subjects)
}
