use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Per-feature min-max normalization into [0, 1].
///
/// x' = (x - min) / (max - min). A constant column has its range treated as 1,
/// so every value of it maps to 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    data_min: Option<Vec<f64>>,
    data_max: Option<Vec<f64>>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.data_min.is_some()
    }

    pub fn n_features(&self) -> Option<usize> {
        self.data_min.as_ref().map(|m| m.len())
    }

    pub fn data_min(&self) -> Option<&[f64]> {
        self.data_min.as_deref()
    }

    pub fn data_max(&self) -> Option<&[f64]> {
        self.data_max.as_deref()
    }

    pub fn fit(&mut self, data: &Array2<f64>) -> Result<()> {
        if data.nrows() == 0 {
            return Err(ForecastError::EmptyDataset(
                "cannot fit scaler on zero rows".to_string(),
            ));
        }
        let min = data.fold_axis(Axis(0), f64::INFINITY, |&acc, &x| acc.min(x));
        let max = data.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &x| acc.max(x));
        self.data_min = Some(min.to_vec());
        self.data_max = Some(max.to_vec());
        Ok(())
    }

    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        let (min, range) = self.params(data.ncols())?;
        Ok((data - &min) / &range)
    }

    pub fn fit_transform(&mut self, data: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(data)?;
        self.transform(data)
    }

    pub fn inverse_transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        let (min, range) = self.params(data.ncols())?;
        Ok(data * &range + &min)
    }

    /// Map scaled values of a single feature back to original units.
    pub fn inverse_transform_column(&self, values: &[f64], column: usize) -> Result<Vec<f64>> {
        let (min, range) = match (&self.data_min, &self.data_max) {
            (Some(min), Some(max)) => {
                if column >= min.len() {
                    return Err(ForecastError::ShapeMismatch {
                        expected: format!("column < {}", min.len()),
                        actual: column.to_string(),
                    });
                }
                (min[column], column_range(min[column], max[column]))
            }
            _ => return Err(ForecastError::ScalerNotFitted),
        };
        Ok(values.iter().map(|v| v * range + min).collect())
    }

    fn params(&self, n_cols: usize) -> Result<(Array1<f64>, Array1<f64>)> {
        let (min, max) = match (&self.data_min, &self.data_max) {
            (Some(min), Some(max)) => (min, max),
            _ => return Err(ForecastError::ScalerNotFitted),
        };
        if min.len() != n_cols {
            return Err(ForecastError::ShapeMismatch {
                expected: format!("{} features", min.len()),
                actual: format!("{} features", n_cols),
            });
        }
        let range: Array1<f64> = min
            .iter()
            .zip(max.iter())
            .map(|(&lo, &hi)| column_range(lo, hi))
            .collect();
        Ok((Array1::from(min.clone()), range))
    }
}

fn column_range(min: f64, max: f64) -> f64 {
    let range = max - min;
    if range == 0.0 {
        1.0
    } else {
        range
    }
}
