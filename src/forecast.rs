//! Turning a trained forecaster into weight predictions in original units.

use log::debug;
use ndarray::{s, Array2, ArrayView2, Axis};

use crate::error::{ForecastError, Result};
use crate::models::forecaster::WeightForecaster;
use crate::scaler::MinMaxScaler;

fn check_window(model: &WeightForecaster, window: &ArrayView2<'_, f64>, target_column: usize) -> Result<()> {
    let expected = (model.timesteps, model.n_features());
    if window.dim() != expected {
        return Err(ForecastError::ShapeMismatch {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", window.dim()),
        });
    }
    if target_column >= model.n_features() {
        return Err(ForecastError::ShapeMismatch {
            expected: format!("target column < {}", model.n_features()),
            actual: target_column.to_string(),
        });
    }
    Ok(())
}

/// Autoregressive rollout over `steps` days.
///
/// Each step predicts the horizon for the current window and keeps its
/// first value as the next day's scaled weight. The window then drops its
/// oldest row and appends a copy of its newest row with the target column
/// replaced by that prediction. Returns exactly `steps` values, un-scaled
/// with the target column of `scaler`.
pub fn predict_future(
    model: &mut WeightForecaster,
    last_sequence: ArrayView2<'_, f64>,
    steps: usize,
    scaler: &MinMaxScaler,
    target_column: usize,
) -> Result<Vec<f64>> {
    check_window(model, &last_sequence, target_column)?;
    model.eval();

    let timesteps = model.timesteps;
    let mut current: Array2<f64> = last_sequence.to_owned();
    let mut scaled_predictions = Vec::with_capacity(steps);

    for step in 0..steps {
        let horizon = model.predict_window(current.view());
        let next = horizon.first().copied().ok_or_else(|| {
            ForecastError::ShapeMismatch {
                expected: "non-empty forecast horizon".to_string(),
                actual: "0 outputs".to_string(),
            }
        })?;
        scaled_predictions.push(next);

        let mut new_row = current.row(timesteps - 1).to_owned();
        new_row[target_column] = next;

        let mut rolled = Array2::zeros(current.raw_dim());
        rolled.slice_mut(s![..timesteps - 1, ..]).assign(&current.slice(s![1.., ..]));
        rolled.row_mut(timesteps - 1).assign(&new_row);
        current = rolled;

        debug!("rollout step {}: scaled weight {:.4}", step + 1, next);
    }

    scaler.inverse_transform_column(&scaled_predictions, target_column)
}

/// Direct multi-step forecast: the model's full horizon for one window,
/// un-scaled.
pub fn predict_horizon(
    model: &mut WeightForecaster,
    last_sequence: ArrayView2<'_, f64>,
    scaler: &MinMaxScaler,
    target_column: usize,
) -> Result<Vec<f64>> {
    check_window(model, &last_sequence, target_column)?;
    model.eval();
    let horizon = model.predict_window(last_sequence);
    scaler.inverse_transform_column(&horizon, target_column)
}

/// The most recent window of a (samples, timesteps, features) array.
pub fn last_window(inputs: &ndarray::Array3<f64>) -> Result<ArrayView2<'_, f64>> {
    let n = inputs.len_of(Axis(0));
    if n == 0 {
        return Err(ForecastError::NotEnoughData(
            "no window to forecast from".to_string(),
        ));
    }
    Ok(inputs.index_axis(Axis(0), n - 1))
}
