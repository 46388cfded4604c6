//! Sliding-window construction of (input sequence, multi-step target) pairs.

use log::debug;
use ndarray::{concatenate, s, Array2, Array3, ArrayView2, Axis};

use crate::config::ForecastConfig;
use crate::data::SubjectSeries;
use crate::error::{ForecastError, Result};
use crate::scaler::MinMaxScaler;

/// Windowed samples: `inputs` is (samples, timesteps, features) and
/// `targets` is (samples, forecast_steps).
#[derive(Debug, Clone)]
pub struct WindowSet {
    pub inputs: Array3<f64>,
    pub targets: Array2<f64>,
}

impl WindowSet {
    pub fn empty(timesteps: usize, n_features: usize, forecast_steps: usize) -> Self {
        WindowSet {
            inputs: Array3::zeros((0, timesteps, n_features)),
            targets: Array2::zeros((0, forecast_steps)),
        }
    }

    pub fn len(&self) -> usize {
        self.inputs.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn timesteps(&self) -> usize {
        self.inputs.len_of(Axis(1))
    }

    pub fn n_features(&self) -> usize {
        self.inputs.len_of(Axis(2))
    }

    pub fn forecast_steps(&self) -> usize {
        self.targets.ncols()
    }

    /// Input window `index` as a (timesteps, features) view.
    pub fn input(&self, index: usize) -> ArrayView2<'_, f64> {
        self.inputs.index_axis(Axis(0), index)
    }

    /// Gather the samples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> WindowSet {
        WindowSet {
            inputs: self.inputs.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
        }
    }

    /// Split off the trailing `fraction` of samples as validation data.
    ///
    /// Samples are not shuffled first, so validation comes from the end of
    /// the concatenated data (the last subjects). The first
    /// `floor(n * (1 - fraction))` samples train.
    pub fn split_validation(&self, fraction: f64) -> (WindowSet, WindowSet) {
        let n = self.len();
        let n_train = (((n as f64) * (1.0 - fraction)).floor() as usize).min(n);
        let train = WindowSet {
            inputs: self.inputs.slice(s![..n_train, .., ..]).to_owned(),
            targets: self.targets.slice(s![..n_train, ..]).to_owned(),
        };
        let validation = WindowSet {
            inputs: self.inputs.slice(s![n_train.., .., ..]).to_owned(),
            targets: self.targets.slice(s![n_train.., ..]).to_owned(),
        };
        (train, validation)
    }
}

/// Build overlapping windows from an already-scaled series.
///
/// Window `i` takes rows `i..i+timesteps` as input and column `target_column`
/// of rows `i+timesteps..i+timesteps+forecast_steps` as target, for
/// `i in 0..len - timesteps - forecast_steps`.
pub fn create_multi_step_sequences(
    scaled: &Array2<f64>,
    timesteps: usize,
    forecast_steps: usize,
    target_column: usize,
) -> Result<WindowSet> {
    let n_features = scaled.ncols();
    if target_column >= n_features {
        return Err(ForecastError::ShapeMismatch {
            expected: format!("target column < {}", n_features),
            actual: target_column.to_string(),
        });
    }

    let count = scaled.nrows().saturating_sub(timesteps + forecast_steps);
    let mut inputs = Array3::zeros((count, timesteps, n_features));
    let mut targets = Array2::zeros((count, forecast_steps));

    for i in 0..count {
        inputs
            .index_axis_mut(Axis(0), i)
            .assign(&scaled.slice(s![i..i + timesteps, ..]));
        targets
            .row_mut(i)
            .assign(&scaled.slice(s![i + timesteps..i + timesteps + forecast_steps, target_column]));
    }

    Ok(WindowSet { inputs, targets })
}

/// A subject's windows together with the scaler fitted on that subject.
#[derive(Debug, Clone)]
pub struct SubjectWindows {
    pub name: String,
    pub scaler: MinMaxScaler,
    pub windows: WindowSet,
}

/// Fit a fresh scaler on the subject, scale it and cut it into windows.
pub fn window_subject(series: &SubjectSeries, config: &ForecastConfig) -> Result<SubjectWindows> {
    let target_column = config.data.target_index()?;
    let timesteps = config.window.timesteps;
    let forecast_steps = config.window.forecast_steps;

    let mut scaler = MinMaxScaler::new();
    let windows = if series.is_empty() {
        WindowSet::empty(timesteps, series.features.len(), forecast_steps)
    } else {
        let scaled = scaler.fit_transform(&series.values)?;
        create_multi_step_sequences(&scaled, timesteps, forecast_steps, target_column)?
    };

    debug!("{}: {} rows -> {} windows", series.name, series.len(), windows.len());
    Ok(SubjectWindows {
        name: series.name.clone(),
        scaler,
        windows,
    })
}

/// Stack window sets along the sample axis.
pub fn concatenate_windows(sets: &[WindowSet]) -> Result<WindowSet> {
    let first = sets
        .first()
        .ok_or_else(|| ForecastError::EmptyDataset("no window sets to concatenate".to_string()))?;
    let shape = (first.timesteps(), first.n_features(), first.forecast_steps());
    if let Some(other) = sets
        .iter()
        .find(|w| (w.timesteps(), w.n_features(), w.forecast_steps()) != shape)
    {
        return Err(ForecastError::ShapeMismatch {
            expected: format!("{:?}", shape),
            actual: format!(
                "{:?}",
                (other.timesteps(), other.n_features(), other.forecast_steps())
            ),
        });
    }

    let inputs: Vec<_> = sets.iter().map(|w| w.inputs.view()).collect();
    let targets: Vec<_> = sets.iter().map(|w| w.targets.view()).collect();
    Ok(WindowSet {
        inputs: concatenate(Axis(0), &inputs)?,
        targets: concatenate(Axis(0), &targets)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ramp(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f64)
    }

    #[test]
    fn test_window_count() {
        for len in [0, 50, 97, 98, 120, 300] {
            let windows = create_multi_step_sequences(&ramp(len, 5), 7, 90, 3).unwrap();
            let expected = len.saturating_sub(97);
            assert_eq!(windows.len(), expected, "series length {}", len);
        }
    }

    #[test]
    fn test_window_shapes_and_alignment() {
        let data = ramp(120, 5);
        let windows = create_multi_step_sequences(&data, 7, 90, 3).unwrap();

        assert_eq!(windows.inputs.shape(), &[23, 7, 5]);
        assert_eq!(windows.targets.shape(), &[23, 90]);
        for i in 0..windows.len() {
            assert_eq!(windows.input(i).shape(), &[7, 5]);
            assert_eq!(windows.targets.row(i).len(), 90);
        }

        // window 4 starts at row 4, its first target is row 11, column 3
        assert_eq!(windows.inputs[[4, 0, 0]], data[[4, 0]]);
        assert_eq!(windows.inputs[[4, 6, 4]], data[[10, 4]]);
        assert_eq!(windows.targets[[4, 0]], data[[11, 3]]);
        assert_eq!(windows.targets[[4, 89]], data[[100, 3]]);
    }

    #[test]
    fn test_subject_windows_are_scaled() {
        let series = SubjectSeries {
            name: "s".to_string(),
            features: ForecastConfig::default().data.features,
            values: ramp(110, 5),
        };
        let subject = window_subject(&series, &ForecastConfig::default()).unwrap();

        assert_eq!(subject.windows.len(), 13);
        assert!(subject.scaler.is_fitted());
        assert!(subject.windows.inputs.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(subject.windows.targets.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_concatenate_and_split() {
        let a = create_multi_step_sequences(&ramp(100, 5), 7, 90, 3).unwrap();
        let b = create_multi_step_sequences(&ramp(104, 5), 7, 90, 3).unwrap();
        let all = concatenate_windows(&[a, b]).unwrap();
        assert_eq!(all.len(), 10);

        let (train, val) = all.split_validation(0.2);
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        assert_eq!(val.inputs, all.inputs.slice(s![8.., .., ..]).to_owned());
    }

    #[test]
    fn test_split_rounds_training_share_down() {
        let seven = create_multi_step_sequences(&ramp(104, 5), 7, 90, 3).unwrap();
        let (train, val) = seven.split_validation(0.2);
        assert_eq!((train.len(), val.len()), (5, 2));
        assert_eq!(train.targets.row(4), seven.targets.row(4));
        assert_eq!(val.targets.row(0), seven.targets.row(5));

        let three = create_multi_step_sequences(&ramp(100, 5), 7, 90, 3).unwrap();
        let (train, val) = three.split_validation(0.2);
        assert_eq!((train.len(), val.len()), (2, 1));

        let (train, val) = three.split_validation(0.0);
        assert_eq!((train.len(), val.len()), (3, 0));
    }

    #[test]
    fn test_concatenate_rejects_mismatched_shapes() {
        let a = create_multi_step_sequences(&ramp(100, 5), 7, 90, 3).unwrap();
        let b = create_multi_step_sequences(&ramp(100, 5), 5, 90, 3).unwrap();
        assert!(concatenate_windows(&[a, b]).is_err());
        assert!(concatenate_windows(&[]).is_err());
    }
}
