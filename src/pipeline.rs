//! End-to-end run: load, window, train, plot, forecast.

use std::path::PathBuf;

use log::{info, warn};

use crate::config::ForecastConfig;
use crate::data::load_subject_dir;
use crate::error::{ForecastError, Result};
use crate::forecast::{last_window, predict_future};
use crate::models::forecaster::WeightForecaster;
use crate::plot::{plot_forecast, plot_training_curves};
use crate::scaler::MinMaxScaler;
use crate::training::{
    create_forecast_trainer, CheckpointConfig, EarlyStoppingConfig, EarlyStoppingMetric,
    TrainingConfig, TrainingHistory,
};
use crate::windowing::{concatenate_windows, window_subject, SubjectWindows};

/// What a run produced
#[derive(Debug)]
pub struct PipelineReport {
    pub history: TrainingHistory,
    /// Rollout predictions in original units, one per future day
    pub predictions: Vec<f64>,
    pub checkpoint: PathBuf,
    pub curves_png: PathBuf,
    pub forecast_png: PathBuf,
}

impl PipelineReport {
    /// `Day N: W.WW kg` lines
    pub fn prediction_lines(&self) -> Vec<String> {
        self.predictions
            .iter()
            .enumerate()
            .map(|(i, w)| format!("Day {}: {:.2} kg", i + 1, w))
            .collect()
    }
}

/// Translate run settings into the trainer's configuration.
pub fn training_config(config: &ForecastConfig, checkpoint_scaler: Option<MinMaxScaler>) -> TrainingConfig {
    let settings = &config.training;
    let monitor = if settings.validation_split > 0.0 {
        EarlyStoppingMetric::ValidationLoss
    } else {
        EarlyStoppingMetric::TrainLoss
    };
    TrainingConfig {
        epochs: settings.epochs,
        batch_size: settings.batch_size,
        shuffle: true,
        print_every: 1,
        clip_gradient: settings.clip_gradient,
        early_stopping: Some(EarlyStoppingConfig {
            patience: settings.patience,
            min_delta: settings.min_delta,
            restore_best_weights: settings.restore_best_weights,
            monitor,
        }),
        checkpoint: Some(CheckpointConfig {
            path: config.output.checkpoint.clone(),
            model_name: "weight-forecaster".to_string(),
            monitor,
            scaler: checkpoint_scaler,
        }),
        seed: settings.seed,
    }
}

pub fn run(config: &ForecastConfig) -> Result<PipelineReport> {
    config.validate()?;
    let target_column = config.data.target_index()?;

    let subjects = load_subject_dir(&config.data.dir, &config.data.features)?;
    let windowed = subjects
        .iter()
        .map(|s| window_subject(s, config))
        .collect::<Result<Vec<SubjectWindows>>>()?;

    for subject in windowed.iter().filter(|s| s.windows.is_empty()) {
        warn!("{} is shorter than {} days and yields no windows",
              subject.name, config.window.timesteps + config.window.forecast_steps + 1);
    }

    let sets: Vec<_> = windowed.iter().map(|s| s.windows.clone()).collect();
    let combined = concatenate_windows(&sets)?;
    info!("X shape: ({}, {}, {})", combined.len(), combined.timesteps(), combined.n_features());
    info!("y shape: ({}, {})", combined.len(), combined.forecast_steps());

    // The forecast starts from the last window of the last subject that has one,
    // so that subject's scaler maps predictions back to kilograms.
    let forecast_subject = windowed
        .iter()
        .rev()
        .find(|s| !s.windows.is_empty())
        .ok_or_else(|| ForecastError::NotEnoughData(format!(
            "no subject has more than {} days of records",
            config.window.timesteps + config.window.forecast_steps
        )))?;

    let (train_set, validation_set) = combined.split_validation(config.training.validation_split);
    if train_set.is_empty() {
        return Err(ForecastError::NotEnoughData(
            "validation split leaves no training windows".to_string(),
        ));
    }

    let model = WeightForecaster::new(
        combined.n_features(),
        config.window.timesteps,
        config.window.forecast_steps,
        &config.model,
    );
    info!("model summary:\n{}", model.summary());

    let mut trainer = create_forecast_trainer(model, config.training.learning_rate)
        .with_config(training_config(config, Some(forecast_subject.scaler.clone())));
    let validation = (!validation_set.is_empty()).then_some(&validation_set);
    trainer.train(&train_set, validation)?;
    info!("model training finished");

    if let Err(e) = plot_training_curves(&trainer.history, &config.output.curves_png) {
        warn!("could not draw training curves: {}", e);
    }

    let history = trainer.history.clone();
    let mut model = trainer.into_model();
    let window = last_window(&forecast_subject.windows.inputs)?;
    let predictions = predict_future(
        &mut model,
        window,
        config.window.forecast_steps,
        &forecast_subject.scaler,
        target_column,
    )?;

    if let Err(e) = plot_forecast(&predictions, &config.output.forecast_png) {
        warn!("could not draw forecast: {}", e);
    }

    Ok(PipelineReport {
        history,
        predictions,
        checkpoint: config.output.checkpoint.clone(),
        curves_png: config.output.curves_png.clone(),
        forecast_png: config.output.forecast_png.clone(),
    })
}
