use std::path::PathBuf;
use std::time::Instant;

use log::{debug, info};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{ForecastError, Result};
use crate::loss::{LossFunction, MAELoss, MSELoss};
use crate::models::forecaster::WeightForecaster;
use crate::optimizers::{Adam, Optimizer};
use crate::persistence::{ModelMetadata, PersistentModel};
use crate::scaler::MinMaxScaler;
use crate::windowing::WindowSet;

/// Metric watched by early stopping and checkpointing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyStoppingMetric {
    ValidationLoss,
    TrainLoss,
}

#[derive(Debug, Clone)]
pub struct EarlyStoppingConfig {
    /// Epochs without improvement before stopping
    pub patience: usize,
    /// An epoch improves only when `loss < best - min_delta`
    pub min_delta: f64,
    pub restore_best_weights: bool,
    pub monitor: EarlyStoppingMetric,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        EarlyStoppingConfig {
            patience: 10,
            min_delta: 0.01,
            restore_best_weights: true,
            monitor: EarlyStoppingMetric::ValidationLoss,
        }
    }
}

/// Saves the model whenever the monitored loss beats every earlier epoch.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub path: PathBuf,
    pub model_name: String,
    pub monitor: EarlyStoppingMetric,
    /// Stored alongside the weights so a loaded checkpoint can un-scale its output
    pub scaler: Option<MinMaxScaler>,
}

/// Configuration for training hyperparameters
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub shuffle: bool,
    pub print_every: usize,
    pub clip_gradient: Option<f64>,
    pub early_stopping: Option<EarlyStoppingConfig>,
    pub checkpoint: Option<CheckpointConfig>,
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 200,
            batch_size: 128,
            shuffle: true,
            print_every: 1,
            clip_gradient: None,
            early_stopping: Some(EarlyStoppingConfig::default()),
            checkpoint: None,
            seed: None,
        }
    }
}

/// Loss and metrics over one pass of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EvalMetrics {
    pub loss: f64,
    pub mae: f64,
    pub mse: f64,
}

/// Training metrics tracked during training
#[derive(Debug, Clone)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train: EvalMetrics,
    pub validation: Option<EvalMetrics>,
    pub time_elapsed: f64,
}

impl EpochMetrics {
    pub fn monitored(&self, metric: EarlyStoppingMetric) -> f64 {
        match (metric, self.validation) {
            (EarlyStoppingMetric::ValidationLoss, Some(v)) => v.loss,
            _ => self.train.loss,
        }
    }
}

/// Per-epoch record of a training run
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    pub stopped_epoch: Option<usize>,
    pub best_epoch: Option<usize>,
}

impl TrainingHistory {
    pub fn loss(&self) -> Vec<f64> {
        self.epochs.iter().map(|m| m.train.loss).collect()
    }

    pub fn val_loss(&self) -> Vec<f64> {
        self.epochs.iter().filter_map(|m| m.validation.map(|v| v.loss)).collect()
    }

    pub fn mse(&self) -> Vec<f64> {
        self.epochs.iter().map(|m| m.train.mse).collect()
    }

    pub fn val_mse(&self) -> Vec<f64> {
        self.epochs.iter().filter_map(|m| m.validation.map(|v| v.mse)).collect()
    }

    pub fn mae(&self) -> Vec<f64> {
        self.epochs.iter().map(|m| m.train.mae).collect()
    }

    pub fn val_mae(&self) -> Vec<f64> {
        self.epochs.iter().filter_map(|m| m.validation.map(|v| v.mae)).collect()
    }

    pub fn latest(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

/// Tracks the monitored loss and decides when to stop.
pub struct EarlyStopper {
    config: EarlyStoppingConfig,
    best_score: f64,
    best_epoch: Option<usize>,
    wait: usize,
    stopped_epoch: Option<usize>,
    best_weights: Option<WeightForecaster>,
}

impl EarlyStopper {
    pub fn new(config: EarlyStoppingConfig) -> Self {
        EarlyStopper {
            config,
            best_score: f64::INFINITY,
            best_epoch: None,
            wait: 0,
            stopped_epoch: None,
            best_weights: None,
        }
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    pub fn monitor(&self) -> EarlyStoppingMetric {
        self.config.monitor
    }

    /// Record an epoch's score; returns true when training should stop.
    pub fn update(&mut self, epoch: usize, score: f64, model: &WeightForecaster) -> bool {
        if score < self.best_score - self.config.min_delta {
            self.best_score = score;
            self.best_epoch = Some(epoch);
            self.wait = 0;
            if self.config.restore_best_weights {
                self.best_weights = Some(model.clone());
            }
            return false;
        }

        self.wait += 1;
        if self.wait >= self.config.patience {
            self.stopped_epoch = Some(epoch);
            return true;
        }
        false
    }

    /// Best weights seen, when configured to keep them.
    pub fn take_best_weights(&mut self) -> Option<WeightForecaster> {
        if self.config.restore_best_weights {
            self.best_weights.take()
        } else {
            None
        }
    }
}

/// Trainer for [`WeightForecaster`] with configurable loss and optimizer
pub struct ForecastTrainer<L: LossFunction, O: Optimizer> {
    pub model: WeightForecaster,
    pub loss_function: L,
    pub optimizer: O,
    pub config: TrainingConfig,
    pub history: TrainingHistory,
}

impl<L: LossFunction, O: Optimizer> ForecastTrainer<L, O> {
    pub fn new(model: WeightForecaster, loss_function: L, optimizer: O) -> Self {
        ForecastTrainer {
            model,
            loss_function,
            optimizer,
            config: TrainingConfig::default(),
            history: TrainingHistory::default(),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// One optimizer step on a batch. Returns the batch metrics measured
    /// before the update.
    pub fn train_batch(&mut self, batch: &WindowSet) -> EvalMetrics {
        let (predictions, cache) = self.model.forward_with_cache(batch.inputs.view());
        let targets = batch.targets.t().to_owned();

        let metrics = self.metrics(&predictions, &targets);
        let d_output = self.loss_function.compute_gradient(&predictions, &targets);
        let mut gradients = self.model.backward(&d_output, &cache);

        if let Some(max_norm) = self.config.clip_gradient {
            for matrix in gradients.matrices_mut() {
                clip_gradient_matrix(matrix, max_norm);
            }
        }

        self.model.update_parameters(&gradients, &mut self.optimizer);
        metrics
    }

    /// Train for up to `config.epochs` epochs.
    ///
    /// Validation loss drives early stopping and checkpointing when
    /// validation data is given, training loss otherwise.
    pub fn train(&mut self, train_data: &WindowSet, validation_data: Option<&WindowSet>) -> Result<&TrainingHistory> {
        if train_data.is_empty() {
            return Err(ForecastError::NotEnoughData(
                "training set has no windows".to_string(),
            ));
        }
        let validation_data = validation_data.filter(|v| !v.is_empty());

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut stopper = self.config.early_stopping.clone().map(EarlyStopper::new);
        let mut best_checkpoint = f64::INFINITY;
        let mut indices: Vec<usize> = (0..train_data.len()).collect();
        let batch_size = self.config.batch_size.max(1);
        let print_every = self.config.print_every.max(1);

        info!("training on {} windows ({} validation), up to {} epochs",
              train_data.len(), validation_data.map_or(0, |v| v.len()), self.config.epochs);

        for epoch in 0..self.config.epochs {
            let start_time = Instant::now();
            if self.config.shuffle {
                indices.shuffle(&mut rng);
            }

            self.model.train();
            let mut totals = EvalMetrics::default();
            for chunk in indices.chunks(batch_size) {
                let batch = train_data.select(chunk);
                let m = self.train_batch(&batch);
                let weight = chunk.len() as f64;
                totals.loss += m.loss * weight;
                totals.mae += m.mae * weight;
                totals.mse += m.mse * weight;
            }
            let n = train_data.len() as f64;
            let train = EvalMetrics {
                loss: totals.loss / n,
                mae: totals.mae / n,
                mse: totals.mse / n,
            };

            let validation = validation_data.map(|v| self.evaluate(v));
            let metrics = EpochMetrics {
                epoch,
                train,
                validation,
                time_elapsed: start_time.elapsed().as_secs_f64(),
            };
            self.log_epoch(&metrics, epoch % print_every == 0);

            if let Some(checkpoint) = self.config.checkpoint.clone() {
                let score = metrics.monitored(checkpoint.monitor);
                if score < best_checkpoint {
                    info!("epoch {}: monitored loss improved from {:.5} to {:.5}, saving model to {}",
                          epoch + 1, best_checkpoint, score, checkpoint.path.display());
                    best_checkpoint = score;
                    let metadata = ModelMetadata::for_model(&self.model, &checkpoint.model_name, epoch, Some(score));
                    self.model.save(&checkpoint.path, metadata, checkpoint.scaler.clone())?;
                } else {
                    debug!("epoch {}: monitored loss did not improve from {:.5}", epoch + 1, best_checkpoint);
                }
            }

            self.history.epochs.push(metrics.clone());

            if let Some(ref mut stopper) = stopper {
                let score = metrics.monitored(stopper.monitor());
                if stopper.update(epoch, score, &self.model) {
                    info!("early stopping at epoch {} (best epoch {})",
                          epoch + 1, stopper.best_epoch().map_or(0, |e| e + 1));
                    break;
                }
            }
        }

        if let Some(mut stopper) = stopper {
            self.history.stopped_epoch = stopper.stopped_epoch();
            self.history.best_epoch = stopper.best_epoch();
            if let Some(best) = stopper.take_best_weights() {
                info!("restoring model weights from epoch {}", stopper.best_epoch().map_or(0, |e| e + 1));
                self.model = best;
            }
        }

        self.model.eval();
        info!("training completed after {} epochs", self.history.epochs.len());
        Ok(&self.history)
    }

    /// Loss and metrics on a dataset in eval mode.
    pub fn evaluate(&mut self, data: &WindowSet) -> EvalMetrics {
        let was_training = self.model.lstm.is_training;
        self.model.eval();

        let mut totals = EvalMetrics::default();
        let indices: Vec<usize> = (0..data.len()).collect();
        for chunk in indices.chunks(self.config.batch_size.max(1)) {
            let batch = data.select(chunk);
            let predictions = self.model.predict_batch(batch.inputs.view());
            let m = self.metrics(&predictions, &batch.targets);
            let weight = chunk.len() as f64;
            totals.loss += m.loss * weight;
            totals.mae += m.mae * weight;
            totals.mse += m.mse * weight;
        }

        if was_training {
            self.model.train();
        }

        let n = data.len().max(1) as f64;
        EvalMetrics {
            loss: totals.loss / n,
            mae: totals.mae / n,
            mse: totals.mse / n,
        }
    }

    pub fn get_latest_metrics(&self) -> Option<&EpochMetrics> {
        self.history.latest()
    }

    pub fn into_model(self) -> WeightForecaster {
        self.model
    }

    fn metrics(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> EvalMetrics {
        EvalMetrics {
            loss: self.loss_function.compute_loss(predictions, targets),
            mae: MAELoss.compute_loss(predictions, targets),
            mse: MSELoss.compute_loss(predictions, targets),
        }
    }

    fn log_epoch(&self, metrics: &EpochMetrics, verbose: bool) {
        let line = match metrics.validation {
            Some(v) => format!(
                "Epoch {}/{} - {:.2}s - loss: {:.4} - mae: {:.4} - mse: {:.4} - val_loss: {:.4} - val_mae: {:.4} - val_mse: {:.4}",
                metrics.epoch + 1, self.config.epochs, metrics.time_elapsed,
                metrics.train.loss, metrics.train.mae, metrics.train.mse, v.loss, v.mae, v.mse
            ),
            None => format!(
                "Epoch {}/{} - {:.2}s - loss: {:.4} - mae: {:.4} - mse: {:.4}",
                metrics.epoch + 1, self.config.epochs, metrics.time_elapsed,
                metrics.train.loss, metrics.train.mae, metrics.train.mse
            ),
        };
        if verbose {
            info!("{}", line);
        } else {
            debug!("{}", line);
        }
    }
}

/// Scale a gradient matrix down to `max_norm` when its norm exceeds it
fn clip_gradient_matrix(matrix: &mut Array2<f64>, max_norm: f64) {
    let norm = matrix.mapv(|x| x * x).sum().sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        matrix.mapv_inplace(|x| x * scale);
    }
}

/// Trainer with Adam and MSE loss
pub fn create_forecast_trainer(model: WeightForecaster, learning_rate: f64) -> ForecastTrainer<MSELoss, Adam> {
    ForecastTrainer::new(model, MSELoss, Adam::new(learning_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use ndarray::{arr2, Array3};

    fn tiny_model() -> WeightForecaster {
        let config = ModelConfig {
            hidden_size: 4,
            num_layers: 2,
            dense_size: 6,
            dropout: 0.0,
        };
        WeightForecaster::new(3, 4, 5, &config)
    }

    fn tiny_data(n: usize) -> WindowSet {
        WindowSet {
            inputs: Array3::from_shape_fn((n, 4, 3), |(i, t, f)| ((i + t + f) as f64 * 0.1).sin().abs()),
            targets: Array2::from_shape_fn((n, 5), |(i, k)| ((i + k) as f64 * 0.05).cos().abs()),
        }
    }

    #[test]
    fn test_trainer_creation() {
        let trainer = create_forecast_trainer(tiny_model(), 0.01);
        assert_eq!(trainer.model.n_features(), 3);
        assert_eq!(trainer.model.forecast_steps(), 5);
        assert!(trainer.history.epochs.is_empty());
    }

    #[test]
    fn test_batch_training_reduces_loss() {
        let mut trainer = create_forecast_trainer(tiny_model(), 0.01);
        let data = tiny_data(8);

        let before = trainer.evaluate(&data).loss;
        for _ in 0..60 {
            trainer.train_batch(&data);
        }
        let after = trainer.evaluate(&data).loss;
        assert!(after < before, "loss {} -> {}", before, after);
    }

    #[test]
    fn test_mse_metric_equals_loss_for_mse_trainer() {
        let mut trainer = create_forecast_trainer(tiny_model(), 0.01);
        let metrics = trainer.evaluate(&tiny_data(5));
        assert!((metrics.loss - metrics.mse).abs() < 1e-12);
        assert!(metrics.mae >= 0.0);
    }

    #[test]
    fn test_empty_training_set_rejected() {
        let mut trainer = create_forecast_trainer(tiny_model(), 0.01);
        let empty = WindowSet::empty(4, 3, 5);
        assert!(matches!(trainer.train(&empty, None), Err(ForecastError::NotEnoughData(_))));
    }

    #[test]
    fn test_early_stopper_patience() {
        let model = tiny_model();
        let mut stopper = EarlyStopper::new(EarlyStoppingConfig {
            patience: 3,
            min_delta: 0.01,
            restore_best_weights: true,
            monitor: EarlyStoppingMetric::ValidationLoss,
        });

        assert!(!stopper.update(0, 1.0, &model));
        assert!(!stopper.update(1, 0.5, &model));
        // improvements smaller than min_delta do not reset patience
        assert!(!stopper.update(2, 0.495, &model));
        assert!(!stopper.update(3, 0.6, &model));
        assert!(stopper.update(4, 0.499, &model));

        assert_eq!(stopper.best_epoch(), Some(1));
        assert_eq!(stopper.best_score(), 0.5);
        assert_eq!(stopper.stopped_epoch(), Some(4));
        assert!(stopper.take_best_weights().is_some());
    }

    #[test]
    fn test_gradient_clipping() {
        let mut matrix = arr2(&[[3.0, 4.0]]);
        clip_gradient_matrix(&mut matrix, 1.0);
        assert!((matrix[[0, 0]] - 0.6).abs() < 1e-12);
        assert!((matrix[[0, 1]] - 0.8).abs() < 1e-12);
    }
}
