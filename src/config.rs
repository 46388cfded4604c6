//! Run configuration.
//!
//! Every field has a default matching the reference training run, so an
//! empty TOML file (or no file at all) reproduces it. Any subset of the
//! sections may be given:
//!
//! ```toml
//! [data]
//! dir = "./dummy/outputs/csv"
//!
//! [training]
//! epochs = 50
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub data: DataConfig,
    pub window: WindowConfig,
    pub model: ModelConfig,
    pub training: TrainingSettings,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub dir: PathBuf,
    /// Feature columns, in model input order.
    pub features: Vec<String>,
    /// Column forecast by the model; must be one of `features`.
    pub target: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            dir: PathBuf::from("./dummy/outputs/csv"),
            features: ["age", "sex", "BMI", "weight", "consumed_cal"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            target: "weight".to_string(),
        }
    }
}

impl DataConfig {
    pub fn target_index(&self) -> Result<usize> {
        self.features
            .iter()
            .position(|f| f == &self.target)
            .ok_or_else(|| {
                ForecastError::Config(format!(
                    "target column '{}' is not one of the features {:?}",
                    self.target, self.features
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub timesteps: usize,
    pub forecast_steps: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            timesteps: 7,
            forecast_steps: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub hidden_size: usize,
    pub num_layers: usize,
    pub dense_size: usize,
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            hidden_size: 32,
            num_layers: 2,
            dense_size: 64,
            dropout: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub validation_split: f64,
    pub patience: usize,
    pub min_delta: f64,
    pub restore_best_weights: bool,
    pub clip_gradient: Option<f64>,
    pub seed: Option<u64>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        TrainingSettings {
            epochs: 200,
            batch_size: 128,
            learning_rate: 0.001,
            validation_split: 0.2,
            patience: 10,
            min_delta: 0.01,
            restore_best_weights: true,
            clip_gradient: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub checkpoint: PathBuf,
    pub curves_png: PathBuf,
    pub forecast_png: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            checkpoint: PathBuf::from("./models/modelv1.weights.bin"),
            curves_png: PathBuf::from("./models/model_ver.png"),
            forecast_png: PathBuf::from("./models/forecast.png"),
        }
    }
}

impl ForecastConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ForecastConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.data.target_index()?;
        if self.window.timesteps == 0 || self.window.forecast_steps == 0 {
            return Err(ForecastError::Config(
                "timesteps and forecast_steps must be positive".to_string(),
            ));
        }
        if self.model.num_layers == 0 || self.model.hidden_size == 0 {
            return Err(ForecastError::Config(
                "model needs at least one LSTM layer with hidden units".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(ForecastError::Config(format!(
                "dropout {} outside [0, 1)",
                self.model.dropout
            )));
        }
        if !(0.0..1.0).contains(&self.training.validation_split) {
            return Err(ForecastError::Config(format!(
                "validation_split {} outside [0, 1)",
                self.training.validation_split
            )));
        }
        if self.training.batch_size == 0 {
            return Err(ForecastError::Config("batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = ForecastConfig::default();
        assert_eq!(config.window.timesteps, 7);
        assert_eq!(config.window.forecast_steps, 90);
        assert_eq!(config.data.features.len(), 5);
        assert_eq!(config.data.target_index().unwrap(), 3);
        assert_eq!(config.training.batch_size, 128);
        assert_eq!(config.training.patience, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ForecastConfig::from_toml_str(
            "[training]\nepochs = 5\n\n[data]\ndir = \"/tmp/subjects\"\n",
        )
        .unwrap();
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.batch_size, 128);
        assert_eq!(config.data.dir, PathBuf::from("/tmp/subjects"));
        assert_eq!(config.data.target, "weight");
    }

    #[test]
    fn test_unknown_target_rejected() {
        let result = ForecastConfig::from_toml_str("[data]\ntarget = \"height\"\n");
        assert!(matches!(result, Err(ForecastError::Config(_))));
    }
}
