use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading data, training or persisting a forecaster.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("column '{column}' not found in {file}")]
    MissingColumn { file: PathBuf, column: String },

    #[error("invalid value '{value}' in {file} at row {row}, column '{column}'")]
    InvalidValue {
        file: PathBuf,
        row: usize,
        column: String,
        value: String,
    },

    #[error("no usable data: {0}")]
    EmptyDataset(String),

    #[error("not enough data: {0}")]
    NotEnoughData(String),

    #[error("scaler used before fit")]
    ScalerNotFitted,

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("plot error: {0}")]
    Plot(String),
}

impl From<serde_json::Error> for ForecastError {
    fn from(error: serde_json::Error) -> Self {
        ForecastError::Serialization(error.to_string())
    }
}

impl From<bincode::Error> for ForecastError {
    fn from(error: bincode::Error) -> Self {
        ForecastError::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(error: toml::de::Error) -> Self {
        ForecastError::Config(error.to_string())
    }
}

impl From<ndarray::ShapeError> for ForecastError {
    fn from(error: ndarray::ShapeError) -> Self {
        ForecastError::ShapeMismatch {
            expected: "consistent array shape".to_string(),
            actual: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
