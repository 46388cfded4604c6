//! # weight-forecast
//!
//! Forecasts a person's body weight 90 days ahead from 7 days of biometric
//! and caloric-intake records, using a stacked LSTM built on `ndarray`.
//!
//! ## Core Components
//!
//! - **Data**: per-subject CSV loading and min-max scaling
//! - **Windowing**: (7 × 5) input windows paired with 90-day weight targets
//! - **Model**: two LSTM layers with variational input dropout, then Dense(64) and Dense(90)
//! - **Training**: Adam + MSE, mini-batches, validation split, early stopping, checkpoints
//! - **Forecasting**: autoregressive rollout back into kilograms
//!
//! ## Quick Start
//!
//! ```rust
//! use ndarray::Array2;
//! use weight_forecast::config::ModelConfig;
//! use weight_forecast::forecast::predict_future;
//! use weight_forecast::models::forecaster::WeightForecaster;
//! use weight_forecast::scaler::MinMaxScaler;
//!
//! let mut model = WeightForecaster::new(5, 7, 90, &ModelConfig::default());
//! let mut scaler = MinMaxScaler::new();
//! scaler.fit(&Array2::from_shape_fn((10, 5), |(r, c)| (r + c) as f64)).unwrap();
//!
//! let window = Array2::from_elem((7, 5), 0.5);
//! let days = predict_future(&mut model, window.view(), 30, &scaler, 3).unwrap();
//! assert_eq!(days.len(), 30);
//! ```

pub mod config;
pub mod error;
pub mod data;
pub mod scaler;
pub mod windowing;
pub mod layers;
pub mod models;
pub mod loss;
pub mod optimizers;
pub mod training;
pub mod persistence;
pub mod forecast;
pub mod plot;
pub mod pipeline;

// Re-export commonly used items
pub use config::ForecastConfig;
pub use error::{ForecastError, Result};
pub use models::forecaster::WeightForecaster;
pub use models::lstm_network::LSTMNetwork;
pub use layers::lstm_cell::LSTMCell;
pub use scaler::MinMaxScaler;
pub use windowing::{create_multi_step_sequences, WindowSet};
pub use training::{
    create_forecast_trainer, EarlyStopper, EarlyStoppingConfig, EarlyStoppingMetric,
    ForecastTrainer, TrainingConfig, TrainingHistory,
};
pub use optimizers::{Adam, SGD};
pub use loss::{MAELoss, MSELoss};
pub use persistence::{ModelMetadata, ModelPersistence, PersistentModel};
pub use forecast::{predict_future, predict_horizon};
