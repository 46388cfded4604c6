use serde::{Serialize, Deserialize};
use ndarray::{Array2, Dimension};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{ForecastError, Result};
use crate::layers::linear::LinearLayer;
use crate::layers::lstm_cell::LSTMCell;
use crate::models::forecaster::WeightForecaster;
use crate::models::lstm_network::LSTMNetwork;
use crate::scaler::MinMaxScaler;

/// Serializable version of Array2<f64> for persistence
#[derive(Serialize, Deserialize)]
struct SerializableArray2 {
    data: Vec<f64>,
    shape: (usize, usize),
}

impl From<&Array2<f64>> for SerializableArray2 {
    fn from(array: &Array2<f64>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.raw_dim().into_pattern(),
        }
    }
}

impl SerializableArray2 {
    fn into_array(self) -> Result<Array2<f64>> {
        Ok(Array2::from_shape_vec(self.shape, self.data)?)
    }
}

#[derive(Serialize, Deserialize)]
struct SerializableLSTMCell {
    w_ih: SerializableArray2,
    w_hh: SerializableArray2,
    bias: SerializableArray2,
    input_size: usize,
    hidden_size: usize,
}

impl From<&LSTMCell> for SerializableLSTMCell {
    fn from(cell: &LSTMCell) -> Self {
        Self {
            w_ih: (&cell.w_ih).into(),
            w_hh: (&cell.w_hh).into(),
            bias: (&cell.bias).into(),
            input_size: cell.input_size,
            hidden_size: cell.hidden_size,
        }
    }
}

impl SerializableLSTMCell {
    fn into_cell(self, dropout: f64) -> Result<LSTMCell> {
        let cell = LSTMCell {
            w_ih: self.w_ih.into_array()?,
            w_hh: self.w_hh.into_array()?,
            bias: self.bias.into_array()?,
            input_size: self.input_size,
            hidden_size: self.hidden_size,
            input_dropout: None,
            is_training: false,
        };
        let h4 = 4 * cell.hidden_size;
        if cell.w_ih.dim() != (h4, cell.input_size)
            || cell.w_hh.dim() != (h4, cell.hidden_size)
            || cell.bias.dim() != (h4, 1)
        {
            return Err(ForecastError::ShapeMismatch {
                expected: format!("LSTM cell {} -> {}", cell.input_size, cell.hidden_size),
                actual: format!("{:?} / {:?} / {:?}", cell.w_ih.dim(), cell.w_hh.dim(), cell.bias.dim()),
            });
        }
        let mut cell = cell.with_input_dropout(dropout);
        cell.eval();
        Ok(cell)
    }
}

#[derive(Serialize, Deserialize)]
struct SerializableLinear {
    weight: SerializableArray2,
    bias: SerializableArray2,
}

impl From<&LinearLayer> for SerializableLinear {
    fn from(layer: &LinearLayer) -> Self {
        Self {
            weight: (&layer.weight).into(),
            bias: (&layer.bias).into(),
        }
    }
}

impl SerializableLinear {
    fn into_layer(self) -> Result<LinearLayer> {
        let weight: Array2<f64> = self.weight.into_array()?;
        let bias: Array2<f64> = self.bias.into_array()?;
        if bias.dim() != (weight.nrows(), 1) {
            return Err(ForecastError::ShapeMismatch {
                expected: format!("({}, 1)", weight.nrows()),
                actual: format!("{:?}", bias.dim()),
            });
        }
        Ok(LinearLayer::from_weights(weight, bias))
    }
}

/// Serializable forecaster weights
#[derive(Serialize, Deserialize)]
pub struct SerializableForecaster {
    lstm_cells: Vec<SerializableLSTMCell>,
    hidden: SerializableLinear,
    output: SerializableLinear,
    input_size: usize,
    hidden_size: usize,
    timesteps: usize,
    dropout: f64,
}

impl From<&WeightForecaster> for SerializableForecaster {
    fn from(model: &WeightForecaster) -> Self {
        let cells = model.lstm.get_cells();
        Self {
            lstm_cells: cells.iter().map(|cell| cell.into()).collect(),
            hidden: (&model.hidden).into(),
            output: (&model.output).into(),
            input_size: model.lstm.input_size,
            hidden_size: model.lstm.hidden_size,
            timesteps: model.timesteps,
            dropout: cells
                .first()
                .and_then(|c| c.input_dropout.as_ref())
                .map_or(0.0, |d| d.dropout_rate),
        }
    }
}

impl SerializableForecaster {
    /// Rebuild the model in eval mode.
    pub fn into_model(self) -> Result<WeightForecaster> {
        let dropout = self.dropout;
        let cells = self
            .lstm_cells
            .into_iter()
            .map(|cell| cell.into_cell(dropout))
            .collect::<Result<Vec<_>>>()?;
        if cells.is_empty() {
            return Err(ForecastError::ShapeMismatch {
                expected: "at least one LSTM layer".to_string(),
                actual: "0 layers".to_string(),
            });
        }
        // layer 0 reads the features, every later layer reads the hidden state below it
        for (i, cell) in cells.iter().enumerate() {
            let input_size = if i == 0 { self.input_size } else { self.hidden_size };
            if cell.input_size != input_size || cell.hidden_size != self.hidden_size {
                return Err(ForecastError::ShapeMismatch {
                    expected: format!("lstm_{} {} -> {}", i, input_size, self.hidden_size),
                    actual: format!("{} -> {}", cell.input_size, cell.hidden_size),
                });
            }
        }
        let lstm = LSTMNetwork::from_cells(cells, self.input_size, self.hidden_size);
        let hidden = self.hidden.into_layer()?;
        let output = self.output.into_layer()?;
        if hidden.input_size != self.hidden_size || output.input_size != hidden.output_size {
            return Err(ForecastError::ShapeMismatch {
                expected: format!("dense input {} -> {}", self.hidden_size, hidden.output_size),
                actual: format!("{} -> {}", hidden.input_size, output.input_size),
            });
        }
        Ok(WeightForecaster::from_parts(lstm, hidden, output, self.timesteps))
    }
}

/// Model metadata for tracking training information
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: String,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub forecast_steps: usize,
    pub epoch: usize,
    pub monitored_loss: Option<f64>,
    pub description: Option<String>,
}

impl ModelMetadata {
    pub fn for_model(model: &WeightForecaster, model_name: &str, epoch: usize, monitored_loss: Option<f64>) -> Self {
        ModelMetadata {
            model_name: model_name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            input_size: model.lstm.input_size,
            hidden_size: model.lstm.hidden_size,
            num_layers: model.lstm.num_layers,
            forecast_steps: model.forecast_steps(),
            epoch,
            monitored_loss,
            description: None,
        }
    }
}

/// Complete checkpoint: weights, metadata and the scaler needed to read
/// predictions in original units
#[derive(Serialize, Deserialize)]
pub struct SavedModel {
    pub model: SerializableForecaster,
    pub metadata: ModelMetadata,
    pub scaler: Option<MinMaxScaler>,
}

/// Model persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    /// Save model to JSON format (human-readable)
    pub fn save_to_json<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, model)?;
        writer.flush()?;
        Ok(())
    }

    /// Load model from JSON format
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<SavedModel> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Save model to binary format (compact and fast)
    pub fn save_to_binary<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, model)?;
        writer.flush()?;
        Ok(())
    }

    /// Load model from binary format
    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<SavedModel> {
        let reader = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(reader)?)
    }

    /// Save by extension: `.json` is JSON, anything else bincode. Parent
    /// directories are created.
    pub fn save<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Self::save_to_json(model, path),
            _ => Self::save_to_binary(model, path),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<SavedModel> {
        let path = path.as_ref();
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Self::load_from_json(path),
            _ => Self::load_from_binary(path),
        }
    }
}

/// Convenience trait for easy model saving/loading
pub trait PersistentModel {
    /// Save model to file (format determined by file extension)
    fn save<P: AsRef<Path>>(&self, path: P, metadata: ModelMetadata, scaler: Option<MinMaxScaler>) -> Result<()>;

    /// Load model from file (format determined by file extension)
    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata, Option<MinMaxScaler>)>
    where
        Self: Sized;
}

impl PersistentModel for WeightForecaster {
    fn save<P: AsRef<Path>>(&self, path: P, metadata: ModelMetadata, scaler: Option<MinMaxScaler>) -> Result<()> {
        let saved_model = SavedModel {
            model: self.into(),
            metadata,
            scaler,
        };
        ModelPersistence::save(&saved_model, path)
    }

    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata, Option<MinMaxScaler>)> {
        let saved_model = ModelPersistence::load(path)?;
        Ok((saved_model.model.into_model()?, saved_model.metadata, saved_model.scaler))
    }
}
