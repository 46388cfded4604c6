use std::fmt::Write as _;

use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

use crate::config::ModelConfig;
use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::layers::lstm_cell::LSTMCellGradients;
use crate::models::lstm_network::{LSTMNetwork, LSTMSequenceCache};
use crate::optimizers::Optimizer;

/// Gradients for every trainable parameter of a [`WeightForecaster`]
#[derive(Clone, Debug)]
pub struct ForecasterGradients {
    pub lstm: Vec<LSTMCellGradients>,
    pub hidden: LinearGradients,
    pub output: LinearGradients,
}

impl ForecasterGradients {
    pub fn matrices_mut(&mut self) -> Vec<&mut Array2<f64>> {
        let mut matrices = Vec::new();
        for g in &mut self.lstm {
            matrices.push(&mut g.w_ih);
            matrices.push(&mut g.w_hh);
            matrices.push(&mut g.bias);
        }
        matrices.push(&mut self.hidden.weight);
        matrices.push(&mut self.hidden.bias);
        matrices.push(&mut self.output.weight);
        matrices.push(&mut self.output.bias);
        matrices
    }
}

/// Cached forward state for one batch
pub struct ForecasterCache {
    sequence: LSTMSequenceCache,
}

/// Stacked LSTM encoder followed by two dense layers.
///
/// A (timesteps, features) window goes through the LSTM stack; the last
/// hidden state of the top layer feeds Dense(dense_size) and then
/// Dense(forecast_steps), one output per future day.
#[derive(Clone, Debug)]
pub struct WeightForecaster {
    pub lstm: LSTMNetwork,
    pub hidden: LinearLayer,
    pub output: LinearLayer,
    pub timesteps: usize,
}

impl WeightForecaster {
    pub fn new(n_features: usize, timesteps: usize, forecast_steps: usize, config: &ModelConfig) -> Self {
        let lstm = LSTMNetwork::new(n_features, config.hidden_size, config.num_layers)
            .with_input_dropout(config.dropout);
        WeightForecaster {
            lstm,
            hidden: LinearLayer::new(config.hidden_size, config.dense_size),
            output: LinearLayer::new(config.dense_size, forecast_steps),
            timesteps,
        }
    }

    pub fn from_parts(lstm: LSTMNetwork, hidden: LinearLayer, output: LinearLayer, timesteps: usize) -> Self {
        WeightForecaster { lstm, hidden, output, timesteps }
    }

    pub fn n_features(&self) -> usize {
        self.lstm.input_size
    }

    pub fn forecast_steps(&self) -> usize {
        self.output.output_size
    }

    pub fn train(&mut self) {
        self.lstm.train();
    }

    pub fn eval(&mut self) {
        self.lstm.eval();
    }

    pub fn num_parameters(&self) -> usize {
        self.lstm.num_parameters() + self.hidden.num_parameters() + self.output.num_parameters()
    }

    /// Turn (batch, timesteps, features) windows into one (features, batch)
    /// matrix per timestep.
    pub fn batch_to_sequence(inputs: ArrayView3<'_, f64>) -> Vec<Array2<f64>> {
        inputs
            .axis_iter(Axis(1))
            .map(|step| step.t().to_owned())
            .collect()
    }

    /// Forward pass for training. Returns (forecast_steps, batch) predictions.
    pub fn forward_with_cache(&mut self, inputs: ArrayView3<'_, f64>) -> (Array2<f64>, ForecasterCache) {
        let sequence = Self::batch_to_sequence(inputs);
        let (encoded, cache) = self.lstm.forward_sequence_with_cache(&sequence);
        let hidden = self.hidden.forward(&encoded);
        let output = self.output.forward(&hidden);
        (output, ForecasterCache { sequence: cache })
    }

    /// Backward pass from the gradient of the loss with respect to the output.
    pub fn backward(&self, d_output: &Array2<f64>, cache: &ForecasterCache) -> ForecasterGradients {
        let (output_gradients, d_hidden) = self.output.backward(d_output);
        let (hidden_gradients, d_encoded) = self.hidden.backward(&d_hidden);
        let lstm_gradients = self.lstm.backward_sequence(&d_encoded, &cache.sequence);

        ForecasterGradients {
            lstm: lstm_gradients,
            hidden: hidden_gradients,
            output: output_gradients,
        }
    }

    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &ForecasterGradients, optimizer: &mut O) {
        self.lstm.update_parameters(&gradients.lstm, optimizer);
        self.hidden.update_parameters(&gradients.hidden, optimizer, "dense_0");
        self.output.update_parameters(&gradients.output, optimizer, "dense_1");
    }

    /// Predict a batch of windows. Returns (batch, forecast_steps).
    ///
    /// Uses the current mode; call [`WeightForecaster::eval`] first for
    /// deterministic output.
    pub fn predict_batch(&mut self, inputs: ArrayView3<'_, f64>) -> Array2<f64> {
        let sequence = Self::batch_to_sequence(inputs);
        let encoded = self.lstm.forward_sequence(&sequence);
        let hidden = self.hidden.infer(&encoded);
        self.output.infer(&hidden).reversed_axes()
    }

    /// Predict the full horizon for one (timesteps, features) window.
    pub fn predict_window(&mut self, window: ArrayView2<'_, f64>) -> Vec<f64> {
        let batch = window.insert_axis(Axis(0));
        self.predict_batch(batch).row(0).to_vec()
    }

    /// Layer table with output shapes and parameter counts.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<16}{:<20}{:>10}", "Layer", "Output Shape", "Param #");
        for (i, cell) in self.lstm.get_cells().iter().enumerate() {
            let shape = if i + 1 < self.lstm.num_layers {
                format!("({}, {})", self.timesteps, cell.hidden_size)
            } else {
                format!("({})", cell.hidden_size)
            };
            let _ = writeln!(out, "{:<16}{:<20}{:>10}", format!("lstm_{}", i), shape, cell.num_parameters());
        }
        let _ = writeln!(out, "{:<16}{:<20}{:>10}", "dense_0", format!("({})", self.hidden.output_size), self.hidden.num_parameters());
        let _ = writeln!(out, "{:<16}{:<20}{:>10}", "dense_1", format!("({})", self.output.output_size), self.output.num_parameters());
        let _ = write!(out, "Total params: {}", self.num_parameters());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn model() -> WeightForecaster {
        WeightForecaster::new(5, 7, 90, &ModelConfig::default())
    }

    #[test]
    fn test_parameter_count() {
        // lstm(5->32): 4*32*(5+32+1), lstm(32->32): 4*32*(32+32+1), dense 32->64, dense 64->90
        let expected = 4864 + 8320 + (32 * 64 + 64) + (64 * 90 + 90);
        assert_eq!(model().num_parameters(), expected);
        assert!(model().summary().contains(&format!("Total params: {}", expected)));
    }

    #[test]
    fn test_predict_shapes() {
        let mut forecaster = model();
        forecaster.eval();
        let inputs = Array3::from_elem((4, 7, 5), 0.5);

        let predictions = forecaster.predict_batch(inputs.view());
        assert_eq!(predictions.shape(), &[4, 90]);

        let single = forecaster.predict_window(inputs.index_axis(Axis(0), 0));
        assert_eq!(single.len(), 90);
        assert_eq!(single, predictions.row(0).to_vec());
    }

    #[test]
    fn test_batch_to_sequence_layout() {
        let inputs = Array3::from_shape_fn((2, 7, 5), |(b, t, f)| (b * 100 + t * 10 + f) as f64);
        let sequence = WeightForecaster::batch_to_sequence(inputs.view());
        assert_eq!(sequence.len(), 7);
        assert_eq!(sequence[3].shape(), &[5, 2]);
        assert_eq!(sequence[3][[4, 1]], 134.0);
    }

    #[test]
    fn test_backward_gradient_shapes() {
        let mut forecaster = model();
        let inputs = Array3::from_elem((3, 7, 5), 0.2);
        let (output, cache) = forecaster.forward_with_cache(inputs.view());
        assert_eq!(output.shape(), &[90, 3]);

        let gradients = forecaster.backward(&Array2::ones(output.raw_dim()), &cache);
        assert_eq!(gradients.output.weight.shape(), &[90, 64]);
        assert_eq!(gradients.hidden.weight.shape(), &[64, 32]);
        assert_eq!(gradients.lstm.len(), 2);
    }
}
