use ndarray::Array2;
use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMCellGradients};
use crate::optimizers::Optimizer;

/// Per-timestep caches of every layer, indexed `[timestep][layer]`
#[derive(Clone, Debug)]
pub struct LSTMSequenceCache {
    pub steps: Vec<Vec<LSTMCellCache>>,
}

/// Stacked LSTM where the hidden output of layer i is the input of layer i+1.
///
/// Sequences are slices of (input_size, batch) matrices, one per timestep.
/// State starts at zero for every sequence.
#[derive(Clone, Debug)]
pub struct LSTMNetwork {
    cells: Vec<LSTMCell>,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub is_training: bool,
}

impl LSTMNetwork {
    pub fn new(input_size: usize, hidden_size: usize, num_layers: usize) -> Self {
        let cells = (0..num_layers)
            .map(|i| {
                let layer_input_size = if i == 0 { input_size } else { hidden_size };
                LSTMCell::new(layer_input_size, hidden_size)
            })
            .collect();

        LSTMNetwork {
            cells,
            input_size,
            hidden_size,
            num_layers,
            is_training: true,
        }
    }

    /// Input dropout on every layer
    pub fn with_input_dropout(mut self, dropout_rate: f64) -> Self {
        self.cells = self
            .cells
            .into_iter()
            .map(|cell| cell.with_input_dropout(dropout_rate))
            .collect();
        self
    }

    /// Creates a network from existing cells (used for deserialization)
    pub fn from_cells(cells: Vec<LSTMCell>, input_size: usize, hidden_size: usize) -> Self {
        let num_layers = cells.len();
        LSTMNetwork {
            cells,
            input_size,
            hidden_size,
            num_layers,
            is_training: false,
        }
    }

    pub fn get_cells(&self) -> &[LSTMCell] {
        &self.cells
    }

    pub fn train(&mut self) {
        self.is_training = true;
        for cell in &mut self.cells {
            cell.train();
        }
    }

    pub fn eval(&mut self) {
        self.is_training = false;
        for cell in &mut self.cells {
            cell.eval();
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.cells.iter().map(|c| c.num_parameters()).sum()
    }

    /// Runs the whole sequence and returns the top layer's hidden state at
    /// the last timestep, plus the caches for [`LSTMNetwork::backward_sequence`].
    pub fn forward_sequence_with_cache(&mut self, sequence: &[Array2<f64>]) -> (Array2<f64>, LSTMSequenceCache) {
        let batch = sequence.first().map_or(1, |x| x.ncols());
        let mut hx: Vec<Array2<f64>> = vec![Array2::zeros((self.hidden_size, batch)); self.num_layers];
        let mut cx: Vec<Array2<f64>> = vec![Array2::zeros((self.hidden_size, batch)); self.num_layers];
        let mut steps = Vec::with_capacity(sequence.len());

        for cell in &mut self.cells {
            cell.reset_dropout_mask();
        }

        for input in sequence {
            let mut current_input = input.clone();
            let mut layer_caches = Vec::with_capacity(self.num_layers);

            for (layer, cell) in self.cells.iter_mut().enumerate() {
                let (new_hx, new_cx, cache) = cell.forward_with_cache(&current_input, &hx[layer], &cx[layer]);
                layer_caches.push(cache);
                current_input = new_hx.clone();
                hx[layer] = new_hx;
                cx[layer] = new_cx;
            }
            steps.push(layer_caches);
        }

        let output = hx
            .pop()
            .unwrap_or_else(|| Array2::zeros((self.hidden_size, batch)));
        (output, LSTMSequenceCache { steps })
    }

    /// Inference-only forward pass.
    pub fn forward_sequence(&mut self, sequence: &[Array2<f64>]) -> Array2<f64> {
        self.forward_sequence_with_cache(sequence).0
    }

    /// Backpropagation through time for a loss on the final hidden state.
    ///
    /// Walks timesteps in reverse; within a timestep walks layers top-down so
    /// the input gradient of layer l feeds the hidden gradient of layer l-1.
    /// Returns per-layer gradients summed over all timesteps.
    pub fn backward_sequence(&self, d_output: &Array2<f64>, cache: &LSTMSequenceCache) -> Vec<LSTMCellGradients> {
        let batch = d_output.ncols();
        let mut gradients = self.zero_gradients();
        let mut dh_next: Vec<Array2<f64>> = vec![Array2::zeros((self.hidden_size, batch)); self.num_layers];
        let mut dc_next: Vec<Array2<f64>> = vec![Array2::zeros((self.hidden_size, batch)); self.num_layers];
        let last = cache.steps.len().saturating_sub(1);

        for (t, layer_caches) in cache.steps.iter().enumerate().rev() {
            let mut dh_from_above: Option<Array2<f64>> = if t == last { Some(d_output.clone()) } else { None };

            for layer in (0..self.num_layers).rev() {
                let dh = match dh_from_above.take() {
                    Some(d) => d + &dh_next[layer],
                    None => dh_next[layer].clone(),
                };
                let (step_gradients, dx, dhx, dcx) = self.cells[layer].backward(&dh, &dc_next[layer], &layer_caches[layer]);
                gradients[layer].accumulate(&step_gradients);
                dh_next[layer] = dhx;
                dc_next[layer] = dcx;
                if layer > 0 {
                    dh_from_above = Some(dx);
                }
            }
        }

        gradients
    }

    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &[LSTMCellGradients], optimizer: &mut O) {
        for (i, (cell, cell_gradients)) in self.cells.iter_mut().zip(gradients.iter()).enumerate() {
            let prefix = format!("lstm_{}", i);
            cell.update_parameters(cell_gradients, optimizer, &prefix);
        }
    }

    pub fn zero_gradients(&self) -> Vec<LSTMCellGradients> {
        self.cells.iter().map(|cell| cell.zero_gradients()).collect()
    }
}
