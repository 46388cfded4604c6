use ndarray::{s, Array2, Axis};
use ndarray_rand::RandomExt;
use rand_distr::Uniform;
use crate::layers::dropout::Dropout;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Holds gradients for all LSTM cell parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LSTMCellGradients {
    pub w_ih: Array2<f64>,
    pub w_hh: Array2<f64>,
    pub bias: Array2<f64>,
}

impl LSTMCellGradients {
    pub fn accumulate(&mut self, other: &LSTMCellGradients) {
        self.w_ih += &other.w_ih;
        self.w_hh += &other.w_hh;
        self.bias += &other.bias;
    }
}

/// Values from one forward step needed by the backward step
#[derive(Clone, Debug)]
pub struct LSTMCellCache {
    pub input: Array2<f64>, // input after dropout
    pub hx: Array2<f64>,
    pub cx: Array2<f64>,
    pub input_gate: Array2<f64>,
    pub forget_gate: Array2<f64>,
    pub cell_gate: Array2<f64>,
    pub output_gate: Array2<f64>,
    pub cy: Array2<f64>,
    pub input_dropout_mask: Option<Array2<f64>>,
}

/// LSTM cell operating on a batch of column vectors.
///
/// Inputs are (input_size, batch), states are (hidden_size, batch):
/// - i_t = σ(W_xi * dropout(x_t) + W_hi * h_t-1 + b_i)
/// - f_t = σ(W_xf * dropout(x_t) + W_hf * h_t-1 + b_f)
/// - g_t = tanh(W_xg * dropout(x_t) + W_hg * h_t-1 + b_g)
/// - o_t = σ(W_xo * dropout(x_t) + W_ho * h_t-1 + b_o)
/// - c_t = f_t ⊙ c_t-1 + i_t ⊙ g_t
/// - h_t = o_t ⊙ tanh(c_t)
#[derive(Clone, Debug)]
pub struct LSTMCell {
    pub w_ih: Array2<f64>,  // (4*hidden_size, input_size)
    pub w_hh: Array2<f64>,  // (4*hidden_size, hidden_size)
    pub bias: Array2<f64>,  // (4*hidden_size, 1)
    pub input_size: usize,
    pub hidden_size: usize,
    pub input_dropout: Option<Dropout>,
    pub is_training: bool,
}

impl LSTMCell {
    /// Glorot-uniform kernels, zero bias with the forget gate bias at 1.
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        let limit_ih = (6.0 / (input_size + 4 * hidden_size) as f64).sqrt();
        let limit_hh = (6.0 / (hidden_size + 4 * hidden_size) as f64).sqrt();

        let w_ih = Array2::random((4 * hidden_size, input_size), Uniform::new(-limit_ih, limit_ih));
        let w_hh = Array2::random((4 * hidden_size, hidden_size), Uniform::new(-limit_hh, limit_hh));
        let mut bias = Array2::zeros((4 * hidden_size, 1));
        bias.slice_mut(s![hidden_size..2 * hidden_size, ..]).fill(1.0);

        LSTMCell {
            w_ih,
            w_hh,
            bias,
            input_size,
            hidden_size,
            input_dropout: None,
            is_training: true,
        }
    }

    /// Variational dropout on the cell input: one mask per sequence.
    pub fn with_input_dropout(mut self, dropout_rate: f64) -> Self {
        self.input_dropout = if dropout_rate > 0.0 {
            Some(Dropout::variational(dropout_rate))
        } else {
            None
        };
        self
    }

    pub fn train(&mut self) {
        self.is_training = true;
        if let Some(ref mut dropout) = self.input_dropout {
            dropout.train();
        }
    }

    pub fn eval(&mut self) {
        self.is_training = false;
        if let Some(ref mut dropout) = self.input_dropout {
            dropout.eval();
        }
    }

    /// Called at the start of every sequence so the next one draws a new mask.
    pub fn reset_dropout_mask(&mut self) {
        if let Some(ref mut dropout) = self.input_dropout {
            dropout.reset_mask();
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.w_ih.len() + self.w_hh.len() + self.bias.len()
    }

    pub fn forward(&mut self, input: &Array2<f64>, hx: &Array2<f64>, cx: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let (hy, cy, _) = self.forward_with_cache(input, hx, cx);
        (hy, cy)
    }

    pub fn forward_with_cache(&mut self, input: &Array2<f64>, hx: &Array2<f64>, cx: &Array2<f64>) -> (Array2<f64>, Array2<f64>, LSTMCellCache) {
        let (input_dropped, input_mask) = match self.input_dropout {
            Some(ref mut dropout) => dropout.forward(input),
            None => (input.clone(), None),
        };

        // Gate pre-activations stacked as [input, forget, cell, output]
        let gates = self.w_ih.dot(&input_dropped) + self.w_hh.dot(hx) + &self.bias;
        let h = self.hidden_size;

        let input_gate = gates.slice(s![0..h, ..]).mapv(sigmoid);
        let forget_gate = gates.slice(s![h..2 * h, ..]).mapv(sigmoid);
        let cell_gate = gates.slice(s![2 * h..3 * h, ..]).mapv(f64::tanh);
        let output_gate = gates.slice(s![3 * h..4 * h, ..]).mapv(sigmoid);

        let cy = &forget_gate * cx + &input_gate * &cell_gate;
        let hy = &output_gate * &cy.mapv(f64::tanh);

        let cache = LSTMCellCache {
            input: input_dropped,
            hx: hx.clone(),
            cx: cx.clone(),
            input_gate,
            forget_gate,
            cell_gate,
            output_gate,
            cy: cy.clone(),
            input_dropout_mask: input_mask,
        };

        (hy, cy, cache)
    }

    /// Backward step for one timestep.
    ///
    /// `dhy` and `dcy` are the gradients flowing into this step's hidden and
    /// cell outputs. Returns (parameter_gradients, input_gradient,
    /// previous_hidden_gradient, previous_cell_gradient).
    pub fn backward(&self, dhy: &Array2<f64>, dcy: &Array2<f64>, cache: &LSTMCellCache) -> (LSTMCellGradients, Array2<f64>, Array2<f64>, Array2<f64>) {
        let h = self.hidden_size;
        let batch = dhy.ncols();

        let tanh_cy = cache.cy.mapv(f64::tanh);

        // ∂L/∂o_t = ∂L/∂h_t ⊙ tanh(c_t)
        let do_raw = dhy * &tanh_cy * &cache.output_gate * &cache.output_gate.mapv(|x| 1.0 - x);

        // Cell state receives the direct path and the path through h_t
        let dcy_total = dcy + &(dhy * &cache.output_gate * &tanh_cy.mapv(|x| 1.0 - x * x));

        let df_raw = &dcy_total * &cache.cx * &cache.forget_gate * &cache.forget_gate.mapv(|x| 1.0 - x);
        let di_raw = &dcy_total * &cache.cell_gate * &cache.input_gate * &cache.input_gate.mapv(|x| 1.0 - x);
        let dg_raw = &dcy_total * &cache.input_gate * &cache.cell_gate.mapv(|x| 1.0 - x * x);

        let mut dgates = Array2::zeros((4 * h, batch));
        dgates.slice_mut(s![0..h, ..]).assign(&di_raw);
        dgates.slice_mut(s![h..2 * h, ..]).assign(&df_raw);
        dgates.slice_mut(s![2 * h..3 * h, ..]).assign(&dg_raw);
        dgates.slice_mut(s![3 * h..4 * h, ..]).assign(&do_raw);

        let gradients = LSTMCellGradients {
            w_ih: dgates.dot(&cache.input.t()),
            w_hh: dgates.dot(&cache.hx.t()),
            bias: dgates.sum_axis(Axis(1)).insert_axis(Axis(1)),
        };

        let mut dx = self.w_ih.t().dot(&dgates);
        if let Some(ref mask) = cache.input_dropout_mask {
            dx = dx * mask;
        }
        let dhx = self.w_hh.t().dot(&dgates);
        let dcx = &dcy_total * &cache.forget_gate;

        (gradients, dx, dhx, dcx)
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> LSTMCellGradients {
        LSTMCellGradients {
            w_ih: Array2::zeros(self.w_ih.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    /// Apply gradients using the provided optimizer
    pub fn update_parameters<O: crate::optimizers::Optimizer>(&mut self, gradients: &LSTMCellGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_w_ih", prefix), &mut self.w_ih, &gradients.w_ih);
        optimizer.update(&format!("{}_w_hh", prefix), &mut self.w_hh, &gradients.w_hh);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }
}
