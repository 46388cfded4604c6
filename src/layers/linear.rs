use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use rand_distr::Uniform;
use crate::optimizers::Optimizer;

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

/// Fully connected layer without activation: output = weight · input + bias
///
/// `input` is (input_size, batch), output is (output_size, batch).
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub weight: Array2<f64>,     // (output_size, input_size)
    pub bias: Array2<f64>,       // (output_size, 1)
    pub input_size: usize,
    pub output_size: usize,
    input_cache: Option<Array2<f64>>,
}

impl LinearLayer {
    /// Glorot-uniform weights, zero bias.
    pub fn new(input_size: usize, output_size: usize) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        let weight = Array2::random((output_size, input_size), Uniform::new(-limit, limit));
        let bias = Array2::zeros((output_size, 1));

        Self {
            weight,
            bias,
            input_size,
            output_size,
            input_cache: None,
        }
    }

    pub fn from_weights(weight: Array2<f64>, bias: Array2<f64>) -> Self {
        let (output_size, input_size) = weight.dim();
        assert_eq!(bias.shape(), &[output_size, 1], "Bias shape must be (output_size, 1)");

        Self {
            weight,
            bias,
            input_size,
            output_size,
            input_cache: None,
        }
    }

    /// Forward pass that remembers its input for [`LinearLayer::backward`].
    pub fn forward(&mut self, input: &Array2<f64>) -> Array2<f64> {
        let output = self.infer(input);
        self.input_cache = Some(input.clone());
        output
    }

    /// Forward pass without caching.
    pub fn infer(&self, input: &Array2<f64>) -> Array2<f64> {
        assert_eq!(input.nrows(), self.input_size,
                  "Input size {} doesn't match layer input size {}",
                  input.nrows(), self.input_size);
        self.weight.dot(input) + &self.bias
    }

    /// Returns (parameter_gradients, input_gradient) for the last forward input.
    pub fn backward(&self, grad_output: &Array2<f64>) -> (LinearGradients, Array2<f64>) {
        let input = self.input_cache.as_ref().expect("backward called before forward");

        let gradients = LinearGradients {
            weight: grad_output.dot(&input.t()),
            bias: grad_output.sum_axis(Axis(1)).insert_axis(Axis(1)),
        };
        let input_grad = self.weight.t().dot(grad_output);

        (gradients, input_grad)
    }

    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &LinearGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}
