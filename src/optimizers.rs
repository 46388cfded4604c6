use ndarray::Array2;
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn reset(&mut self);
    fn learning_rate(&self) -> f64;
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        param.scaled_add(-self.learning_rate, gradient);
    }

    fn reset(&mut self) {}

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

struct AdamState {
    m: Array2<f64>,
    v: Array2<f64>,
    t: i32,
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected estimates. The step counter is
/// kept per parameter, so each parameter advances once per batch.
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    state: HashMap<String, AdamState>,
}

impl Adam {
    /// Defaults: β₁ = 0.9, β₂ = 0.999, ε = 1e-7
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-7)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            state: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let state = self
            .state
            .entry(param_id.to_string())
            .or_insert_with(|| AdamState {
                m: Array2::zeros(param.raw_dim()),
                v: Array2::zeros(param.raw_dim()),
                t: 0,
            });
        state.t += 1;

        state.m = self.beta1 * &state.m + (1.0 - self.beta1) * gradient;
        state.v = self.beta2 * &state.v + (1.0 - self.beta2) * &gradient.mapv(|g| g * g);

        let m_hat = &state.m / (1.0 - self.beta1.powi(state.t));
        let v_hat = &state.v / (1.0 - self.beta2.powi(state.t));

        let update = self.learning_rate * m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon);
        *param -= &update;
    }

    fn reset(&mut self) {
        self.state.clear();
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_sgd_optimizer() {
        let mut optimizer = SGD::new(0.1);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        let expected = &original_param - &(0.1 * &gradient);
        assert!((param - expected).mapv(f64::abs).sum() < 1e-10);
    }

    #[test]
    fn test_adam_first_step_is_learning_rate_sized() {
        let mut optimizer = Adam::new(0.001);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, -0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        // after bias correction the first step is lr * sign(g)
        let step = &original_param - &param;
        assert!((step[[0, 0]] - 0.001).abs() < 1e-6);
        assert!((step[[0, 1]] + 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_adam_step_counter_per_parameter() {
        let mut optimizer = Adam::new(0.01);
        let gradient = arr2(&[[0.5]]);
        let mut a = arr2(&[[0.0]]);
        let mut b = arr2(&[[0.0]]);

        optimizer.update("a", &mut a, &gradient);
        optimizer.update("b", &mut b, &gradient);
        assert_eq!(a, b);
    }
}
