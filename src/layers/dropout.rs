use ndarray::{Array2, Ix2};
use ndarray_rand::RandomExt;
use rand_distr::Uniform;

/// Inverted dropout with a mask that can be held across timesteps.
///
/// In variational mode the mask drawn on the first call is reused until
/// [`Dropout::reset_mask`] is called, so a whole input sequence is masked
/// consistently. Kept units are scaled by `1 / keep_prob`.
#[derive(Clone, Debug)]
pub struct Dropout {
    pub dropout_rate: f64,
    pub is_training: bool,
    pub variational: bool,
    mask: Option<Array2<f64>>,
}

impl Dropout {
    pub fn new(dropout_rate: f64) -> Self {
        assert!((0.0..1.0).contains(&dropout_rate),
                "Dropout rate must be in [0.0, 1.0)");

        Dropout {
            dropout_rate,
            is_training: true,
            variational: false,
            mask: None,
        }
    }

    pub fn variational(dropout_rate: f64) -> Self {
        let mut dropout = Self::new(dropout_rate);
        dropout.variational = true;
        dropout
    }

    pub fn train(&mut self) {
        self.is_training = true;
        self.mask = None;
    }

    pub fn eval(&mut self) {
        self.is_training = false;
        self.mask = None;
    }

    /// Forget the held mask; the next forward call draws a new one.
    pub fn reset_mask(&mut self) {
        self.mask = None;
    }

    pub fn keep_prob(&self) -> f64 {
        1.0 - self.dropout_rate
    }

    pub fn is_active(&self) -> bool {
        self.is_training && self.dropout_rate > 0.0
    }

    /// Returns the dropped input and the mask that was applied (already
    /// divided by the keep probability), or `None` when inactive.
    pub fn forward(&mut self, input: &Array2<f64>) -> (Array2<f64>, Option<Array2<f64>>) {
        if !self.is_active() {
            return (input.clone(), None);
        }

        let reuse = self.variational
            && self.mask.as_ref().map_or(false, |m| m.raw_dim() == input.raw_dim());
        if !reuse {
            self.mask = Some(self.generate_mask(input.raw_dim()));
        }

        let mask = self.mask.clone().unwrap_or_else(|| Array2::ones(input.raw_dim()));
        (input * &mask, Some(mask))
    }

    fn generate_mask(&self, shape: Ix2) -> Array2<f64> {
        let keep_prob = self.keep_prob();
        Array2::random(shape, Uniform::new(0.0, 1.0))
            .mapv(|x| if x < keep_prob { 1.0 / keep_prob } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_eval_is_identity() {
        let mut dropout = Dropout::new(0.5);
        let input = arr2(&[[1.0, 2.0], [3.0, 4.0]]);

        dropout.eval();
        let (output, mask) = dropout.forward(&input);
        assert_eq!(output, input);
        assert!(mask.is_none());
    }

    #[test]
    fn test_training_mask_values() {
        let mut dropout = Dropout::new(0.3);
        let input = Array2::ones((40, 8));

        let (output, mask) = dropout.forward(&input);
        let mask = mask.unwrap();
        let scaled = 1.0 / 0.7;
        assert!(mask.iter().all(|&m| m == 0.0 || (m - scaled).abs() < 1e-12));
        assert_eq!(output, mask);
    }

    #[test]
    fn test_variational_mask_reused_until_reset() {
        let mut dropout = Dropout::variational(0.5);
        let input = Array2::ones((16, 4));

        let (_, first) = dropout.forward(&input);
        let (_, second) = dropout.forward(&input);
        assert_eq!(first, second);

        dropout.reset_mask();
        let (_, third) = dropout.forward(&input);
        assert_eq!(third.unwrap().shape(), &[16, 4]);
    }
}
