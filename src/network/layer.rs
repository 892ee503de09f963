//! Trainable building blocks for the text-to-visual mapping network
//!
//! Each block keeps the forward activations it needs for backpropagation in
//! `#[serde(skip)]` caches, so a persisted model carries parameters only.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TextMappingError};

/// Fully connected layer: `output = input · weights + biases`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Linear {
    /// Weight matrix (input_dim x output_dim)
    pub weights: Array2<f64>,
    /// Bias vector (output_dim)
    pub biases: Array1<f64>,

    #[serde(skip)]
    last_input: Option<Array2<f64>>,
}

impl Linear {
    /// Create a layer with Xavier-normal weights and zero biases.
    pub fn new<R: Rng>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        let std = (2.0 / (input_dim + output_dim) as f64).sqrt();
        let normal = Normal::new(0.0, std).unwrap();
        let weights = Array2::from_shape_fn((input_dim, output_dim), |_| rng.sample(normal));

        Self {
            weights,
            biases: Array1::zeros(output_dim),
            last_input: None,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weights.ncols()
    }

    /// Forward pass without caching; used for inference.
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.weights) + &self.biases
    }

    /// Forward pass that caches the input for [`Linear::backward`].
    pub fn forward_train(&mut self, input: &Array2<f64>) -> Array2<f64> {
        self.last_input = Some(input.clone());
        self.forward(input)
    }

    /// Backward pass.
    /// Returns: (input_gradient, weight_gradient, bias_gradient)
    pub fn backward(&self, upstream: &Array2<f64>) -> (Array2<f64>, Array2<f64>, Array1<f64>) {
        let input = self
            .last_input
            .as_ref()
            .expect("Must call forward_train before backward");

        let weight_gradient = input.t().dot(upstream);
        let bias_gradient = upstream.sum_axis(Axis(0));
        let input_gradient = upstream.dot(&self.weights.t());

        (input_gradient, weight_gradient, bias_gradient)
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

impl Clone for Linear {
    fn clone(&self) -> Self {
        Self {
            weights: self.weights.clone(),
            biases: self.biases.clone(),
            last_input: None,
        }
    }
}

/// Per-feature batch normalization over a (batch, features) matrix.
///
/// Training mode normalizes with batch statistics and maintains running
/// estimates (momentum 0.1, unbiased variance); inference mode consumes the
/// running estimates and accepts any batch size, including 1.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchNorm1d {
    /// Learned per-feature scale
    pub gamma: Array1<f64>,
    /// Learned per-feature shift
    pub beta: Array1<f64>,
    /// Running mean estimate used at inference time
    pub running_mean: Array1<f64>,
    /// Running variance estimate used at inference time
    pub running_var: Array1<f64>,
    /// Fraction of the batch statistic blended into the running estimate
    pub momentum: f64,
    /// Variance floor inside the square root
    pub eps: f64,

    #[serde(skip)]
    cache: Option<BatchNormCache>,
}

#[derive(Debug, Clone)]
struct BatchNormCache {
    normalized: Array2<f64>,
    inv_std: Array1<f64>,
}

impl BatchNorm1d {
    pub fn new(features: usize) -> Self {
        Self {
            gamma: Array1::ones(features),
            beta: Array1::zeros(features),
            running_mean: Array1::zeros(features),
            running_var: Array1::ones(features),
            momentum: 0.1,
            eps: 1e-5,
            cache: None,
        }
    }

    pub fn features(&self) -> usize {
        self.gamma.len()
    }

    /// Inference pass using the running statistics.
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        let inv_std = self.running_var.mapv(|v| 1.0 / (v + self.eps).sqrt());
        let normalized = (input - &self.running_mean) * &inv_std;
        normalized * &self.gamma + &self.beta
    }

    /// Training pass using batch statistics.
    ///
    /// Batch statistics are undefined for a single row, so batches smaller
    /// than 2 fail with [`TextMappingError::DegenerateBatch`] instead of
    /// silently producing zeros.
    pub fn forward_train(&mut self, input: &Array2<f64>) -> Result<Array2<f64>> {
        let n = input.nrows();
        if n < 2 {
            return Err(TextMappingError::DegenerateBatch { size: n });
        }
        let nf = n as f64;

        let mean = input.sum_axis(Axis(0)) / nf;
        let centered = input - &mean;
        let var = centered.mapv(|v| v * v).sum_axis(Axis(0)) / nf;
        let inv_std = var.mapv(|v| 1.0 / (v + self.eps).sqrt());
        let normalized = &centered * &inv_std;

        let unbiased_var = &var * (nf / (nf - 1.0));
        self.running_mean = &self.running_mean * (1.0 - self.momentum) + &(&mean * self.momentum);
        self.running_var =
            &self.running_var * (1.0 - self.momentum) + &(&unbiased_var * self.momentum);

        let output = &normalized * &self.gamma + &self.beta;
        self.cache = Some(BatchNormCache {
            normalized,
            inv_std,
        });
        Ok(output)
    }

    /// Backward pass through the batch statistics.
    /// Returns: (input_gradient, gamma_gradient, beta_gradient)
    pub fn backward(&self, upstream: &Array2<f64>) -> (Array2<f64>, Array1<f64>, Array1<f64>) {
        let cache = self
            .cache
            .as_ref()
            .expect("Must call forward_train before backward");
        let xhat = &cache.normalized;
        let n = upstream.nrows() as f64;

        let gamma_gradient = (upstream * xhat).sum_axis(Axis(0));
        let beta_gradient = upstream.sum_axis(Axis(0));

        let dxhat = upstream * &self.gamma;
        let sum_dxhat = dxhat.sum_axis(Axis(0));
        let sum_dxhat_xhat = (&dxhat * xhat).sum_axis(Axis(0));
        let input_gradient =
            (&dxhat * n - &sum_dxhat - xhat * &sum_dxhat_xhat) * &cache.inv_std / n;

        (input_gradient, gamma_gradient, beta_gradient)
    }

    pub fn num_parameters(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }
}

impl Clone for BatchNorm1d {
    fn clone(&self) -> Self {
        Self {
            gamma: self.gamma.clone(),
            beta: self.beta.clone(),
            running_mean: self.running_mean.clone(),
            running_var: self.running_var.clone(),
            momentum: self.momentum,
            eps: self.eps,
            cache: None,
        }
    }
}

/// Rectified linear activation with a cached pre-activation for the backward
/// pass.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Relu {
    #[serde(skip)]
    last_input: Option<Array2<f64>>,
}

impl Relu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        input.mapv(|v| v.max(0.0))
    }

    pub fn forward_train(&mut self, input: &Array2<f64>) -> Array2<f64> {
        self.last_input = Some(input.clone());
        self.forward(input)
    }

    pub fn backward(&self, upstream: &Array2<f64>) -> Array2<f64> {
        let input = self
            .last_input
            .as_ref()
            .expect("Must call forward_train before backward");
        let mask = input.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        upstream * &mask
    }
}

impl Clone for Relu {
    fn clone(&self) -> Self {
        Self { last_input: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_creation() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Linear::new(10, 5, &mut rng);
        assert_eq!(layer.weights.dim(), (10, 5));
        assert_eq!(layer.biases.len(), 5);
        assert_eq!(layer.num_parameters(), 10 * 5 + 5);
    }

    #[test]
    fn test_linear_forward_known_values() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut layer = Linear::new(2, 2, &mut rng);
        layer.weights = array![[1.0, 0.0], [0.0, 1.0]];
        layer.biases = array![0.5, -0.5];

        let out = layer.forward(&array![[2.0, 3.0]]);
        assert_relative_eq!(out[[0, 0]], 2.5, epsilon = 1e-12);
        assert_relative_eq!(out[[0, 1]], 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_backward_gradients() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut layer = Linear::new(2, 2, &mut rng);
        layer.weights = array![[1.0, 0.0], [0.0, 1.0]];
        layer.biases = array![0.0, 0.0];

        let input = array![[1.0, 2.0]];
        layer.forward_train(&input);
        let (dx, dw, db) = layer.backward(&array![[1.0, 1.0]]);

        assert_eq!(dw, array![[1.0, 1.0], [2.0, 2.0]]);
        assert_eq!(db, array![1.0, 1.0]);
        assert_eq!(dx, array![[1.0, 1.0]]);
    }

    #[test]
    fn test_batchnorm_standardizes_training_batch() {
        let mut bn = BatchNorm1d::new(1);
        let out = bn.forward_train(&array![[1.0], [3.0]]).unwrap();

        // Mean 2, variance 1 -> rows map to roughly -1 and +1.
        assert_relative_eq!(out[[0, 0]], -1.0, epsilon = 1e-4);
        assert_relative_eq!(out[[1, 0]], 1.0, epsilon = 1e-4);

        // Running estimates blend one step toward the batch statistics.
        assert_relative_eq!(bn.running_mean[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(bn.running_var[0], 0.9 + 0.1 * 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_batchnorm_rejects_single_row_batches() {
        let mut bn = BatchNorm1d::new(3);
        let err = bn.forward_train(&array![[1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(
            err,
            TextMappingError::DegenerateBatch { size: 1 }
        ));
    }

    #[test]
    fn test_batchnorm_inference_uses_running_stats() {
        let bn = BatchNorm1d::new(2);
        // Fresh running stats are mean 0 / var 1, so inference is near-identity
        // and works on a single row.
        let out = bn.forward(&array![[2.0, -4.0]]);
        assert_relative_eq!(out[[0, 0]], 2.0, epsilon = 1e-4);
        assert_relative_eq!(out[[0, 1]], -4.0, epsilon = 1e-4);
    }

    #[test]
    fn test_batchnorm_backward_matches_finite_differences() {
        let features = 2;
        let input = array![[0.5, -1.0], [2.0, 0.25], [-0.75, 1.5]];
        let upstream = array![[1.0, -0.5], [0.25, 0.75], [-1.5, 0.5]];

        let mut bn = BatchNorm1d::new(features);
        bn.gamma = array![1.25, 0.75];
        bn.beta = array![0.1, -0.2];

        bn.forward_train(&input).unwrap();
        let (dx, dgamma, dbeta) = bn.backward(&upstream);

        let h = 1e-6;
        let loss = |bn: &mut BatchNorm1d, input: &Array2<f64>| {
            (&bn.forward_train(input).unwrap() * &upstream).sum()
        };

        let mut probe = input.clone();
        for i in 0..probe.nrows() {
            for k in 0..probe.ncols() {
                let orig = probe[[i, k]];
                let mut fresh = BatchNorm1d::new(features);
                fresh.gamma = bn.gamma.clone();
                fresh.beta = bn.beta.clone();

                probe[[i, k]] = orig + h;
                let plus = loss(&mut fresh, &probe);
                probe[[i, k]] = orig - h;
                let minus = loss(&mut fresh, &probe);
                probe[[i, k]] = orig;

                let numeric = (plus - minus) / (2.0 * h);
                assert_relative_eq!(dx[[i, k]], numeric, epsilon = 1e-4);
            }
        }

        assert_relative_eq!(dbeta[0], upstream.column(0).sum(), epsilon = 1e-12);
        assert_relative_eq!(dbeta[1], upstream.column(1).sum(), epsilon = 1e-12);
        assert_eq!(dgamma.len(), features);
    }

    #[test]
    fn test_relu_masks_gradient() {
        let mut relu = Relu::new();
        let out = relu.forward_train(&array![[-1.0, 2.0], [0.0, 3.0]]);
        assert_eq!(out, array![[0.0, 2.0], [0.0, 3.0]]);

        let grad = relu.backward(&array![[5.0, 5.0], [5.0, 5.0]]);
        assert_eq!(grad, array![[0.0, 5.0], [0.0, 5.0]]);
    }

    #[test]
    fn test_clone_drops_caches() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut layer = Linear::new(2, 2, &mut rng);
        layer.forward_train(&array![[1.0, 2.0]]);

        let cloned = layer.clone();
        assert!(cloned.last_input.is_none());
        assert_eq!(cloned.weights, layer.weights);
    }
}
