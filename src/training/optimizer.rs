//! Gradient descent optimizers
//!
//! One optimizer instance serves exactly one parameter tensor. The trainer
//! clones a template into as many slots as the mapping has trainable
//! tensors, so momentum and moment estimates never alias between tensors of
//! different shapes.

use ndarray::{Array1, Array2};

/// Per-tensor optimizer interface.
pub trait Optimizer {
    /// One update step on a matrix-shaped parameter.
    fn update_matrix(&mut self, param: &mut Array2<f64>, grad: &Array2<f64>);

    /// One update step on a vector-shaped parameter.
    fn update_vector(&mut self, param: &mut Array1<f64>, grad: &Array1<f64>);

    /// Current learning rate.
    fn learning_rate(&self) -> f64;

    /// Retune the learning rate; schedulers call this every step.
    fn set_learning_rate(&mut self, learning_rate: f64);

    /// Clear accumulated state (velocity, moments, step counter).
    fn reset(&mut self);

    /// Clone into a fresh boxed instance.
    fn clone_box(&self) -> Box<dyn Optimizer>;
}

/// Stochastic gradient descent with optional momentum.
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f64,
    momentum: f64,
    velocity_matrix: Option<Array2<f64>>,
    velocity_vector: Option<Array1<f64>>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            momentum: 0.0,
            velocity_matrix: None,
            velocity_vector: None,
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }
}

impl Optimizer for Sgd {
    fn update_matrix(&mut self, param: &mut Array2<f64>, grad: &Array2<f64>) {
        if self.momentum > 0.0 {
            let velocity = self
                .velocity_matrix
                .get_or_insert_with(|| Array2::zeros(grad.raw_dim()));
            *velocity = &*velocity * self.momentum + grad;
            *param = &*param - &(&*velocity * self.learning_rate);
        } else {
            *param = &*param - &(grad * self.learning_rate);
        }
    }

    fn update_vector(&mut self, param: &mut Array1<f64>, grad: &Array1<f64>) {
        if self.momentum > 0.0 {
            let velocity = self
                .velocity_vector
                .get_or_insert_with(|| Array1::zeros(grad.raw_dim()));
            *velocity = &*velocity * self.momentum + grad;
            *param = &*param - &(&*velocity * self.learning_rate);
        } else {
            *param = &*param - &(grad * self.learning_rate);
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn reset(&mut self) {
        self.velocity_matrix = None;
        self.velocity_vector = None;
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}

/// Adam with bias-corrected first and second moment estimates.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: usize,
    m_matrix: Option<Array2<f64>>,
    v_matrix: Option<Array2<f64>>,
    m_vector: Option<Array1<f64>>,
    v_vector: Option<Array1<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            m_matrix: None,
            v_matrix: None,
            m_vector: None,
            v_vector: None,
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }
}

impl Optimizer for Adam {
    fn update_matrix(&mut self, param: &mut Array2<f64>, grad: &Array2<f64>) {
        self.t += 1;
        let m = self
            .m_matrix
            .get_or_insert_with(|| Array2::zeros(grad.raw_dim()));
        let v = self
            .v_matrix
            .get_or_insert_with(|| Array2::zeros(grad.raw_dim()));

        *m = &*m * self.beta1 + &(grad * (1.0 - self.beta1));
        *v = &*v * self.beta2 + &(grad.mapv(|g| g * g) * (1.0 - self.beta2));

        let t = self.t as i32;
        let m_hat = &*m / (1.0 - self.beta1.powi(t));
        let v_hat = &*v / (1.0 - self.beta2.powi(t));

        *param = &*param - &(m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon) * self.learning_rate);
    }

    fn update_vector(&mut self, param: &mut Array1<f64>, grad: &Array1<f64>) {
        self.t += 1;
        let m = self
            .m_vector
            .get_or_insert_with(|| Array1::zeros(grad.raw_dim()));
        let v = self
            .v_vector
            .get_or_insert_with(|| Array1::zeros(grad.raw_dim()));

        *m = &*m * self.beta1 + &(grad * (1.0 - self.beta1));
        *v = &*v * self.beta2 + &(grad.mapv(|g| g * g) * (1.0 - self.beta2));

        let t = self.t as i32;
        let m_hat = &*m / (1.0 - self.beta1.powi(t));
        let v_hat = &*v / (1.0 - self.beta2.powi(t));

        *param = &*param - &(m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon) * self.learning_rate);
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn reset(&mut self) {
        self.t = 0;
        self.m_matrix = None;
        self.v_matrix = None;
        self.m_vector = None;
        self.v_vector = None;
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}
