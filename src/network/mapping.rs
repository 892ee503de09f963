//! Text-to-visual mapping network
//!
//! Projects textual class embeddings into the visual feature space so they
//! can be compared against visual prototypes. The architecture is a tagged
//! configuration chosen at construction: a single linear projection for
//! compact embeddings, or a bottleneck stack (linear, batch norm, ReLU,
//! linear) for wide ones.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::layer::{BatchNorm1d, Linear, Relu};
use crate::error::{Result, TextMappingError};
use crate::training::optimizer::Optimizer;

/// Architecture of the mapping network, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingTopology {
    /// One linear projection from text space to visual space.
    Simple,
    /// Linear to half the text width, batch norm, ReLU, linear to visual
    /// space. The batch-norm stage requires training batches of at least 2.
    Bottleneck,
}

impl MappingTopology {
    /// Recommended topology for a text embedding width: compact embeddings
    /// (up to 512) project directly, wider ones go through the bottleneck.
    pub fn for_text_dim(text_dim: usize) -> Self {
        if text_dim <= 512 {
            Self::Simple
        } else {
            Self::Bottleneck
        }
    }
}

/// Configuration for [`TextMapping`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Width of the incoming text embeddings
    pub text_dim: usize,
    /// Width of the visual feature space being projected into
    pub output_dim: usize,
    /// Network architecture
    pub topology: MappingTopology,
}

impl MappingConfig {
    /// Configuration with the topology recommended for `text_dim`.
    pub fn new(text_dim: usize, output_dim: usize) -> Self {
        Self {
            text_dim,
            output_dim,
            topology: MappingTopology::for_text_dim(text_dim),
        }
    }

    /// Override the recommended topology.
    pub fn with_topology(mut self, topology: MappingTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Bottleneck hidden width, if the topology has one.
    pub fn hidden_dim(&self) -> Option<usize> {
        match self.topology {
            MappingTopology::Simple => None,
            MappingTopology::Bottleneck => Some(self.text_dim / 2),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.text_dim == 0 {
            return Err(TextMappingError::InvalidConfig(
                "text dimension must be at least 1".to_string(),
            ));
        }
        if self.output_dim == 0 {
            return Err(TextMappingError::InvalidConfig(
                "output dimension must be at least 1".to_string(),
            ));
        }
        if self.hidden_dim() == Some(0) {
            return Err(TextMappingError::InvalidConfig(
                "bottleneck topology needs a text dimension of at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self::new(300, 64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum MappingLayers {
    Simple {
        project: Linear,
    },
    Bottleneck {
        compress: Linear,
        norm: BatchNorm1d,
        relu: Relu,
        project: Linear,
    },
}

/// Trainable projection from text embeddings to the visual feature space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextMapping {
    config: MappingConfig,
    layers: MappingLayers,
}

/// Gradients for every trainable tensor of a [`TextMapping`], in the order
/// [`TextMapping::apply_gradients`] consumes them. The optional fields are
/// populated for the bottleneck topology only.
#[derive(Debug, Clone)]
pub struct MappingGradients {
    pub input_weights: Array2<f64>,
    pub input_biases: Array1<f64>,
    pub norm_gamma: Option<Array1<f64>>,
    pub norm_beta: Option<Array1<f64>>,
    pub output_weights: Option<Array2<f64>>,
    pub output_biases: Option<Array1<f64>>,
}

impl TextMapping {
    /// Build a mapping with entropy-seeded Xavier initialization.
    pub fn new(config: MappingConfig) -> Result<Self> {
        let mut rng = rand::thread_rng();
        Self::from_rng(config, &mut rng)
    }

    /// Build a mapping with deterministic initialization.
    pub fn with_seed(config: MappingConfig, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::from_rng(config, &mut rng)
    }

    fn from_rng<R: Rng>(config: MappingConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;

        let layers = match config.topology {
            MappingTopology::Simple => MappingLayers::Simple {
                project: Linear::new(config.text_dim, config.output_dim, rng),
            },
            MappingTopology::Bottleneck => {
                let hidden = config.text_dim / 2;
                MappingLayers::Bottleneck {
                    compress: Linear::new(config.text_dim, hidden, rng),
                    norm: BatchNorm1d::new(hidden),
                    relu: Relu::new(),
                    project: Linear::new(hidden, config.output_dim, rng),
                }
            }
        };

        Ok(Self { config, layers })
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn text_dim(&self) -> usize {
        self.config.text_dim
    }

    pub fn output_dim(&self) -> usize {
        self.config.output_dim
    }

    pub fn topology(&self) -> MappingTopology {
        self.config.topology
    }

    /// The projection into visual space: the only layer of the simple
    /// topology, the final layer of the bottleneck.
    pub fn projection(&self) -> &Linear {
        match &self.layers {
            MappingLayers::Simple { project } => project,
            MappingLayers::Bottleneck { project, .. } => project,
        }
    }

    /// Mutable access to the projection layer, e.g. to install known weights.
    pub fn projection_mut(&mut self) -> &mut Linear {
        match &mut self.layers {
            MappingLayers::Simple { project } => project,
            MappingLayers::Bottleneck { project, .. } => project,
        }
    }

    /// Total number of trainable scalars.
    pub fn num_parameters(&self) -> usize {
        match &self.layers {
            MappingLayers::Simple { project } => project.num_parameters(),
            MappingLayers::Bottleneck {
                compress,
                norm,
                project,
                ..
            } => compress.num_parameters() + norm.num_parameters() + project.num_parameters(),
        }
    }

    /// Number of trainable tensors; the trainer allocates one optimizer slot
    /// per tensor.
    pub fn num_param_tensors(&self) -> usize {
        match self.config.topology {
            MappingTopology::Simple => 2,
            MappingTopology::Bottleneck => 6,
        }
    }

    /// Inference pass over a (batch, text_dim) matrix; batch norm runs on
    /// running statistics, so any batch size works.
    pub fn forward(&self, text: &Array2<f64>) -> Array2<f64> {
        match &self.layers {
            MappingLayers::Simple { project } => project.forward(text),
            MappingLayers::Bottleneck {
                compress,
                norm,
                relu,
                project,
            } => {
                let z = compress.forward(text);
                let z = norm.forward(&z);
                let z = relu.forward(&z);
                project.forward(&z)
            }
        }
    }

    /// Training pass; caches intermediates for [`TextMapping::backward`].
    ///
    /// With the bottleneck topology this fails on batches smaller than 2,
    /// because batch statistics are undefined there.
    pub fn forward_train(&mut self, text: &Array2<f64>) -> Result<Array2<f64>> {
        match &mut self.layers {
            MappingLayers::Simple { project } => Ok(project.forward_train(text)),
            MappingLayers::Bottleneck {
                compress,
                norm,
                relu,
                project,
            } => {
                let z = compress.forward_train(text);
                let z = norm.forward_train(&z)?;
                let z = relu.forward_train(&z);
                Ok(project.forward_train(&z))
            }
        }
    }

    /// Backward pass for the most recent [`TextMapping::forward_train`].
    pub fn backward(&self, upstream: &Array2<f64>) -> MappingGradients {
        match &self.layers {
            MappingLayers::Simple { project } => {
                let (_, weight_grad, bias_grad) = project.backward(upstream);
                MappingGradients {
                    input_weights: weight_grad,
                    input_biases: bias_grad,
                    norm_gamma: None,
                    norm_beta: None,
                    output_weights: None,
                    output_biases: None,
                }
            }
            MappingLayers::Bottleneck {
                compress,
                norm,
                relu,
                project,
            } => {
                let (grad, out_weight_grad, out_bias_grad) = project.backward(upstream);
                let grad = relu.backward(&grad);
                let (grad, gamma_grad, beta_grad) = norm.backward(&grad);
                let (_, in_weight_grad, in_bias_grad) = compress.backward(&grad);
                MappingGradients {
                    input_weights: in_weight_grad,
                    input_biases: in_bias_grad,
                    norm_gamma: Some(gamma_grad),
                    norm_beta: Some(beta_grad),
                    output_weights: Some(out_weight_grad),
                    output_biases: Some(out_bias_grad),
                }
            }
        }
    }

    /// Apply one optimizer step per trainable tensor.
    ///
    /// `optimizers` must hold exactly [`TextMapping::num_param_tensors`]
    /// slots; slot order is input weights, input biases, then for the
    /// bottleneck gamma, beta, output weights, output biases.
    pub fn apply_gradients(
        &mut self,
        grads: &MappingGradients,
        optimizers: &mut [Box<dyn Optimizer>],
    ) {
        assert_eq!(
            optimizers.len(),
            self.num_param_tensors(),
            "one optimizer slot per trainable tensor"
        );

        match &mut self.layers {
            MappingLayers::Simple { project } => {
                optimizers[0].update_matrix(&mut project.weights, &grads.input_weights);
                optimizers[1].update_vector(&mut project.biases, &grads.input_biases);
            }
            MappingLayers::Bottleneck {
                compress,
                norm,
                project,
                ..
            } => {
                let gamma_grad = grads
                    .norm_gamma
                    .as_ref()
                    .expect("gradient topology must match the mapping");
                let beta_grad = grads
                    .norm_beta
                    .as_ref()
                    .expect("gradient topology must match the mapping");
                let out_weight_grad = grads
                    .output_weights
                    .as_ref()
                    .expect("gradient topology must match the mapping");
                let out_bias_grad = grads
                    .output_biases
                    .as_ref()
                    .expect("gradient topology must match the mapping");

                optimizers[0].update_matrix(&mut compress.weights, &grads.input_weights);
                optimizers[1].update_vector(&mut compress.biases, &grads.input_biases);
                optimizers[2].update_vector(&mut norm.gamma, gamma_grad);
                optimizers[3].update_vector(&mut norm.beta, beta_grad);
                optimizers[4].update_matrix(&mut project.weights, out_weight_grad);
                optimizers[5].update_vector(&mut project.biases, out_bias_grad);
            }
        }
    }

    /// Persist parameters and configuration as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Restore a mapping persisted by [`TextMapping::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mapping = serde_json::from_reader(BufReader::new(file))?;
        Ok(mapping)
    }
}
