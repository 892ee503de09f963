//! Network components of the text-mapping head
//!
//! This module provides:
//! - Distance kernels shared by the scorer paths
//! - Linear, batch-norm and ReLU building blocks with manual backprop
//! - The text-to-visual mapping network
//! - The episodic scorer aligning text classes with visual prototypes

pub mod distance;
pub mod layer;
pub mod mapping;
pub mod scorer;

pub use distance::{inner_product, l2_normalize, squared_euclidean, NORM_EPS};
pub use layer::{BatchNorm1d, Linear, Relu};
pub use mapping::{MappingConfig, MappingGradients, MappingTopology, TextMapping};
pub use scorer::{EpisodeScorer, ScoreCache, ScoreMetric, ScorerConfig};
