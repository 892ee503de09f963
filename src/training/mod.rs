//! Training and evaluation drivers
//!
//! This module provides:
//! - The episode container with explicit class-to-row alignment
//! - An episodic trainer taking one optimizer step per episode
//! - Batched evaluation with confidence intervals
//! - Optimizers and learning rate schedules

pub mod episode;
pub mod evaluator;
pub mod loss;
pub mod optimizer;
pub mod scheduler;
pub mod trainer;

pub use episode::Episode;
pub use evaluator::evaluate;
pub use loss::{softmax_cross_entropy, top1_accuracy};
pub use optimizer::{Adam, Optimizer, Sgd};
pub use scheduler::LearningRateScheduler;
pub use trainer::{EpisodicTrainer, EpochSummary, TrainerConfig};
