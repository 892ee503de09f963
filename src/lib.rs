//! # Text-Mapping Few-Shot Classification
//!
//! This library implements an episodic few-shot classification head that
//! aligns textual class descriptions with visual prototypes.
//!
//! ## Overview
//!
//! Each episode carries a handful of visual examples and one textual
//! description per class. The head averages the first `n_support` visual
//! shots of every class into a prototype, projects the class descriptions
//! into the same space through a learned mapping, and scores every
//! description against every prototype. This is particularly useful where:
//!
//! - Novel classes arrive with only a few labeled visual examples
//! - Class descriptions carry semantics that transfer across classes
//! - The same head must train and evaluate on freshly sampled episodes
//!
//! ## Modules
//!
//! - `network` - Distance kernels, mapping layers, and the episodic scorer
//! - `training` - Episodic training, evaluation, optimizers and schedules
//! - `logging` - Progress line and scalar metric sinks for the drivers
//! - `error` - Crate-wide error type
//! - `utils` - Accuracy aggregation
//!
//! The backbone producing visual embeddings, episode sampling, and
//! checkpoint orchestration live outside this crate; everything here works
//! on plain `ndarray` tensors handed in by the caller.

pub mod error;
pub mod logging;
pub mod network;
pub mod training;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    // Network components
    pub use crate::network::{
        EpisodeScorer, MappingConfig, MappingTopology, ScoreMetric, ScorerConfig, TextMapping,
    };

    // Training components
    pub use crate::training::{
        evaluate, Adam, Episode, EpisodicTrainer, EpochSummary, LearningRateScheduler, Optimizer,
        Sgd, TrainerConfig,
    };

    // Logging sinks
    pub use crate::logging::{LogSink, MemoryLogger, NullLogger, RunLogger};

    // Error handling
    pub use crate::error::{Result, TextMappingError};

    // Utilities
    pub use crate::utils::{summarize_accuracies, AccuracySummary};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
