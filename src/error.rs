//! Error types for the few-shot text-mapping head.

use thiserror::Error;

/// The main error type for scoring, training, and persistence operations.
#[derive(Error, Debug)]
pub enum TextMappingError {
    /// An episode arrived with a different number of classes than the scorer
    /// was configured for. Way changes are a configuration error, never
    /// recoverable data.
    #[error("episode carries {actual} ways but the scorer was built for {expected}; way changes are not supported")]
    WayMismatch {
        /// Ways the scorer was configured with.
        expected: usize,
        /// Ways the offending episode carries.
        actual: usize,
    },

    /// The shot axis holds fewer shots than the configured support count.
    #[error("episode provides {actual} shots per class but {required} support shots are required")]
    ShotBudget {
        /// Support shots the scorer needs.
        required: usize,
        /// Shots the episode provides.
        actual: usize,
    },

    /// Visual feature dimension differs from the mapping output dimension.
    #[error("visual features have dimension {actual} but the mapping projects into {expected}")]
    VisualDimMismatch { expected: usize, actual: usize },

    /// Text embedding dimension differs from the mapping input dimension.
    #[error("text embeddings have dimension {actual} but the mapping expects {expected}")]
    TextDimMismatch { expected: usize, actual: usize },

    /// Invalid component configuration.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// Episode tensors disagree with each other.
    #[error("invalid episode: {0}")]
    InvalidEpisode(String),

    /// Batch normalization cannot compute batch statistics on this few rows.
    #[error("batch normalization requires at least 2 rows in training mode, got {size}")]
    DegenerateBatch { size: usize },

    /// I/O error while persisting or restoring a model.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, TextMappingError>;
