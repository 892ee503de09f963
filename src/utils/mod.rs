//! Utility metrics
//!
//! This module provides:
//! - Accuracy aggregation across evaluation episodes

pub mod metrics;

pub use metrics::{summarize_accuracies, AccuracySummary};
