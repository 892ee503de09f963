//! Accuracy aggregation for episodic evaluation
//!
//! Evaluation produces one accuracy percentage per episode; these helpers
//! collapse a batch of them into the mean / std / confidence-interval
//! statistics few-shot results are reported with.

use serde::{Deserialize, Serialize};

/// Aggregate accuracy over a batch of evaluation episodes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AccuracySummary {
    /// Mean episode accuracy, in percent
    pub mean: f64,
    /// Population standard deviation of the episode accuracies, in percent
    pub std_dev: f64,
    /// Half width of the 95% confidence interval: `1.96 * std / sqrt(n)`
    pub ci95: f64,
    /// Number of episodes aggregated
    pub n_episodes: usize,
}

impl AccuracySummary {
    /// Summary over zero episodes; every statistic is zero.
    pub fn empty() -> Self {
        Self::default()
    }

    /// One-line report in the conventional test-accuracy format.
    pub fn summary_line(&self) -> String {
        format!(
            "{} Test Acc = {:.2}% +- {:.2}%",
            self.n_episodes, self.mean, self.ci95
        )
    }
}

/// Collapse per-episode accuracy percentages into summary statistics.
pub fn summarize_accuracies(accuracies: &[f64]) -> AccuracySummary {
    if accuracies.is_empty() {
        return AccuracySummary::empty();
    }

    let n = accuracies.len() as f64;
    let mean = accuracies.iter().sum::<f64>() / n;
    let variance = accuracies.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    AccuracySummary {
        mean,
        std_dev,
        ci95: 1.96 * std_dev / n.sqrt(),
        n_episodes: accuracies.len(),
    }
}
