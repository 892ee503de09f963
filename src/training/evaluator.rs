//! Episodic evaluation loop
//!
//! Runs inference over a batch of episodes and aggregates the per-episode
//! accuracies into a mean with a 95% confidence interval.

use crate::error::Result;
use crate::logging::RunLogger;
use crate::network::EpisodeScorer;
use crate::training::loss::top1_accuracy;
use crate::training::Episode;
use crate::utils::metrics::{summarize_accuracies, AccuracySummary};

/// Evaluate `scorer` over `episodes` without touching its weights.
///
/// Each episode contributes one accuracy percentage: the share of score rows
/// whose argmax lands on the matching prototype column. When `logger` is
/// supplied, the aggregate summary line is emitted through it. Episode
/// validation errors abort the run; no partial summary is returned.
pub fn evaluate(
    scorer: &EpisodeScorer,
    episodes: &[Episode],
    logger: Option<&mut dyn RunLogger>,
) -> Result<AccuracySummary> {
    let mut accuracies = Vec::with_capacity(episodes.len());
    for episode in episodes {
        let scores = scorer.score(&episode.visual, &episode.text)?;
        accuracies.push(top1_accuracy(&scores, &episode.aligned_targets()) * 100.0);
    }

    let summary = summarize_accuracies(&accuracies);
    if let Some(logger) = logger {
        logger.line(&summary.summary_line());
    }
    Ok(summary)
}
