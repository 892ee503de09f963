//! Episodic training loop for the text-to-visual mapping
//!
//! Drives one optimizer step per episode: score the episode, take the
//! cross-entropy loss against the aligned diagonal targets, push gradients
//! back through the mapping, and update every trainable tensor.

use crate::error::Result;
use crate::logging::RunLogger;
use crate::network::EpisodeScorer;
use crate::training::loss::softmax_cross_entropy;
use crate::training::optimizer::Optimizer;
use crate::training::{Episode, LearningRateScheduler};
use serde::{Deserialize, Serialize};

/// Configuration for the trainer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Progress reporting interval (episodes)
    pub log_interval: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self { log_interval: 10 }
    }
}

/// Per-epoch training summary
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpochSummary {
    /// Episodes consumed in this epoch
    pub episodes: usize,
    /// Loss averaged over the whole epoch
    pub avg_loss: f64,
}

/// Trainer for the episodic text-mapping head.
///
/// Holds one optimizer slot per trainable tensor of the mapping, cloned from
/// a single template so that momentum and moment estimates never alias. The
/// step counter is global across epochs, which keeps scalar metrics keyed by
/// a strictly increasing step.
pub struct EpisodicTrainer {
    config: TrainerConfig,
    scorer: EpisodeScorer,
    optimizers: Vec<Box<dyn Optimizer>>,
    scheduler: Option<LearningRateScheduler>,
    global_step: usize,
}

impl EpisodicTrainer {
    /// Create a new trainer. `optimizer` is a template; one independent copy
    /// is made per trainable tensor of the scorer's mapping.
    pub fn new(config: TrainerConfig, scorer: EpisodeScorer, optimizer: Box<dyn Optimizer>) -> Self {
        let optimizers = (0..scorer.mapping().num_param_tensors())
            .map(|_| optimizer.clone_box())
            .collect();
        Self {
            config,
            scorer,
            optimizers,
            scheduler: None,
            global_step: 0,
        }
    }

    /// Set the learning rate scheduler
    pub fn with_scheduler(mut self, scheduler: LearningRateScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Run one epoch over `episodes`, taking exactly one optimizer step per
    /// episode.
    ///
    /// Every `log_interval` episodes a progress line with the running average
    /// loss and the current learning rate goes to `logger`, together with a
    /// `"loss"` scalar keyed by the global step count. Any episode that fails
    /// validation aborts the epoch with the error; earlier updates in the
    /// epoch are kept.
    pub fn train_epoch(
        &mut self,
        epoch: usize,
        episodes: &[Episode],
        logger: &mut dyn RunLogger,
    ) -> Result<EpochSummary> {
        let total = episodes.len();
        let log_interval = self.config.log_interval.max(1);
        let mut loss_sum = 0.0;

        for (episode_idx, episode) in episodes.iter().enumerate() {
            let lr = match &self.scheduler {
                Some(scheduler) => {
                    let lr = scheduler.step(self.global_step);
                    for optimizer in &mut self.optimizers {
                        optimizer.set_learning_rate(lr);
                    }
                    lr
                }
                None => self.optimizers[0].learning_rate(),
            };

            let cache = self.scorer.score_train(&episode.visual, &episode.text)?;
            let (loss, score_grad) =
                softmax_cross_entropy(&cache.scores, &episode.aligned_targets());
            let grads = self.scorer.backward(&cache, &score_grad);
            self.scorer
                .mapping_mut()
                .apply_gradients(&grads, &mut self.optimizers);

            self.global_step += 1;
            loss_sum += loss;

            if (episode_idx + 1) % log_interval == 0 {
                let avg_loss = loss_sum / (episode_idx + 1) as f64;
                logger.line(&format!(
                    "Epoch {}  Batch {}/{}  Loss {:.6}  Lr {:.6}",
                    epoch,
                    episode_idx + 1,
                    total,
                    avg_loss,
                    lr
                ));
                logger.scalar("loss", self.global_step, avg_loss);
            }
        }

        let avg_loss = if total > 0 {
            loss_sum / total as f64
        } else {
            0.0
        };
        Ok(EpochSummary {
            episodes: total,
            avg_loss,
        })
    }

    /// Get the trained scorer
    pub fn scorer(&self) -> &EpisodeScorer {
        &self.scorer
    }

    /// Get mutable reference to the scorer
    pub fn scorer_mut(&mut self) -> &mut EpisodeScorer {
        &mut self.scorer
    }

    /// Optimizer steps taken so far, across all epochs.
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Current learning rate of the optimizer slots.
    pub fn learning_rate(&self) -> f64 {
        self.optimizers[0].learning_rate()
    }

    /// Consume the trainer and return the scorer.
    pub fn into_scorer(self) -> EpisodeScorer {
        self.scorer
    }
}
