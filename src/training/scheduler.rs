//! Learning rate schedules for episodic training
//!
//! A schedule is pure: it maps a global step index to a learning rate, and
//! the trainer pushes the result into its optimizer slots before each
//! episode.

use serde::{Deserialize, Serialize};

/// Learning-rate schedule evaluated at a global step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LearningRateScheduler {
    /// Fixed learning rate.
    Constant { lr: f64 },
    /// Multiply by `gamma` every `step_size` steps, never below `min_lr`.
    StepDecay {
        initial_lr: f64,
        step_size: usize,
        gamma: f64,
        min_lr: f64,
    },
    /// Cosine curve from `initial_lr` down to `min_lr` across `total_steps`.
    CosineAnnealing {
        initial_lr: f64,
        total_steps: usize,
        min_lr: f64,
    },
}

impl LearningRateScheduler {
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    pub fn step_decay(initial_lr: f64, step_size: usize, gamma: f64, min_lr: f64) -> Self {
        Self::StepDecay {
            initial_lr,
            step_size,
            gamma,
            min_lr,
        }
    }

    pub fn cosine_annealing(initial_lr: f64, total_steps: usize, min_lr: f64) -> Self {
        Self::CosineAnnealing {
            initial_lr,
            total_steps,
            min_lr,
        }
    }

    /// Learning rate for a global step.
    pub fn step(&self, current_step: usize) -> f64 {
        match *self {
            Self::Constant { lr } => lr,

            Self::StepDecay {
                initial_lr,
                step_size,
                gamma,
                min_lr,
            } => {
                let num_decays = (current_step / step_size.max(1)) as i32;
                (initial_lr * gamma.powi(num_decays)).max(min_lr)
            }

            Self::CosineAnnealing {
                initial_lr,
                total_steps,
                min_lr,
            } => {
                let progress = current_step as f64 / total_steps.max(1) as f64;
                let cosine = (std::f64::consts::PI * progress.min(1.0)).cos();
                min_lr + 0.5 * (initial_lr - min_lr) * (1.0 + cosine)
            }
        }
    }
}

impl Default for LearningRateScheduler {
    fn default() -> Self {
        Self::constant(0.001)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_schedule() {
        let scheduler = LearningRateScheduler::constant(0.01);
        assert_relative_eq!(scheduler.step(0), 0.01, epsilon = 1e-15);
        assert_relative_eq!(scheduler.step(10_000), 0.01, epsilon = 1e-15);
    }

    #[test]
    fn test_step_decay_schedule() {
        let scheduler = LearningRateScheduler::step_decay(0.1, 100, 0.5, 1e-4);
        assert_relative_eq!(scheduler.step(0), 0.1, epsilon = 1e-12);
        assert_relative_eq!(scheduler.step(99), 0.1, epsilon = 1e-12);
        assert_relative_eq!(scheduler.step(100), 0.05, epsilon = 1e-12);
        assert_relative_eq!(scheduler.step(200), 0.025, epsilon = 1e-12);

        // Decay saturates at the floor.
        assert_relative_eq!(scheduler.step(100_000), 1e-4, epsilon = 1e-15);
    }

    #[test]
    fn test_cosine_annealing_schedule() {
        let scheduler = LearningRateScheduler::cosine_annealing(0.1, 1000, 1e-4);

        assert_relative_eq!(scheduler.step(0), 0.1, epsilon = 1e-12);

        let mid = scheduler.step(500);
        assert!(mid < 0.1 && mid > 1e-4);

        assert_relative_eq!(scheduler.step(1000), 1e-4, epsilon = 1e-12);
        // Past the horizon the rate stays at the floor.
        assert_relative_eq!(scheduler.step(2000), 1e-4, epsilon = 1e-12);
    }
}
