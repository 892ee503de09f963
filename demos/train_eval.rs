//! Train-and-Evaluate Example
//!
//! This example demonstrates the full episodic workflow:
//! 1. Creating a text-to-visual mapping
//! 2. Training it on synthetic episodes
//! 3. Evaluating with a confidence interval
//!
//! Run with: cargo run --example train_eval

use ndarray::{Array2, Array3};
use rand::prelude::*;
use text_mapping_fewshot::prelude::*;

/// Forwards progress lines to stdout and drops scalars.
struct StdoutLogger;

impl RunLogger for StdoutLogger {
    fn line(&mut self, text: &str) {
        println!("   {}", text);
    }

    fn scalar(&mut self, _name: &str, _step: usize, _value: f64) {}
}

fn main() {
    println!("=== Text-Mapping Few-Shot Example ===\n");

    // Configuration
    let n_way = 5; // Classes per episode
    let n_support = 5; // Visual shots averaged into each prototype
    let text_dim = 300; // Word-embedding dimension
    let visual_dim = 64; // Visual embedding dimension

    // Generate synthetic episodes
    println!("1. Generating synthetic episodes...");
    let train_episodes = generate_episodes(200, n_way, n_support, text_dim, visual_dim, 42);
    let eval_episodes = generate_episodes(50, n_way, n_support, text_dim, visual_dim, 7);
    println!("   - Train episodes: {}", train_episodes.len());
    println!("   - Eval episodes: {}\n", eval_episodes.len());

    // Create the mapping network
    println!("2. Creating text-to-visual mapping...");
    let config = MappingConfig::new(text_dim, visual_dim);
    let mapping = TextMapping::with_seed(config, 42).expect("valid mapping config");
    println!(
        "   - Architecture: {} -> {} ({:?})",
        text_dim,
        visual_dim,
        mapping.topology()
    );
    println!("   - Trainable parameters: {}\n", mapping.num_parameters());

    // Build the scorer and trainer
    println!("3. Building episodic scorer and trainer...");
    let scorer = EpisodeScorer::new(ScorerConfig::new(n_way, n_support), mapping)
        .expect("valid scorer config");
    let mut trainer = EpisodicTrainer::new(
        TrainerConfig { log_interval: 50 },
        scorer,
        Box::new(Adam::new(0.005)),
    )
    .with_scheduler(LearningRateScheduler::step_decay(0.005, 300, 0.5, 1e-4));

    let mut logger = StdoutLogger;
    let before = evaluate(trainer.scorer(), &eval_episodes, None).expect("evaluation runs");
    println!("   - Accuracy before training: {:.2}%\n", before.mean);

    // Train
    println!("4. Training...");
    for epoch in 1..=3 {
        let summary = trainer
            .train_epoch(epoch, &train_episodes, &mut logger)
            .expect("training runs");
        println!(
            "   Epoch {} done: avg loss {:.6} over {} episodes",
            epoch, summary.avg_loss, summary.episodes
        );
    }
    println!();

    // Evaluate
    println!("5. Evaluating...");
    let after = evaluate(trainer.scorer(), &eval_episodes, Some(&mut logger))
        .expect("evaluation runs");
    println!(
        "   - Mean accuracy: {:.2}% (std {:.2}, 95% CI +- {:.2})\n",
        after.mean, after.std_dev, after.ci95
    );

    // Compare score metrics on one episode
    println!("6. Score metric comparison:");
    let episode = &eval_episodes[0];
    for metric in [ScoreMetric::Euclidean, ScoreMetric::Cosine] {
        let probe = EpisodeScorer::new(
            ScorerConfig::new(n_way, n_support).with_metric(metric),
            trainer.scorer().mapping().clone(),
        )
        .expect("valid scorer config");
        let scores = probe
            .score(&episode.visual, &episode.text)
            .expect("scoring runs");
        let diag_mean = (0..n_way).map(|i| scores[[i, i]]).sum::<f64>() / n_way as f64;
        println!("   - {:?}: mean diagonal score {:.4}", metric, diag_mean);
    }

    println!("\n=== Example Complete ===");
}

/// Generate episodes whose visual shots cluster around one anchor per class
/// and whose text rows are fixed one-hot class descriptions.
fn generate_episodes(
    n_episodes: usize,
    n_way: usize,
    n_support: usize,
    text_dim: usize,
    visual_dim: usize,
    seed: u64,
) -> Vec<Episode> {
    let mut rng = StdRng::seed_from_u64(seed);
    let text_stride = text_dim / n_way;
    let visual_stride = visual_dim / n_way;

    let class_text = Array2::from_shape_fn((n_way, text_dim), |(c, d)| {
        if d == c * text_stride {
            1.0
        } else {
            0.0
        }
    });

    (0..n_episodes)
        .map(|_| {
            let visual = Array3::from_shape_fn((n_way, n_support, visual_dim), |(c, _, d)| {
                let anchor = if d == c * visual_stride { 2.0 } else { 0.0 };
                anchor + rng.gen::<f64>() * 0.5 - 0.25
            });
            Episode::with_shared_text(visual, class_text.clone(), (0..n_way).collect())
                .expect("well-formed episode")
        })
        .collect()
}
