//! Episodic scorer aligning projected text embeddings with visual prototypes
//!
//! An episode brings `n_way` classes, each with a stack of visual feature
//! shots and a (repeated) textual class embedding. The scorer averages the
//! first `n_support` shots per class into prototypes, projects the text side
//! through the mapping network, and compares the two sides with the
//! configured metric.

use ndarray::{s, Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use super::distance::{
    inner_product, l2_normalize, l2_normalize_grad, squared_euclidean,
    squared_euclidean_grad_lhs, NORM_EPS,
};
use super::mapping::{MappingGradients, TextMapping};
use crate::error::{Result, TextMappingError};

/// How projected text embeddings are compared against visual prototypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreMetric {
    /// Negated pairwise squared Euclidean distance; 0 is a perfect match,
    /// everything else is negative.
    Euclidean,
    /// Inner product of L2-normalized rows; scores lie in [-1, 1].
    Cosine,
}

impl Default for ScoreMetric {
    fn default() -> Self {
        Self::Euclidean
    }
}

/// Configuration for [`EpisodeScorer`]; `n_way` and `n_support` are fixed
/// for the lifetime of the scorer and every episode must match them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Number of classes per episode
    pub n_way: usize,
    /// Support shots per class averaged into the prototype
    pub n_support: usize,
    /// Comparison metric
    pub metric: ScoreMetric,
}

impl ScorerConfig {
    pub fn new(n_way: usize, n_support: usize) -> Self {
        Self {
            n_way,
            n_support,
            metric: ScoreMetric::default(),
        }
    }

    pub fn with_metric(mut self, metric: ScoreMetric) -> Self {
        self.metric = metric;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.n_way == 0 {
            return Err(TextMappingError::InvalidConfig(
                "n_way must be at least 1".to_string(),
            ));
        }
        if self.n_support == 0 {
            return Err(TextMappingError::InvalidConfig(
                "n_support must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self::new(5, 5)
    }
}

/// Forward intermediates recorded by [`EpisodeScorer::score_train`] and
/// consumed by [`EpisodeScorer::backward`].
#[derive(Debug, Clone)]
pub struct ScoreCache {
    /// Score matrix (n_way, n_way): row = text class, column = prototype class
    pub scores: Array2<f64>,
    prototypes: Array2<f64>,
    projected: Array2<f64>,
    cosine: Option<CosineCache>,
}

#[derive(Debug, Clone)]
struct CosineCache {
    text_hat: Array2<f64>,
    text_norms: Array1<f64>,
    proto_hat: Array2<f64>,
}

/// Scores episodes by aligning mapped text embeddings with visual
/// prototypes. Owns the trainable [`TextMapping`].
#[derive(Debug, Clone)]
pub struct EpisodeScorer {
    config: ScorerConfig,
    mapping: TextMapping,
}

impl EpisodeScorer {
    /// Build a scorer around a mapping network. The mapping's output
    /// dimension defines the visual feature dimension episodes must carry.
    pub fn new(config: ScorerConfig, mapping: TextMapping) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, mapping })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn n_way(&self) -> usize {
        self.config.n_way
    }

    pub fn n_support(&self) -> usize {
        self.config.n_support
    }

    pub fn metric(&self) -> ScoreMetric {
        self.config.metric
    }

    pub fn mapping(&self) -> &TextMapping {
        &self.mapping
    }

    /// Mutable access to the mapping, e.g. for external checkpointing or to
    /// install known weights.
    pub fn mapping_mut(&mut self) -> &mut TextMapping {
        &mut self.mapping
    }

    /// Score one episode.
    ///
    /// `visual` is `(n_way, n_shots, visual_dim)` with `n_shots >=
    /// n_support`; `text` is `(n_way, n_shots, text_dim)` where every shot of
    /// a class repeats the class embedding, so only the first slot is read.
    /// Returns the `(n_way, n_way)` score matrix whose row `i` holds the
    /// scores of text class `i` against every visual prototype; higher means
    /// more aligned for both metrics.
    ///
    /// Inputs are never mutated, and repeated calls with identical inputs
    /// and untouched parameters return bit-identical matrices. Episodes
    /// whose leading axis disagrees with the configured `n_way` fail with
    /// [`TextMappingError::WayMismatch`].
    pub fn score(&self, visual: &Array3<f64>, text: &Array3<f64>) -> Result<Array2<f64>> {
        self.validate_episode(visual, text)?;

        let prototypes = self.prototypes(visual);
        let projected = self.mapping.forward(&self.class_text(text));
        let (scores, _) = self.metric_scores(&projected, &prototypes);
        Ok(scores)
    }

    /// Score one episode on the caching training path (batch norm runs on
    /// batch statistics) and keep the intermediates for
    /// [`EpisodeScorer::backward`].
    pub fn score_train(&mut self, visual: &Array3<f64>, text: &Array3<f64>) -> Result<ScoreCache> {
        self.validate_episode(visual, text)?;

        let prototypes = self.prototypes(visual);
        let class_text = self.class_text(text);
        let projected = self.mapping.forward_train(&class_text)?;
        let (scores, cosine) = self.metric_scores(&projected, &prototypes);

        Ok(ScoreCache {
            scores,
            prototypes,
            projected,
            cosine,
        })
    }

    /// Backpropagate a gradient on the score matrix down to the mapping
    /// parameters. Prototypes are episode data, not parameters, so no
    /// gradient flows into the visual side.
    pub fn backward(&self, cache: &ScoreCache, upstream: &Array2<f64>) -> MappingGradients {
        let projected_grad = match self.config.metric {
            ScoreMetric::Euclidean => {
                // scores = -distance, so the distance sees a negated gradient
                let distance_grad = -upstream;
                squared_euclidean_grad_lhs(&distance_grad, &cache.projected, &cache.prototypes)
            }
            ScoreMetric::Cosine => {
                let cosine = cache
                    .cosine
                    .as_ref()
                    .expect("cosine intermediates are recorded by score_train");
                let normalized_grad = upstream.dot(&cosine.proto_hat);
                l2_normalize_grad(&cosine.text_hat, &cosine.text_norms, &normalized_grad)
            }
        };
        self.mapping.backward(&projected_grad)
    }

    fn validate_episode(&self, visual: &Array3<f64>, text: &Array3<f64>) -> Result<()> {
        let (v_way, v_shots, v_dim) = visual.dim();
        let (t_way, t_shots, t_dim) = text.dim();

        if v_way != self.config.n_way {
            return Err(TextMappingError::WayMismatch {
                expected: self.config.n_way,
                actual: v_way,
            });
        }
        if t_way != self.config.n_way {
            return Err(TextMappingError::WayMismatch {
                expected: self.config.n_way,
                actual: t_way,
            });
        }
        if v_shots < self.config.n_support {
            return Err(TextMappingError::ShotBudget {
                required: self.config.n_support,
                actual: v_shots,
            });
        }
        if t_shots == 0 {
            return Err(TextMappingError::InvalidEpisode(
                "text tensor needs at least one slot per class".to_string(),
            ));
        }
        if v_dim != self.mapping.output_dim() {
            return Err(TextMappingError::VisualDimMismatch {
                expected: self.mapping.output_dim(),
                actual: v_dim,
            });
        }
        if t_dim != self.mapping.text_dim() {
            return Err(TextMappingError::TextDimMismatch {
                expected: self.mapping.text_dim(),
                actual: t_dim,
            });
        }
        Ok(())
    }

    /// Class prototypes: mean over the first `n_support` shots per class.
    fn prototypes(&self, visual: &Array3<f64>) -> Array2<f64> {
        let support = visual.slice(s![.., ..self.config.n_support, ..]);
        support.sum_axis(Axis(1)) / self.config.n_support as f64
    }

    /// First text slot of every class, as a (n_way, text_dim) matrix.
    fn class_text(&self, text: &Array3<f64>) -> Array2<f64> {
        text.slice(s![.., 0, ..]).to_owned()
    }

    fn metric_scores(
        &self,
        projected: &Array2<f64>,
        prototypes: &Array2<f64>,
    ) -> (Array2<f64>, Option<CosineCache>) {
        match self.config.metric {
            ScoreMetric::Euclidean => (-squared_euclidean(projected, prototypes), None),
            ScoreMetric::Cosine => {
                let (text_hat, text_norms) = l2_normalize(projected, NORM_EPS);
                let (proto_hat, _) = l2_normalize(prototypes, NORM_EPS);
                let scores = inner_product(&text_hat, &proto_hat);
                (
                    scores,
                    Some(CosineCache {
                        text_hat,
                        text_norms,
                        proto_hat,
                    }),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mapping::{MappingConfig, TextMapping};
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::Normal;

    /// Scorer whose mapping is the 4-dimensional identity.
    fn identity_scorer(n_way: usize, n_support: usize, metric: ScoreMetric) -> EpisodeScorer {
        let mut mapping = TextMapping::with_seed(MappingConfig::new(4, 4), 1).unwrap();
        mapping.projection_mut().weights = Array2::eye(4);
        mapping.projection_mut().biases = ndarray::Array1::zeros(4);

        let config = ScorerConfig::new(n_way, n_support).with_metric(metric);
        EpisodeScorer::new(config, mapping).unwrap()
    }

    /// Two-way episode with orthogonal unit classes.
    fn orthogonal_episode() -> (Array3<f64>, Array3<f64>) {
        let mut visual = Array3::zeros((2, 1, 4));
        visual[[0, 0, 0]] = 1.0;
        visual[[1, 0, 1]] = 1.0;
        let text = visual.clone();
        (visual, text)
    }

    fn random_episode(rng: &mut StdRng, n_way: usize, shots: usize, dim: usize) -> Array3<f64> {
        let normal = Normal::new(0.0, 1.0).unwrap();
        Array3::from_shape_fn((n_way, shots, dim), |_| rng.sample(normal))
    }

    #[test]
    fn test_score_shape_and_diagonal_alignment() {
        let scorer = identity_scorer(2, 1, ScoreMetric::Euclidean);
        let (visual, text) = orthogonal_episode();

        let scores = scorer.score(&visual, &text).unwrap();
        assert_eq!(scores.dim(), (2, 2));

        // Text row i matches prototype column i exactly.
        assert_relative_eq!(scores[[0, 0]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(scores[[1, 1]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(scores[[0, 1]], -2.0, epsilon = 1e-12);
        assert_relative_eq!(scores[[1, 0]], -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_euclidean_scores_are_non_positive() {
        let scorer = identity_scorer(2, 1, ScoreMetric::Euclidean);
        let mut rng = StdRng::seed_from_u64(3);
        let visual = random_episode(&mut rng, 2, 3, 4);
        let text = random_episode(&mut rng, 2, 3, 4);

        let scores = scorer.score(&visual, &text).unwrap();
        for &s in scores.iter() {
            assert!(s <= 0.0);
        }
    }

    #[test]
    fn test_cosine_scores_stay_in_unit_range() {
        let scorer = identity_scorer(2, 1, ScoreMetric::Cosine);
        let (visual, text) = orthogonal_episode();

        let scores = scorer.score(&visual, &text).unwrap();
        assert_relative_eq!(scores[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(scores[[1, 1]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(scores[[0, 1]], 0.0, epsilon = 1e-12);

        let mut rng = StdRng::seed_from_u64(11);
        let visual = random_episode(&mut rng, 2, 2, 4);
        let text = random_episode(&mut rng, 2, 2, 4);
        let scores = scorer.score(&visual, &text).unwrap();
        for &s in scores.iter() {
            assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&s));
        }
    }

    #[test]
    fn test_scores_are_finite_on_random_episodes() {
        let mut rng = StdRng::seed_from_u64(5);
        let mapping = TextMapping::with_seed(MappingConfig::new(300, 64), 5).unwrap();
        let scorer = EpisodeScorer::new(ScorerConfig::new(5, 2), mapping).unwrap();

        let visual = random_episode(&mut rng, 5, 4, 64);
        let text = random_episode(&mut rng, 5, 4, 300);

        let scores = scorer.score(&visual, &text).unwrap();
        assert_eq!(scores.dim(), (5, 5));
        assert!(scores.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_score_is_idempotent_and_does_not_mutate_inputs() {
        let scorer = identity_scorer(2, 1, ScoreMetric::Euclidean);
        let (visual, text) = orthogonal_episode();
        let visual_before = visual.clone();
        let text_before = text.clone();

        let first = scorer.score(&visual, &text).unwrap();
        let second = scorer.score(&visual, &text).unwrap();

        assert_eq!(first, second);
        assert_eq!(visual, visual_before);
        assert_eq!(text, text_before);
    }

    #[test]
    fn test_way_mismatch_is_fatal() {
        let scorer = identity_scorer(2, 1, ScoreMetric::Euclidean);
        let visual = Array3::zeros((3, 1, 4));
        let text = Array3::zeros((3, 1, 4));

        let err = scorer.score(&visual, &text).unwrap_err();
        assert!(matches!(
            err,
            TextMappingError::WayMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_shot_budget_is_enforced() {
        let scorer = identity_scorer(2, 2, ScoreMetric::Euclidean);
        let visual = Array3::zeros((2, 1, 4));
        let text = Array3::zeros((2, 1, 4));

        let err = scorer.score(&visual, &text).unwrap_err();
        assert!(matches!(
            err,
            TextMappingError::ShotBudget {
                required: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_dimension_mismatches_are_reported() {
        let scorer = identity_scorer(2, 1, ScoreMetric::Euclidean);

        let bad_visual = Array3::zeros((2, 1, 5));
        let text = Array3::zeros((2, 1, 4));
        assert!(matches!(
            scorer.score(&bad_visual, &text).unwrap_err(),
            TextMappingError::VisualDimMismatch { .. }
        ));

        let visual = Array3::zeros((2, 1, 4));
        let bad_text = Array3::zeros((2, 1, 3));
        assert!(matches!(
            scorer.score(&visual, &bad_text).unwrap_err(),
            TextMappingError::TextDimMismatch { .. }
        ));
    }

    #[test]
    fn test_prototypes_average_support_shots_only() {
        let scorer = identity_scorer(1, 2, ScoreMetric::Euclidean);

        // Two support shots averaging to [2, 0, 0, 0]; a third (query) shot
        // that must not contaminate the prototype.
        let mut visual = Array3::zeros((1, 3, 4));
        visual[[0, 0, 0]] = 1.0;
        visual[[0, 1, 0]] = 3.0;
        visual[[0, 2, 0]] = 100.0;

        let mut text = Array3::zeros((1, 3, 4));
        text[[0, 0, 0]] = 2.0;
        text[[0, 1, 0]] = 100.0;

        let scores = scorer.score(&visual, &text).unwrap();
        assert_relative_eq!(scores[[0, 0]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_train_path_matches_inference_for_simple_topology() {
        let mut scorer = identity_scorer(2, 1, ScoreMetric::Euclidean);
        let (visual, text) = orthogonal_episode();

        let inference = scorer.score(&visual, &text).unwrap();
        let cache = scorer.score_train(&visual, &text).unwrap();
        assert_eq!(inference, cache.scores);
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let n_way = 2;
        let text_dim = 3;
        let visual_dim = 2;

        let mut rng = StdRng::seed_from_u64(17);
        let mapping = TextMapping::with_seed(MappingConfig::new(text_dim, visual_dim), 17).unwrap();
        let mut scorer =
            EpisodeScorer::new(ScorerConfig::new(n_way, 1), mapping).unwrap();

        let visual = random_episode(&mut rng, n_way, 1, visual_dim);
        let text = random_episode(&mut rng, n_way, 1, text_dim);
        let upstream = Array2::from_shape_fn((n_way, n_way), |_| {
            rng.sample(Normal::new(0.0, 1.0).unwrap())
        });

        let cache = scorer.score_train(&visual, &text).unwrap();
        let grads = scorer.backward(&cache, &upstream);

        let h = 1e-6;
        let weights = scorer.mapping().projection().weights.clone();
        for i in 0..weights.nrows() {
            for k in 0..weights.ncols() {
                let orig = weights[[i, k]];

                scorer.mapping_mut().projection_mut().weights[[i, k]] = orig + h;
                let plus = (&scorer.score(&visual, &text).unwrap() * &upstream).sum();
                scorer.mapping_mut().projection_mut().weights[[i, k]] = orig - h;
                let minus = (&scorer.score(&visual, &text).unwrap() * &upstream).sum();
                scorer.mapping_mut().projection_mut().weights[[i, k]] = orig;

                let numeric = (plus - minus) / (2.0 * h);
                assert_relative_eq!(grads.input_weights[[i, k]], numeric, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_cosine_backward_matches_finite_differences() {
        let n_way = 2;
        let text_dim = 3;
        let visual_dim = 2;

        let mut rng = StdRng::seed_from_u64(23);
        let mapping = TextMapping::with_seed(MappingConfig::new(text_dim, visual_dim), 23).unwrap();
        let mut scorer = EpisodeScorer::new(
            ScorerConfig::new(n_way, 1).with_metric(ScoreMetric::Cosine),
            mapping,
        )
        .unwrap();

        let visual = random_episode(&mut rng, n_way, 1, visual_dim);
        let text = random_episode(&mut rng, n_way, 1, text_dim);
        let upstream = Array2::from_shape_fn((n_way, n_way), |_| {
            rng.sample(Normal::new(0.0, 1.0).unwrap())
        });

        let cache = scorer.score_train(&visual, &text).unwrap();
        let grads = scorer.backward(&cache, &upstream);

        let h = 1e-6;
        let weights = scorer.mapping().projection().weights.clone();
        for i in 0..weights.nrows() {
            for k in 0..weights.ncols() {
                let orig = weights[[i, k]];

                scorer.mapping_mut().projection_mut().weights[[i, k]] = orig + h;
                let plus = (&scorer.score(&visual, &text).unwrap() * &upstream).sum();
                scorer.mapping_mut().projection_mut().weights[[i, k]] = orig - h;
                let minus = (&scorer.score(&visual, &text).unwrap() * &upstream).sum();
                scorer.mapping_mut().projection_mut().weights[[i, k]] = orig;

                let numeric = (plus - minus) / (2.0 * h);
                assert_relative_eq!(grads.input_weights[[i, k]], numeric, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_invalid_scorer_config_is_rejected() {
        let mapping = TextMapping::with_seed(MappingConfig::new(4, 4), 1).unwrap();
        assert!(EpisodeScorer::new(ScorerConfig::new(0, 1), mapping.clone()).is_err());
        assert!(EpisodeScorer::new(ScorerConfig::new(5, 0), mapping).is_err());
    }
}
