//! Episode container for N-way few-shot tasks
//!
//! Episodic samplers live outside this crate; the container only validates
//! that the tensors a sampler hands over agree with each other, and it makes
//! the class alignment behind the score matrix explicit instead of leaving
//! it to array position folklore.

use ndarray::{s, Array2, Array3};

use crate::error::{Result, TextMappingError};

/// One N-way episode: per-class visual shots plus per-class text embeddings,
/// with an explicit record of which real class each row describes.
#[derive(Debug, Clone)]
pub struct Episode {
    /// Visual features (n_way, n_shots, visual_dim)
    pub visual: Array3<f64>,
    /// Text embeddings (n_way, n_shots, text_dim); every shot of a class
    /// carries the same class embedding
    pub text: Array3<f64>,
    /// Real class identifier behind each row. Row `i` of the score matrix
    /// describes `class_ids[i]` on both the text and the prototype side.
    pub class_ids: Vec<usize>,
}

impl Episode {
    /// Validated constructor: the tensors must agree on class and shot
    /// counts, and `class_ids` must name every row exactly once.
    pub fn new(visual: Array3<f64>, text: Array3<f64>, class_ids: Vec<usize>) -> Result<Self> {
        let (v_way, v_shots, _) = visual.dim();
        let (t_way, t_shots, _) = text.dim();

        if v_way == 0 || v_shots == 0 {
            return Err(TextMappingError::InvalidEpisode(
                "episodes need at least one class and one shot".to_string(),
            ));
        }
        if v_way != t_way {
            return Err(TextMappingError::InvalidEpisode(format!(
                "visual tensor carries {v_way} classes but text tensor carries {t_way}"
            )));
        }
        if v_shots != t_shots {
            return Err(TextMappingError::InvalidEpisode(format!(
                "visual tensor carries {v_shots} shots per class but text tensor carries {t_shots}"
            )));
        }
        if class_ids.len() != v_way {
            return Err(TextMappingError::InvalidEpisode(format!(
                "{} class ids supplied for {v_way} classes",
                class_ids.len()
            )));
        }
        let mut seen = class_ids.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != class_ids.len() {
            return Err(TextMappingError::InvalidEpisode(
                "class ids must be distinct within an episode".to_string(),
            ));
        }

        Ok(Self {
            visual,
            text,
            class_ids,
        })
    }

    /// Build an episode from one text embedding per class, replicated across
    /// the shot axis the way episodic data pipelines lay text out.
    pub fn with_shared_text(
        visual: Array3<f64>,
        class_text: Array2<f64>,
        class_ids: Vec<usize>,
    ) -> Result<Self> {
        let (n_way, n_shots, _) = visual.dim();
        if class_text.nrows() != n_way {
            return Err(TextMappingError::InvalidEpisode(format!(
                "{} text rows supplied for {n_way} classes",
                class_text.nrows()
            )));
        }

        let mut text = Array3::zeros((n_way, n_shots, class_text.ncols()));
        for class in 0..n_way {
            let row = class_text.row(class);
            for shot in 0..n_shots {
                text.slice_mut(s![class, shot, ..]).assign(&row);
            }
        }

        Self::new(visual, text, class_ids)
    }

    pub fn n_way(&self) -> usize {
        self.visual.dim().0
    }

    pub fn n_shots(&self) -> usize {
        self.visual.dim().1
    }

    pub fn visual_dim(&self) -> usize {
        self.visual.dim().2
    }

    pub fn text_dim(&self) -> usize {
        self.text.dim().2
    }

    /// Ground-truth column for every score-matrix row: row `i` targets
    /// column `i`, because construction pins text row `i` and prototype row
    /// `i` to the same entry of `class_ids`.
    pub fn aligned_targets(&self) -> Vec<usize> {
        (0..self.n_way()).collect()
    }
}
