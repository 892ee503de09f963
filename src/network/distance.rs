//! Pairwise distance and similarity primitives for episodic scoring

use ndarray::{Array1, Array2, Axis};

/// Floor applied to L2 norms before dividing, so zero rows stay finite.
pub const NORM_EPS: f64 = 1e-12;

/// Pairwise squared Euclidean distance between the rows of `x` (n, d) and
/// the rows of `y` (m, d), returned as an (n, m) matrix.
///
/// A feature-dimension mismatch is a programming error and panics.
pub fn squared_euclidean(x: &Array2<f64>, y: &Array2<f64>) -> Array2<f64> {
    assert_eq!(
        x.ncols(),
        y.ncols(),
        "pairwise distance requires matching feature dimensions"
    );

    let mut out = Array2::zeros((x.nrows(), y.nrows()));
    for (i, xi) in x.rows().into_iter().enumerate() {
        for (j, yj) in y.rows().into_iter().enumerate() {
            let diff = &xi - &yj;
            out[[i, j]] = diff.dot(&diff);
        }
    }
    out
}

/// Row-by-row inner products: `x · yᵀ`, shape (n, m).
///
/// This is cosine similarity only when both inputs are already
/// row-unit-normalized; the caller owns that precondition (see
/// [`l2_normalize`]) and nothing is normalized here.
pub fn inner_product(x: &Array2<f64>, y: &Array2<f64>) -> Array2<f64> {
    assert_eq!(
        x.ncols(),
        y.ncols(),
        "inner product requires matching feature dimensions"
    );
    x.dot(&y.t())
}

/// L2-normalize every row of `x`, dividing by `max(norm, eps)`.
///
/// Returns the normalized matrix together with the floored norms, which the
/// backward pass reuses. Zero rows stay zero.
pub fn l2_normalize(x: &Array2<f64>, eps: f64) -> (Array2<f64>, Array1<f64>) {
    let norms = x.map_axis(Axis(1), |row| row.dot(&row).sqrt().max(eps));
    let normalized = x / &norms.view().insert_axis(Axis(1));
    (normalized, norms)
}

/// Gradient of [`squared_euclidean`] with respect to `x`, given the upstream
/// gradient on the (n, m) distance matrix: `2 * (rowsum(g) ⊙ x - g · y)`.
pub fn squared_euclidean_grad_lhs(
    upstream: &Array2<f64>,
    x: &Array2<f64>,
    y: &Array2<f64>,
) -> Array2<f64> {
    let row_sums = upstream.sum_axis(Axis(1));
    let scaled = x * &row_sums.insert_axis(Axis(1));
    (scaled - upstream.dot(y)) * 2.0
}

/// Gradient through [`l2_normalize`]: per row `(g - x̂ (x̂ · g)) / norm`,
/// where `norm` is the floored norm returned by the forward pass.
pub fn l2_normalize_grad(
    normalized: &Array2<f64>,
    norms: &Array1<f64>,
    upstream: &Array2<f64>,
) -> Array2<f64> {
    let mut grad = Array2::zeros(normalized.raw_dim());
    for i in 0..normalized.nrows() {
        let xhat = normalized.row(i);
        let g = upstream.row(i);
        let dot = xhat.dot(&g);
        let row = (&g - &(&xhat * dot)) / norms[i];
        grad.row_mut(i).assign(&row);
    }
    grad
}
