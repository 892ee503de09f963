//! Loss and accuracy primitives for the episodic drivers

use ndarray::Array2;

/// Mean softmax cross-entropy of each score row against its target column,
/// together with the gradient on the scores: `(softmax - onehot) / n`.
///
/// Rows are stabilized by max subtraction before exponentiation. A
/// row/target count mismatch or an out-of-range target is a programming
/// error and panics.
pub fn softmax_cross_entropy(scores: &Array2<f64>, targets: &[usize]) -> (f64, Array2<f64>) {
    let n = scores.nrows();
    assert_eq!(n, targets.len(), "one target per score row");
    let nf = n as f64;

    let mut grad = Array2::zeros(scores.raw_dim());
    let mut loss = 0.0;
    for (i, row) in scores.rows().into_iter().enumerate() {
        let target = targets[i];
        assert!(target < row.len(), "target column out of range");

        let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let log_sum_exp = max + row.mapv(|v| (v - max).exp()).sum().ln();
        loss += log_sum_exp - row[target];

        for (j, &s) in row.iter().enumerate() {
            grad[[i, j]] = (s - log_sum_exp).exp() / nf;
        }
        grad[[i, target]] -= 1.0 / nf;
    }

    (loss / nf, grad)
}

/// Fraction of rows whose highest score lands on the target column.
pub fn top1_accuracy(scores: &Array2<f64>, targets: &[usize]) -> f64 {
    assert_eq!(scores.nrows(), targets.len(), "one target per score row");

    let mut correct = 0usize;
    for (i, row) in scores.rows().into_iter().enumerate() {
        let predicted = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(j, _)| j)
            .unwrap_or(0);
        if predicted == targets[i] {
            correct += 1;
        }
    }

    correct as f64 / scores.nrows() as f64
}
