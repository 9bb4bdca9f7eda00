//! Gower centering of squared distances.

use crate::data::DistanceMatrix;
use nalgebra::DMatrix;

/// Gower-centered Gram matrix `G` of a distance matrix.
///
/// `A = -d²/2` element-wise, then double-centering:
/// `G = (I - J/n) A (I - J/n)`. The trace of `G` is the total sum of
/// squares of the partitioning, and `G` is all the engine needs per
/// permutation — arrangements only reindex it, they never re-center.
pub fn gower_center(dist: &DistanceMatrix) -> DMatrix<f64> {
    let n = dist.n_samples();
    let mut a = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            let d = dist.get(i, j);
            a[(i, j)] = -0.5 * d * d;
        }
    }

    let mut row_means = vec![0.0; n];
    let mut col_means = vec![0.0; n];
    let mut grand = 0.0;
    for i in 0..n {
        for j in 0..n {
            row_means[i] += a[(i, j)];
            col_means[j] += a[(i, j)];
            grand += a[(i, j)];
        }
    }
    for m in row_means.iter_mut().chain(col_means.iter_mut()) {
        *m /= n as f64;
    }
    grand /= (n * n) as f64;

    let mut g = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            g[(i, j)] = a[(i, j)] - row_means[i] - col_means[j] + grand;
        }
    }
    g
}

/// Total sum of squares: the trace of the Gower-centered matrix.
pub fn total_ss(g: &DMatrix<f64>) -> f64 {
    g.trace()
}
