//! core/affinity.rs — turn a connectome into a non-negative affinity matrix.
//!
//! Order of operations: per-row sparsification, kernel, clamp negatives.

use std::cmp::Ordering;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    /// Use the (sparsified) input as the affinity.
    #[default]
    None,
    Pearson,
    Spearman,
    Cosine,
    NormalizedAngle,
    Gaussian,
}

/// Keep the `ceil(keep_fraction * ncols)` largest entries of each row, zero
/// the rest. Ties keep the lower column index.
pub fn dominant_set(x: &DMatrix<f64>, keep_fraction: f64) -> DMatrix<f64> {
    let n_cols = x.ncols();
    if n_cols == 0 {
        return x.clone();
    }
    let k = ((keep_fraction * n_cols as f64).ceil() as usize).clamp(1, n_cols);
    let mut out = DMatrix::zeros(x.nrows(), n_cols);
    for i in 0..x.nrows() {
        let mut order: Vec<usize> = (0..n_cols).collect();
        order.sort_by(|&a, &b| {
            x[(i, b)]
                .partial_cmp(&x[(i, a)])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });
        for &j in order.iter().take(k) {
            out[(i, j)] = x[(i, j)];
        }
    }
    out
}

fn row(x: &DMatrix<f64>, i: usize) -> Vec<f64> {
    x.row(i).iter().copied().collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(p, q)| p * q).sum()
}

/// Pearson correlation between rows; constant rows correlate 0 with
/// everything, including themselves.
fn row_correlation(x: &DMatrix<f64>) -> DMatrix<f64> {
    let centered: Vec<Vec<f64>> = (0..x.nrows())
        .map(|i| {
            let r = row(x, i);
            let mu = r.iter().sum::<f64>() / r.len().max(1) as f64;
            r.into_iter().map(|v| v - mu).collect()
        })
        .collect();
    cosine(&centered)
}

fn cosine(rows: &[Vec<f64>]) -> DMatrix<f64> {
    let norms: Vec<f64> = rows.iter().map(|r| dot(r, r).sqrt()).collect();
    let n = rows.len();
    DMatrix::from_fn(n, n, |i, j| {
        let denom = norms[i] * norms[j];
        if denom > 0.0 {
            (dot(&rows[i], &rows[j]) / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    })
}

/// Average ranks (1-based) of each row's entries.
fn rank_rows(x: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(x.nrows(), x.ncols());
    for i in 0..x.nrows() {
        let r = row(x, i);
        let mut order: Vec<usize> = (0..r.len()).collect();
        order.sort_by(|&a, &b| r[a].partial_cmp(&r[b]).unwrap_or(Ordering::Equal));
        let mut start = 0;
        while start < order.len() {
            let mut end = start + 1;
            while end < order.len() && r[order[end]] == r[order[start]] {
                end += 1;
            }
            let avg = (start + end + 1) as f64 / 2.0;
            for &j in &order[start..end] {
                out[(i, j)] = avg;
            }
            start = end;
        }
    }
    out
}

fn gaussian(x: &DMatrix<f64>, gamma: f64) -> DMatrix<f64> {
    let rows: Vec<Vec<f64>> = (0..x.nrows()).map(|i| row(x, i)).collect();
    let n = rows.len();
    DMatrix::from_fn(n, n, |i, j| {
        let d2: f64 = rows[i]
            .iter()
            .zip(&rows[j])
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        (-gamma * d2).exp()
    })
}

/// Affinity between the rows of `x`.
///
/// `sparsity` in `[0, 1)` is the fraction of each row zeroed before the
/// kernel; `0` disables sparsification. `gamma` defaults to `1 / ncols` for
/// the Gaussian kernel.
pub fn compute_affinity(
    x: &DMatrix<f64>,
    kernel: Kernel,
    sparsity: f64,
    gamma: Option<f64>,
    non_negative: bool,
) -> DMatrix<f64> {
    let x = if sparsity > 0.0 {
        dominant_set(x, 1.0 - sparsity)
    } else {
        x.clone()
    };

    let mut a = match kernel {
        Kernel::None => x,
        Kernel::Pearson => row_correlation(&x),
        Kernel::Spearman => row_correlation(&rank_rows(&x)),
        Kernel::Cosine => cosine(&(0..x.nrows()).map(|i| row(&x, i)).collect::<Vec<_>>()),
        Kernel::NormalizedAngle => {
            let c = cosine(&(0..x.nrows()).map(|i| row(&x, i)).collect::<Vec<_>>());
            c.map(|v| 1.0 - v.acos() / std::f64::consts::PI)
        }
        Kernel::Gaussian => {
            let g = gamma.unwrap_or(1.0 / x.ncols().max(1) as f64);
            gaussian(&x, g)
        }
    };

    if non_negative {
        a.iter_mut().for_each(|v| {
            if *v < 0.0 {
                *v = 0.0;
            }
        });
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn dominant_set_keeps_top_fraction_per_row() {
        let x = DMatrix::from_row_slice(2, 4, &[0.1, 0.9, 0.5, 0.3, 4.0, 3.0, 2.0, 1.0]);
        let d = dominant_set(&x, 0.5);
        assert_eq!(d, DMatrix::from_row_slice(2, 4, &[0.0, 0.9, 0.5, 0.0, 4.0, 3.0, 0.0, 0.0]));
        // ceil keeps at least one entry
        let d = dominant_set(&x, 0.01);
        assert_eq!(d.row(0).iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn negatives_are_clamped() {
        let x = DMatrix::from_row_slice(2, 2, &[0.0, -0.4, -0.4, 0.0]);
        let a = compute_affinity(&x, Kernel::None, 0.0, None, true);
        assert!(a.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn spearman_ranks_average_ties() {
        let x = DMatrix::from_row_slice(1, 4, &[3.0, 1.0, 3.0, 2.0]);
        let r = rank_rows(&x);
        assert_eq!(r, DMatrix::from_row_slice(1, 4, &[3.5, 1.0, 3.5, 2.0]));
    }

    #[test]
    fn normalized_angle_of_identical_rows_is_one() {
        let x = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 2.0, 4.0, 6.0]);
        let a = compute_affinity(&x, Kernel::NormalizedAngle, 0.0, None, true);
        assert_abs_diff_eq!(a[(0, 1)], 1.0, epsilon = 1e-6);
        let g = compute_affinity(&x, Kernel::Gaussian, 0.0, Some(0.5), true);
        assert_abs_diff_eq!(g[(0, 0)], 1.0);
        assert_abs_diff_eq!(g[(0, 1)], (-0.5f64 * 14.0).exp(), epsilon = 1e-12);
    }
}
