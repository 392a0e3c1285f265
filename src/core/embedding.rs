//! core/embedding.rs — spectral embeddings of a symmetric affinity matrix.
//!
//! - diffusion map: eigenvectors of the random-walk operator, computed on its
//!   symmetric conjugate `D^-1/2 A D^-1/2`, normalized by the trivial vector.
//! - laplacian eigenmaps: smallest eigenvectors of the normalized Laplacian
//!   `I - D^-1/2 A D^-1/2`, i.e. the largest of the same conjugate.
//! - pca: principal axes of the column-centered affinity.
//!
//! All three reduce to "top-k eigenpairs of a symmetric matrix", solved either
//! densely or by seeded randomized subspace iteration.

use std::cmp::Ordering;

use nalgebra::{DMatrix, SymmetricEigen};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Approach {
    #[default]
    #[serde(rename = "dm", alias = "diffusion_map")]
    DiffusionMap,
    #[serde(rename = "le", alias = "laplacian_eigenmaps")]
    LaplacianEigenmaps,
    #[serde(rename = "pca")]
    Pca,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EigenSolver {
    #[default]
    Dense,
    /// Seeded subspace iteration; worth it once the matrix has thousands of rows.
    Randomized,
}

const OVERSAMPLE: usize = 10;
const POWER_ITERS: usize = 8;

/// Leading eigenpairs, values descending, vectors as columns.
#[derive(Debug, Clone)]
pub struct EigenPairs {
    pub values: Vec<f64>,
    pub vectors: DMatrix<f64>,
}

fn sorted_pairs(values: &[f64], vectors: &DMatrix<f64>, k: usize) -> EigenPairs {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    order.truncate(k);
    EigenPairs {
        values: order.iter().map(|&c| values[c]).collect(),
        vectors: DMatrix::from_fn(vectors.nrows(), order.len(), |i, c| vectors[(i, order[c])]),
    }
}

fn symmetrized(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

/// `k` largest (algebraic) eigenpairs of the symmetric matrix `s`.
pub fn top_eigenpairs(s: &DMatrix<f64>, k: usize, solver: EigenSolver, seed: u64) -> EigenPairs {
    let n = s.nrows();
    let k = k.min(n);
    match solver {
        EigenSolver::Dense => {
            let eig = SymmetricEigen::new(symmetrized(s));
            let values: Vec<f64> = eig.eigenvalues.iter().copied().collect();
            sorted_pairs(&values, &eig.eigenvectors, k)
        }
        EigenSolver::Randomized => {
            let l = (k + OVERSAMPLE).min(n);
            let mut rng = StdRng::seed_from_u64(seed);
            let omega = DMatrix::from_fn(n, l, |_, _| rng.random_range(-1.0..1.0));
            let mut q = (s * omega).qr().q();
            for _ in 0..POWER_ITERS {
                q = (s * &q).qr().q();
            }
            let b = symmetrized(&(q.transpose() * s * &q));
            let eig = SymmetricEigen::new(b);
            let vectors = &q * &eig.eigenvectors;
            let values: Vec<f64> = eig.eigenvalues.iter().copied().collect();
            sorted_pairs(&values, &vectors, k)
        }
    }
}

/// Gradients (n × k) and their eigenvalue weights.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub gradients: DMatrix<f64>,
    pub lambdas: Vec<f64>,
}

fn require_rows(n: usize, needed: usize, approach: &str) -> Result<()> {
    if n < needed {
        return Err(Error::Degenerate(format!(
            "{approach} needs at least {needed} parcels, got {n}"
        )));
    }
    Ok(())
}

fn inv_sqrt_degrees(a: &DMatrix<f64>) -> Vec<f64> {
    (0..a.nrows())
        .map(|i| {
            let d = a.row(i).sum();
            if d > 0.0 { 1.0 / d.sqrt() } else { 0.0 }
        })
        .collect()
}

fn conjugate(a: &DMatrix<f64>, w: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| w[i] * a[(i, j)] * w[j])
}

pub fn diffusion_map(
    affinity: &DMatrix<f64>,
    n_components: usize,
    alpha: f64,
    diffusion_time: f64,
    solver: EigenSolver,
    seed: u64,
) -> Result<Embedding> {
    let n = affinity.nrows();
    require_rows(n, n_components + 1, "diffusion map")?;

    let mut a = affinity.clone();
    if alpha > 0.0 {
        let d_alpha: Vec<f64> = (0..n)
            .map(|i| {
                let v = a.row(i).sum().powf(-alpha);
                if v.is_finite() { v } else { 0.0 }
            })
            .collect();
        a = conjugate(&a, &d_alpha);
    }

    let w = inv_sqrt_degrees(&a);
    let isolated = w.iter().filter(|&&v| v == 0.0).count();
    if isolated > 0 {
        warn!(isolated, "affinity has parcels without neighbours");
    }
    let s = conjugate(&a, &w);
    let pairs = top_eigenpairs(&s, n_components + 1, solver, seed);

    let u0: Vec<f64> = pairs.vectors.column(0).iter().copied().collect();
    let raw: Vec<f64> = pairs.values[1..].to_vec();
    if let Some(&l) = raw.iter().find(|&&l| l >= 1.0 - 1e-12) {
        return Err(Error::Degenerate(format!(
            "affinity graph is disconnected (non-trivial eigenvalue {l}); \
             lower gradients.sparsity"
        )));
    }
    let lambdas: Vec<f64> = raw
        .iter()
        .map(|&l| {
            if diffusion_time <= 0.0 {
                l / (1.0 - l)
            } else {
                l.powf(diffusion_time)
            }
        })
        .collect();
    debug!(?lambdas, "diffusion map eigenvalues");

    let gradients = DMatrix::from_fn(n, n_components, |i, c| {
        if u0[i] == 0.0 {
            0.0
        } else {
            pairs.vectors[(i, c + 1)] / u0[i] * lambdas[c]
        }
    });
    Ok(Embedding { gradients, lambdas })
}

pub fn laplacian_eigenmaps(
    affinity: &DMatrix<f64>,
    n_components: usize,
    solver: EigenSolver,
    seed: u64,
) -> Result<Embedding> {
    let n = affinity.nrows();
    require_rows(n, n_components + 1, "laplacian eigenmaps")?;

    let w = inv_sqrt_degrees(affinity);
    let s = conjugate(affinity, &w);
    let pairs = top_eigenpairs(&s, n_components + 1, solver, seed);
    let lambdas: Vec<f64> = pairs.values[1..].iter().map(|&v| 1.0 - v).collect();
    let gradients = DMatrix::from_fn(n, n_components, |i, c| pairs.vectors[(i, c + 1)] * w[i]);
    Ok(Embedding { gradients, lambdas })
}

pub fn pca(
    affinity: &DMatrix<f64>,
    n_components: usize,
    solver: EigenSolver,
    seed: u64,
) -> Result<Embedding> {
    let n = affinity.nrows();
    require_rows(n, n_components.max(2), "pca")?;

    let mut xc = affinity.clone();
    for j in 0..xc.ncols() {
        let mu = xc.column(j).mean();
        xc.column_mut(j).iter_mut().for_each(|v| *v -= mu);
    }
    let cov = (xc.transpose() * &xc) / (n as f64 - 1.0);
    let total = cov.trace();
    let pairs = top_eigenpairs(&cov, n_components, solver, seed);
    let lambdas = pairs
        .values
        .iter()
        .map(|&v| if total > 0.0 { v / total } else { 0.0 })
        .collect();
    Ok(Embedding {
        gradients: pairs.vectors,
        lambdas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn block_affinity() -> DMatrix<f64> {
        // two loosely coupled blocks of three parcels
        DMatrix::from_fn(6, 6, |i, j| {
            if i == j {
                0.0
            } else if (i < 3) == (j < 3) {
                0.9
            } else {
                0.1
            }
        })
    }

    #[test]
    fn dense_pairs_are_descending_and_orthonormal() {
        let s = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 5.0]);
        let p = top_eigenpairs(&s, 2, EigenSolver::Dense, 0);
        assert_abs_diff_eq!(p.values[0], 5.0, epsilon = 1e-10);
        assert_abs_diff_eq!(p.values[1], 3.0, epsilon = 1e-10);
        let gram = p.vectors.transpose() * &p.vectors;
        assert_abs_diff_eq!(gram, DMatrix::identity(2, 2), epsilon = 1e-10);
    }

    #[test]
    fn randomized_matches_dense_values() {
        let a = block_affinity();
        let dense = top_eigenpairs(&a, 2, EigenSolver::Dense, 0);
        let rand = top_eigenpairs(&a, 2, EigenSolver::Randomized, 7);
        for (d, r) in dense.values.iter().zip(&rand.values) {
            assert_abs_diff_eq!(d, r, epsilon = 1e-8);
        }
    }

    #[test]
    fn first_diffusion_gradient_separates_blocks() {
        let e = diffusion_map(&block_affinity(), 1, 0.5, 0.0, EigenSolver::Dense, 0).unwrap();
        let g: Vec<f64> = e.gradients.column(0).iter().copied().collect();
        assert!(g[..3].iter().all(|&v| v * g[0] > 0.0));
        assert!(g[3..].iter().all(|&v| v * g[0] < 0.0));
        assert!(e.lambdas[0] > 0.0);
    }

    #[test]
    fn laplacian_eigenvalues_are_nonnegative() {
        let e = laplacian_eigenmaps(&block_affinity(), 2, EigenSolver::Dense, 0).unwrap();
        assert_eq!(e.gradients.shape(), (6, 2));
        assert!(e.lambdas.iter().all(|&l| l > -1e-10));
    }

    #[test]
    fn pca_ratios_sum_to_at_most_one() {
        let e = pca(&block_affinity(), 3, EigenSolver::Dense, 0).unwrap();
        let total: f64 = e.lambdas.iter().sum();
        assert!(total <= 1.0 + 1e-10);
        assert!(e.lambdas[0] >= e.lambdas[1]);
    }

    #[test]
    fn disconnected_graph_is_degenerate() {
        let a = DMatrix::from_fn(6, 6, |i, j| {
            if i != j && (i < 3) == (j < 3) { 0.9 } else { 0.0 }
        });
        let err = diffusion_map(&a, 2, 0.5, 0.0, EigenSolver::Dense, 0);
        assert!(matches!(err, Err(Error::Degenerate(_))));
    }

    #[test]
    fn too_few_parcels_is_degenerate() {
        let err = diffusion_map(&DMatrix::zeros(3, 3), 3, 0.5, 0.0, EigenSolver::Dense, 0);
        assert!(matches!(err, Err(Error::Degenerate(_))));
    }
}
