//! core/gradient.rs — connectivity gradients of a masked connectome.
//!
//! `GradientMaps::fit` chains affinity → symmetrization → embedding → sign
//! normalization. Identical input and parameters give bit-identical output.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::affinity::{Kernel, compute_affinity};
use crate::core::embedding::{self, Approach, EigenSolver, Embedding};
use crate::error::{Error, Result};

/// Embedding settings.
///
/// `sparsity` zeroes that fraction of every row before the kernel. At the
/// default 0.9 a connectome with few parcels keeps one or two neighbours per
/// row and the affinity graph can split into components; fitting then fails
/// with `Error::Degenerate` instead of returning divergent gradients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GradientParams {
    #[serde(default = "GradientParams::default_n_components")]
    pub n_components: usize,
    #[serde(default)]
    pub random_state: u64,
    #[serde(default)]
    pub approach: Approach,
    #[serde(default)]
    pub kernel: Kernel,
    #[serde(default = "GradientParams::default_sparsity")]
    pub sparsity: f64,
    #[serde(default)]
    pub gamma: Option<f64>,
    #[serde(default = "GradientParams::default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub diffusion_time: f64,
    #[serde(default)]
    pub solver: EigenSolver,
}

impl GradientParams {
    fn default_n_components() -> usize {
        5
    }
    fn default_sparsity() -> f64 {
        0.9
    }
    fn default_alpha() -> f64 {
        0.5
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(Error::Config("gradients.n_components must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.sparsity) {
            return Err(Error::Config(format!(
                "gradients.sparsity must be in [0, 1), got {}",
                self.sparsity
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::Config(format!(
                "gradients.alpha must be in [0, 1], got {}",
                self.alpha
            )));
        }
        if let Some(g) = self.gamma {
            if !(g > 0.0) {
                return Err(Error::Config(format!("gradients.gamma must be positive, got {g}")));
            }
        }
        Ok(())
    }
}

impl Default for GradientParams {
    fn default() -> Self {
        Self {
            n_components: Self::default_n_components(),
            random_state: 0,
            approach: Approach::default(),
            kernel: Kernel::default(),
            sparsity: Self::default_sparsity(),
            gamma: None,
            alpha: Self::default_alpha(),
            diffusion_time: 0.0,
            solver: EigenSolver::default(),
        }
    }
}

/// Fitted gradients: one row per input parcel, one column per component.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientMaps {
    pub gradients: DMatrix<f64>,
    pub lambdas: Vec<f64>,
    pub params: GradientParams,
}

fn is_symmetric(m: &DMatrix<f64>, tol: f64) -> bool {
    let n = m.nrows();
    (0..n).all(|i| (i + 1..n).all(|j| (m[(i, j)] - m[(j, i)]).abs() <= tol))
}

/// Flip each column so its largest-magnitude entry is positive.
pub fn deterministic_sign_flip(m: &mut DMatrix<f64>) {
    for c in 0..m.ncols() {
        let mut best = 0.0f64;
        let mut sign = 1.0;
        for v in m.column(c).iter() {
            if v.abs() > best {
                best = v.abs();
                sign = v.signum();
            }
        }
        if sign < 0.0 {
            m.column_mut(c).iter_mut().for_each(|v| *v = -*v);
        }
    }
}

impl GradientMaps {
    pub fn fit(matrix: &DMatrix<f64>, params: &GradientParams) -> Result<Self> {
        params.validate()?;
        if !matrix.is_square() {
            return Err(Error::shape("gradient input columns", matrix.nrows(), matrix.ncols()));
        }

        let mut affinity = compute_affinity(
            matrix,
            params.kernel,
            params.sparsity,
            params.gamma,
            true,
        );
        if !is_symmetric(&affinity, 1e-10) {
            affinity = (&affinity + affinity.transpose()) * 0.5;
        }

        let k = params.n_components;
        let seed = params.random_state;
        let Embedding {
            mut gradients,
            lambdas,
        } = match params.approach {
            Approach::DiffusionMap => embedding::diffusion_map(
                &affinity,
                k,
                params.alpha,
                params.diffusion_time,
                params.solver,
                seed,
            )?,
            Approach::LaplacianEigenmaps => {
                embedding::laplacian_eigenmaps(&affinity, k, params.solver, seed)?
            }
            Approach::Pca => embedding::pca(&affinity, k, params.solver, seed)?,
        };
        deterministic_sign_flip(&mut gradients);

        if gradients.iter().any(|v| !v.is_finite()) {
            return Err(Error::Degenerate(
                "gradients contain non-finite values".into(),
            ));
        }
        info!(
            n_parcels = gradients.nrows(),
            n_components = gradients.ncols(),
            approach = ?params.approach,
            "fitted gradients"
        );
        Ok(Self {
            gradients,
            lambdas,
            params: *params,
        })
    }

    #[inline]
    pub fn n_components(&self) -> usize {
        self.gradients.ncols()
    }

    pub fn component(&self, c: usize) -> Vec<f64> {
        self.gradients.column(c).iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_flip_makes_peak_positive() {
        let mut m = DMatrix::from_row_slice(3, 2, &[0.1, 2.0, -0.9, 0.5, 0.3, -0.1]);
        deterministic_sign_flip(&mut m);
        assert_eq!(m.column(0).iter().copied().collect::<Vec<_>>(), vec![-0.1, 0.9, -0.3]);
        assert_eq!(m[(0, 1)], 2.0);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let m = DMatrix::zeros(4, 4);
        let params = GradientParams {
            sparsity: 1.0,
            ..GradientParams::default()
        };
        assert!(matches!(GradientMaps::fit(&m, &params), Err(Error::Config(_))));
    }

    #[test]
    fn split_affinity_graph_is_degenerate() {
        // negative cross-block entries are clamped, leaving two components
        let m = DMatrix::from_fn(8, 8, |i, j| {
            if i == j {
                0.0
            } else if (i / 4) == (j / 4) {
                0.7
            } else {
                -0.1
            }
        });
        let params = GradientParams {
            n_components: 3,
            sparsity: 0.0,
            ..GradientParams::default()
        };
        assert!(matches!(GradientMaps::fit(&m, &params), Err(Error::Degenerate(_))));
    }

    #[test]
    fn output_has_one_row_per_parcel() {
        let m = DMatrix::from_fn(8, 8, |i, j| {
            if i == j {
                0.0
            } else {
                0.2 + 0.5 * (((i / 4) == (j / 4)) as u8 as f64)
            }
        });
        let params = GradientParams {
            n_components: 3,
            sparsity: 0.0,
            ..GradientParams::default()
        };
        let gm = GradientMaps::fit(&m, &params).unwrap();
        assert_eq!(gm.gradients.shape(), (8, 3));
        assert_eq!(gm.lambdas.len(), 3);
    }
}
