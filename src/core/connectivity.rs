//! core/connectivity.rs — parcel-by-parcel functional connectivity.
//!
//! Parcels are variables and timepoints are observations. The diagonal of
//! every `Connectome` is zero: it is overwritten right after estimation and
//! again after loading from disk.

use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::stats::zscore_rows;
use crate::error::{Error, Result};
use crate::io::npy;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceEstimator {
    /// Plain Pearson correlation.
    #[default]
    Empirical,
    /// Ledoit–Wolf shrunk covariance on standardized signals, then
    /// normalized to correlation.
    LedoitWolf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Connectome {
    pub matrix: DMatrix<f64>,
}

fn center_rows(m: &mut DMatrix<f64>) {
    for i in 0..m.nrows() {
        let mu = m.row(i).mean();
        for t in 0..m.ncols() {
            m[(i, t)] -= mu;
        }
    }
}

/// Normalize a covariance matrix to correlation. Variables with zero variance
/// correlate 0 with everything.
fn cov_to_corr(cov: &DMatrix<f64>) -> DMatrix<f64> {
    let n = cov.nrows();
    let sd: Vec<f64> = (0..n).map(|i| cov[(i, i)].max(0.0).sqrt()).collect();
    DMatrix::from_fn(n, n, |i, j| {
        let denom = sd[i] * sd[j];
        if denom > 0.0 {
            (cov[(i, j)] / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    })
}

/// Shrinkage coefficient of the Ledoit–Wolf estimator for centered data
/// laid out features × samples.
pub fn ledoit_wolf_shrinkage(x: &DMatrix<f64>) -> f64 {
    let n_features = x.nrows() as f64;
    let n_samples = x.ncols() as f64;
    if x.nrows() == 0 || x.ncols() == 0 {
        return 0.0;
    }
    let emp_cov = (x * x.transpose()) / n_samples;
    let x2 = x.component_mul(x);
    let emp_cov_trace: Vec<f64> = (0..x.nrows()).map(|i| x2.row(i).sum() / n_samples).collect();
    let trace_sum: f64 = emp_cov_trace.iter().sum();
    let mu = trace_sum / n_features;

    let beta_: f64 = (0..x.ncols()).map(|t| x2.column(t).sum().powi(2)).sum();
    let delta_: f64 = emp_cov.iter().map(|v| v * v).sum();

    let beta = (beta_ / n_samples - delta_) / (n_features * n_samples);
    let delta = (delta_ - 2.0 * mu * trace_sum + n_features * mu * mu) / n_features;
    let beta = beta.min(delta);
    if beta == 0.0 || delta == 0.0 { 0.0 } else { beta / delta }
}

impl Connectome {
    /// Wrap an existing square matrix; the diagonal is zeroed.
    pub fn from_matrix(matrix: DMatrix<f64>) -> Result<Self> {
        if !matrix.is_square() {
            return Err(Error::shape("connectome columns", matrix.nrows(), matrix.ncols()));
        }
        let mut c = Self { matrix };
        c.zero_diagonal();
        Ok(c)
    }

    /// Correlation between the rows of `parcel_ts` (parcels × timepoints).
    pub fn estimate(parcel_ts: &DMatrix<f64>, estimator: CovarianceEstimator) -> Result<Self> {
        if parcel_ts.ncols() < 2 {
            return Err(Error::Degenerate(format!(
                "correlation needs at least 2 timepoints, got {}",
                parcel_ts.ncols()
            )));
        }
        if parcel_ts.iter().any(|v| !v.is_finite()) {
            return Err(Error::Degenerate(
                "parcel timeseries contains non-finite values".into(),
            ));
        }
        let n_time = parcel_ts.ncols() as f64;
        let cov = match estimator {
            CovarianceEstimator::Empirical => {
                let mut x = parcel_ts.clone();
                center_rows(&mut x);
                (&x * x.transpose()) / n_time
            }
            CovarianceEstimator::LedoitWolf => {
                let mut x = parcel_ts.clone();
                zscore_rows(&mut x);
                center_rows(&mut x);
                let shrinkage = ledoit_wolf_shrinkage(&x);
                let emp = (&x * x.transpose()) / n_time;
                let mu = emp.trace() / emp.nrows() as f64;
                debug!(shrinkage, mu, "ledoit-wolf covariance");
                let mut shrunk = emp * (1.0 - shrinkage);
                for i in 0..shrunk.nrows() {
                    shrunk[(i, i)] += shrinkage * mu;
                }
                shrunk
            }
        };
        Self::from_matrix(cov_to_corr(&cov))
    }

    #[inline]
    pub fn n_parcels(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn zero_diagonal(&mut self) {
        self.matrix.fill_diagonal(0.0);
    }

    pub fn save_npy(&self, path: &Path) -> Result<()> {
        npy::write_matrix(path, &self.matrix)
    }

    pub fn load_npy(path: &Path) -> Result<Self> {
        let matrix = npy::read(path)?.into_matrix()?;
        Self::from_matrix(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample_ts() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            3,
            5,
            &[
                1.0, 2.0, 3.0, 4.0, 5.0, //
                2.0, 4.1, 6.0, 7.9, 10.0, //
                5.0, 3.0, 4.0, 1.0, 2.0,
            ],
        )
    }

    #[test]
    fn pearson_is_symmetric_bounded_with_zero_diagonal() {
        let c = Connectome::estimate(&sample_ts(), CovarianceEstimator::Empirical).unwrap();
        for i in 0..3 {
            assert_eq!(c.matrix[(i, i)], 0.0);
            for j in 0..3 {
                assert_abs_diff_eq!(c.matrix[(i, j)], c.matrix[(j, i)], epsilon = 1e-12);
                assert!(c.matrix[(i, j)].abs() <= 1.0);
            }
        }
        assert!(c.matrix[(0, 1)] > 0.99);
        assert!(c.matrix[(0, 2)] < -0.5);
    }

    #[test]
    fn constant_parcel_correlates_zero() {
        let mut ts = sample_ts();
        for t in 0..5 {
            ts[(2, t)] = 0.0;
        }
        let c = Connectome::estimate(&ts, CovarianceEstimator::Empirical).unwrap();
        assert!(c.matrix.row(2).iter().all(|&v| v == 0.0));
        assert!(c.matrix.column(2).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn ledoit_wolf_shrinks_toward_zero() {
        let emp = Connectome::estimate(&sample_ts(), CovarianceEstimator::Empirical).unwrap();
        let lw = Connectome::estimate(&sample_ts(), CovarianceEstimator::LedoitWolf).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert!(lw.matrix[(i, j)].abs() <= emp.matrix[(i, j)].abs() + 1e-12);
            }
        }
    }

    #[test]
    fn non_square_matrix_is_rejected() {
        assert!(Connectome::from_matrix(DMatrix::zeros(2, 3)).is_err());
    }
}
