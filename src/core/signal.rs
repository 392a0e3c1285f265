//! core/signal.rs — confound regression for vertex timeseries.
//!
//! Signals are stored vertices × timepoints, confounds timepoints × regressors
//! (the layout of the text table they are read from).

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::stats::{EPS, detrend_rows, zscore_rows};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CleanParams {
    #[serde(default = "CleanParams::default_true")]
    pub detrend: bool,
    #[serde(default = "CleanParams::default_true")]
    pub standardize: bool,
    #[serde(default = "CleanParams::default_true")]
    pub standardize_confounds: bool,
}

impl CleanParams {
    fn default_true() -> bool {
        true
    }
}

impl Default for CleanParams {
    fn default() -> Self {
        Self {
            detrend: true,
            standardize: true,
            standardize_confounds: true,
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// Orthonormal basis of the span of `rows` (modified Gram–Schmidt with one
/// re-orthogonalization pass). Rows that are numerically dependent on the
/// ones before them are dropped.
pub fn orthonormal_basis(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(rows.len());
    for v in rows {
        let scale = dot(v, v).sqrt().max(1.0);
        let mut w = v.clone();
        for _ in 0..2 {
            for q in &basis {
                let proj = dot(q, &w);
                axpy(-proj, q, &mut w);
            }
        }
        let norm = dot(&w, &w).sqrt();
        if norm > 100.0 * EPS * scale {
            w.iter_mut().for_each(|x| *x /= norm);
            basis.push(w);
        }
    }
    basis
}

/// Detrend, regress out confounds, and standardize each vertex timeseries.
///
/// Confounds must be finite; a NaN anywhere in the table is an error.
pub fn clean(
    timeseries: &DMatrix<f64>,
    confounds: Option<&DMatrix<f64>>,
    params: &CleanParams,
) -> Result<DMatrix<f64>> {
    let n_time = timeseries.ncols();
    let mut signals = timeseries.clone();
    if params.detrend {
        detrend_rows(&mut signals);
    }

    if let Some(confounds) = confounds {
        if confounds.nrows() != n_time {
            return Err(Error::shape("confound timepoints", n_time, confounds.nrows()));
        }
        for c in 0..confounds.ncols() {
            if let Some(t) = (0..n_time).find(|&t| !confounds[(t, c)].is_finite()) {
                return Err(Error::Degenerate(format!(
                    "confound column {c} has non-finite value {} at timepoint {t}",
                    confounds[(t, c)]
                )));
            }
        }
        let mut conf = confounds.transpose();
        if params.standardize_confounds {
            if params.detrend {
                detrend_rows(&mut conf);
            }
            zscore_rows(&mut conf);
        }
        let rows: Vec<Vec<f64>> = (0..conf.nrows())
            .map(|i| conf.row(i).iter().copied().collect())
            .collect();
        let basis = orthonormal_basis(&rows);
        if basis.len() < rows.len() {
            warn!(
                kept = basis.len(),
                total = rows.len(),
                "confounds are rank deficient; dependent columns dropped"
            );
        }
        debug!(n_vertices = signals.nrows(), n_time, n_basis = basis.len(), "regressing confounds");

        for i in 0..signals.nrows() {
            let mut x: Vec<f64> = signals.row(i).iter().copied().collect();
            for q in &basis {
                let proj = dot(q, &x);
                axpy(-proj, q, &mut x);
            }
            for (t, v) in x.into_iter().enumerate() {
                signals[(i, t)] = v;
            }
        }
    }

    if params.standardize {
        zscore_rows(&mut signals);
    }
    Ok(signals)
}
