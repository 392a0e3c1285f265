//! core/masking.rs — selecting usable parcels from a connectome.
//!
//! Two masks exist and are always computed separately:
//! the display mask keeps rows whose std is above a threshold, the
//! embedding mask keeps rows whose std is not exactly zero.

use nalgebra::DMatrix;

use crate::core::stats::row_std;

pub const DEFAULT_DISPLAY_STD_THRESHOLD: f64 = 0.1;

/// Sorted row indices into a square matrix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParcelMask {
    pub indices: Vec<usize>,
}

impl ParcelMask {
    /// Rows whose standard deviation is strictly greater than `threshold`.
    pub fn display(matrix: &DMatrix<f64>, threshold: f64) -> Self {
        let indices = row_std(matrix)
            .into_iter()
            .enumerate()
            .filter(|&(_, sd)| sd > threshold)
            .map(|(i, _)| i)
            .collect();
        Self { indices }
    }

    /// Rows whose standard deviation is not exactly zero.
    #[allow(clippy::float_cmp)]
    pub fn embedding(matrix: &DMatrix<f64>) -> Self {
        let indices = row_std(matrix)
            .into_iter()
            .enumerate()
            .filter(|&(_, sd)| sd != 0.0)
            .map(|(i, _)| i)
            .collect();
        Self { indices }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Rows and columns of `matrix` restricted to the mask.
    pub fn submatrix(&self, matrix: &DMatrix<f64>) -> DMatrix<f64> {
        let n = self.indices.len();
        DMatrix::from_fn(n, n, |i, j| matrix[(self.indices[i], self.indices[j])])
    }

    /// Pick the masked entries of a per-parcel sequence.
    pub fn select<T: Clone>(&self, items: &[T]) -> Vec<T> {
        self.indices.iter().map(|&i| items[i].clone()).collect()
    }
}
