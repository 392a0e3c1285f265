//! File input and output. Nothing here knows about the pipeline order.

pub mod atlas;
pub mod freesurfer;
pub mod npy;
pub mod surface;
pub mod table;

use std::path::Path;

use nalgebra::DMatrix;

use crate::error::{Error, Result};

pub(crate) fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exts.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Row-major `data` of the given shape as a matrix. Singleton axes are
/// dropped when there are more than two; 1-D data becomes one column.
pub fn squeezed_matrix(shape: &[usize], data: &[f64]) -> Result<DMatrix<f64>> {
    let squeezed: Vec<usize>;
    let shape = if shape.len() > 2 {
        squeezed = shape.iter().copied().filter(|&d| d != 1).collect();
        squeezed.as_slice()
    } else {
        shape
    };
    let (rows, cols) = match shape {
        [] => (1, 1),
        [n] => (*n, 1),
        [r, c] => (*r, *c),
        other => {
            return Err(Error::Npy(format!(
                "expected at most 2 non-singleton axes, got shape {other:?}"
            )));
        }
    };
    if rows * cols != data.len() {
        return Err(Error::shape("array elements", rows * cols, data.len()));
    }
    Ok(DMatrix::from_row_slice(rows, cols, data))
}

/// Read a 2-D array from `.npy`, FreeSurfer `.mgh`/`.mgz` (singleton axes
/// squeezed) or a text table.
pub fn read_matrix(path: &Path) -> Result<DMatrix<f64>> {
    if has_extension(path, &["npy"]) {
        npy::read(path)?.into_matrix()
    } else if has_extension(path, &["mgh", "mgz"]) {
        freesurfer::read_mgh_matrix(path)
    } else {
        table::read_table(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_axes_squeeze_to_vertices_by_frames() {
        // vertices × 1 × 1 × frames, as surface-sampled MGH data is stored
        let data: Vec<f64> = (0..6).map(f64::from).collect();
        let m = squeezed_matrix(&[3, 1, 1, 2], &data).unwrap();
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m[(2, 1)], 5.0);
        assert_eq!(squeezed_matrix(&[4], &data[..4]).unwrap().shape(), (4, 1));
        assert!(squeezed_matrix(&[2, 2, 2], &data).is_err());
    }

    #[test]
    fn extension_match_ignores_case() {
        assert!(has_extension(Path::new("lh.ts.MGZ"), &["mgh", "mgz"]));
        assert!(!has_extension(Path::new("lh.pial"), &["txt"]));
    }
}
