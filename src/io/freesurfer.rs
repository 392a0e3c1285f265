//! io/freesurfer.rs — FreeSurfer surfaces, MGH/MGZ data and annotations.
//!
//! `neuroformats` does the decoding; this module turns its flat buffers into
//! meshes, vertex × frame matrices and labelings.

use std::collections::BTreeMap;
use std::path::Path;

use nalgebra::DMatrix;

use crate::core::parcellation::{BACKGROUND_ID, Labeling};
use crate::error::{Error, Result};
use crate::io::squeezed_matrix;
use crate::io::surface::SurfaceMesh;

fn format_err(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Format {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Mesh from flat `x y z` coordinates and flat triangle indices.
pub fn mesh_from_flat(vertices: &[f32], faces: &[i32]) -> Result<SurfaceMesh> {
    if vertices.len() % 3 != 0 || faces.len() % 3 != 0 {
        return Err(Error::Degenerate(format!(
            "mesh buffers of {} coordinates and {} indices are not triplets",
            vertices.len(),
            faces.len()
        )));
    }
    let verts = vertices
        .chunks_exact(3)
        .map(|c| [f64::from(c[0]), f64::from(c[1]), f64::from(c[2])])
        .collect();
    let mut tris = Vec::with_capacity(faces.len() / 3);
    for face in faces.chunks_exact(3) {
        let mut tri = [0usize; 3];
        for (slot, &v) in tri.iter_mut().zip(face) {
            *slot = usize::try_from(v)
                .map_err(|_| Error::Degenerate(format!("negative vertex index {v}")))?;
        }
        tris.push(tri);
    }
    SurfaceMesh::new(verts, tris)
}

/// Binary FreeSurfer surface (`lh.pial`, `rh.white`, ...).
pub fn read_surface(path: &Path) -> Result<SurfaceMesh> {
    let surf = neuroformats::read_surf(path).map_err(|e| format_err(path, e))?;
    mesh_from_flat(&surf.mesh.vertices, &surf.mesh.faces)
}

/// Surface-sampled MGH/MGZ data (`vertices × 1 × 1 × frames`) as
/// vertices × frames.
pub fn read_mgh_matrix(path: &Path) -> Result<DMatrix<f64>> {
    let mgh = neuroformats::read_mgh(path).map_err(|e| format_err(path, e))?;
    let data = &mgh.data;
    let (shape, values): (Vec<usize>, Vec<f64>) = if let Some(a) = &data.mri_float {
        (a.shape().to_vec(), a.iter().map(|&v| f64::from(v)).collect())
    } else if let Some(a) = &data.mri_int {
        (a.shape().to_vec(), a.iter().map(|&v| f64::from(v)).collect())
    } else if let Some(a) = &data.mri_short {
        (a.shape().to_vec(), a.iter().map(|&v| f64::from(v)).collect())
    } else if let Some(a) = &data.mri_uchar {
        (a.shape().to_vec(), a.iter().map(|&v| f64::from(v)).collect())
    } else {
        return Err(format_err(path, "file holds no voxel data"));
    };
    squeezed_matrix(&shape, &values)
}

/// Colortable index of every vertex. `vertex_indices[k]` carries the color
/// code `codes[k]`; codes missing from `table` (and unlisted vertices) map to
/// the background id.
pub fn labeling_from_annot(vertex_indices: &[i32], codes: &[i32], table: &[i32]) -> Result<Vec<i32>> {
    if vertex_indices.len() != codes.len() {
        return Err(Error::shape(
            "annotation codes vs vertices",
            vertex_indices.len(),
            codes.len(),
        ));
    }
    let lookup: BTreeMap<i32, i32> = table
        .iter()
        .enumerate()
        .map(|(i, &code)| (code, i as i32))
        .rev()
        .collect();
    let n = vertex_indices.len();
    let mut ids = vec![BACKGROUND_ID; n];
    for (&v, code) in vertex_indices.iter().zip(codes) {
        let slot = usize::try_from(v)
            .ok()
            .filter(|&v| v < n)
            .ok_or_else(|| Error::Atlas(format!("annotation vertex index {v} out of range")))?;
        ids[slot] = lookup.get(code).copied().unwrap_or(BACKGROUND_ID);
    }
    Ok(ids)
}

/// Labeling and region names of a FreeSurfer `.annot` file.
pub fn read_annotation(path: &Path) -> Result<(Labeling, Vec<String>)> {
    let annot = neuroformats::read_annot(path).map_err(|e| format_err(path, e))?;
    let table = &annot.colortable;
    let codes: Vec<i32> = table.regions.iter().map(|r| r.label).collect();
    let names: Vec<String> = table.regions.iter().map(|r| r.name.clone()).collect();
    let ids = labeling_from_annot(&annot.vertex_indices, &annot.vertex_labels, &codes)?;
    Ok((Labeling::new(ids), names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_buffers_become_triangles() {
        let mesh = mesh_from_flat(
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 1, 2],
        )
        .unwrap();
        assert_eq!(mesh.n_vertices(), 3);
        assert_eq!(mesh.vertices[1], [1.0, 0.0, 0.0]);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert!(mesh_from_flat(&[0.0; 9], &[0, -1, 2]).is_err());
        assert!(mesh_from_flat(&[0.0; 8], &[]).is_err());
    }

    #[test]
    fn annotation_codes_map_to_table_rows() {
        // table rows: Unknown, G_a, Medial_wall
        let table = [0, 1_000, 2_000];
        let ids = labeling_from_annot(&[0, 1, 2, 3], &[1_000, 2_000, 0, 77], &table).unwrap();
        assert_eq!(ids, vec![1, 2, 0, 0]);
    }

    #[test]
    fn annotation_vertex_order_is_respected() {
        let ids = labeling_from_annot(&[2, 0, 1], &[5, 6, 7], &[5, 6, 7]).unwrap();
        assert_eq!(ids, vec![1, 2, 0]);
        assert!(labeling_from_annot(&[0, 3], &[5, 6], &[5, 6]).is_err());
    }
}
