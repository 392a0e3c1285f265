//! io/surface.rs — triangulated hemisphere meshes.
//!
//! FreeSurfer surface files are the primary input. A mesh can also be given as
//! two tables: vertex coordinates (n × 3) and zero-based triangle indices
//! (m × 3). Without a face table the mesh renders as a point cloud.

use std::path::Path;

use crate::error::{Error, Result};
use crate::io::freesurfer::read_surface;
use crate::io::has_extension;
use crate::io::table::read_table;

const TABLE_EXTENSIONS: &[&str] = &["txt", "tsv", "csv", "dat"];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurfaceMesh {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<[usize; 3]>,
}

impl SurfaceMesh {
    pub fn new(vertices: Vec<[f64; 3]>, faces: Vec<[usize; 3]>) -> Result<Self> {
        let n = vertices.len();
        if let Some(face) = faces.iter().find(|f| f.iter().any(|&v| v >= n)) {
            return Err(Error::Degenerate(format!(
                "face {face:?} references a vertex beyond {n}"
            )));
        }
        Ok(Self { vertices, faces })
    }

    /// FreeSurfer surface, unless a face table is given or the path names a
    /// text table.
    pub fn open(path: &Path, faces: Option<&Path>) -> Result<Self> {
        if faces.is_some() || has_extension(path, TABLE_EXTENSIONS) {
            Self::load(path, faces)
        } else {
            read_surface(path)
        }
    }

    pub fn load(vertices: &Path, faces: Option<&Path>) -> Result<Self> {
        let coords = read_table(vertices)?;
        if coords.ncols() != 3 {
            return Err(Error::shape("vertex table columns", 3, coords.ncols()));
        }
        let verts = (0..coords.nrows())
            .map(|i| [coords[(i, 0)], coords[(i, 1)], coords[(i, 2)]])
            .collect();

        let tris = match faces {
            None => Vec::new(),
            Some(path) => {
                let idx = read_table(path)?;
                if idx.ncols() != 3 {
                    return Err(Error::shape("face table columns", 3, idx.ncols()));
                }
                let mut tris = Vec::with_capacity(idx.nrows());
                for i in 0..idx.nrows() {
                    let mut tri = [0usize; 3];
                    for (k, slot) in tri.iter_mut().enumerate() {
                        let v = idx[(i, k)];
                        if v < 0.0 || v.fract() != 0.0 {
                            return Err(Error::Parse {
                                path: path.to_path_buf(),
                                line: i + 1,
                                message: format!("invalid vertex index {v}"),
                            });
                        }
                        *slot = v as usize;
                    }
                    tris.push(tri);
                }
                tris
            }
        };
        Self::new(verts, tris)
    }

    #[inline]
    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Unit normal of a face (zero for degenerate triangles).
    pub fn face_normal(&self, face: &[usize; 3]) -> [f64; 3] {
        let [a, b, c] = face.map(|i| self.vertices[i]);
        let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        let n = [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ];
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        if len > 0.0 {
            n.map(|x| x / len)
        } else {
            [0.0; 3]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_face_is_rejected() {
        let verts = vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        assert!(SurfaceMesh::new(verts.clone(), vec![[0, 1, 2]]).is_ok());
        assert!(SurfaceMesh::new(verts, vec![[0, 1, 3]]).is_err());
    }

    #[test]
    fn text_vertex_table_opens_as_point_cloud() {
        let path = std::env::temp_dir().join(format!(
            "gradprep_surface_{}.txt",
            std::process::id()
        ));
        std::fs::write(&path, "0 0 0\n1 0 0\n0 1 0\n0 0 1\n").unwrap();
        let mesh = SurfaceMesh::open(&path, None).unwrap();
        assert_eq!(mesh.n_vertices(), 4);
        assert!(mesh.faces.is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_surface_file_is_a_format_error() {
        let path = std::env::temp_dir().join("gradprep_no_such_dir").join("lh.pial");
        assert!(matches!(
            SurfaceMesh::open(&path, None),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn normal_follows_right_hand_rule() {
        let mesh = SurfaceMesh::new(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0, 1, 2]],
        )
        .unwrap();
        assert_eq!(mesh.face_normal(&mesh.faces[0]), [0.0, 0.0, 1.0]);
    }
}
