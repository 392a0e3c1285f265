use std::fs;
use std::path::PathBuf;

use gradprep::io::surface::SurfaceMesh;
use gradprep::render::hemispheres::{HemispherePlotOptions, plot_hemispheres};
use gradprep::Error;

fn unique_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "gradprep_render_{}_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos(),
        name
    ));
    path
}

fn tetrahedron(x: f64) -> SurfaceMesh {
    SurfaceMesh::new(
        vec![
            [x, 0.0, 0.0],
            [x + 10.0, 0.0, 0.0],
            [x, 10.0, 0.0],
            [x, 0.0, 10.0],
        ],
        vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
    )
    .unwrap()
}

fn options() -> HemispherePlotOptions {
    HemispherePlotOptions {
        size: (400, 200),
        cmap: "viridis_r".parse().unwrap(),
        color_range: None,
        label_text: Vec::new(),
        color_bar: false,
    }
}

#[test]
fn writes_png_with_nan_vertices() {
    let path = unique_path("ok.png");
    let field = vec![0.0, 1.0, f64::NAN, 0.5, -1.0, 0.2, 0.3, f64::NAN];
    plot_hemispheres(
        &tetrahedron(-20.0),
        &tetrahedron(10.0),
        &[field.clone(), field],
        &options(),
        &path,
    )
    .unwrap();
    let meta = fs::metadata(&path).unwrap();
    assert!(meta.len() > 0);
    let _ = fs::remove_file(&path);
}

#[test]
fn field_length_must_match_both_hemispheres() {
    let path = unique_path("bad.png");
    let err = plot_hemispheres(
        &tetrahedron(-20.0),
        &tetrahedron(10.0),
        &[vec![0.0; 7]],
        &options(),
        &path,
    )
    .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { expected: 8, found: 7, .. }));
    assert!(!path.exists());
}
