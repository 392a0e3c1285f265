//! pipeline.rs — the end-to-end run.
//!
//! confounds + vertex timeseries → cleaned signals → parcel means →
//! correlation → (display mask → heatmap) and (embedding mask → gradients →
//! vertex maps → hemisphere figure). The two masks never meet.

use std::fs;
use std::path::Path;
use std::thread;

use nalgebra::DMatrix;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::core::connectivity::Connectome;
use crate::core::gradient::GradientMaps;
use crate::core::masking::ParcelMask;
use crate::core::parcellation::{Labeling, ParcelTimeseries, aggregate, map_to_labels};
use crate::core::signal::{CleanParams, clean};
use crate::error::{Error, Result};
use crate::io::atlas::Atlas;
use crate::io::surface::SurfaceMesh;
use crate::io::{npy, read_matrix};
use crate::render::hemispheres::{HemispherePlotOptions, plot_hemispheres};
use crate::render::matrix::{MatrixPlotOptions, plot_matrix};

pub const CORRELATION_FILE: &str = "correlation_matrix.npy";
pub const GRADIENTS_FILE: &str = "gradients.npy";
pub const LAMBDAS_FILE: &str = "gradient_lambdas.npy";
pub const MAPPED_FILE: &str = "mapped_gradients.npy";
pub const CONNECTIVITY_PNG: &str = "connectivity.png";
pub const GRADIENTS_PNG: &str = "gradients.png";
pub const SUMMARY_FILE: &str = "summary.json";

/// Parcels of both hemispheres in one id space.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelSpace {
    /// Vertex labels, left hemisphere first, right ids shifted by `right_offset`.
    pub labeling: Labeling,
    pub right_offset: i32,
    /// Ascending combined ids, excluded labels removed.
    pub ids: Vec<i32>,
    /// `lh_<name>` / `rh_<name>` for every entry of `ids`.
    pub labels: Vec<String>,
    left_ids: Vec<i32>,
    right_ids: Vec<i32>,
    excluded: Vec<i32>,
}

impl ParcelSpace {
    pub fn new(atlas: &Atlas, medial_wall: Option<&str>) -> Result<Self> {
        let excluded = atlas.excluded_ids(medial_wall)?;
        let left_ids = atlas.left.parcel_ids(&excluded);
        let right_ids = atlas.right.parcel_ids(&excluded);
        let (labeling, right_offset) = Labeling::combine(&atlas.left, &atlas.right);

        let name = |id: i32| {
            atlas
                .name_of(id)
                .map_or_else(|| id.to_string(), str::to_string)
        };
        let mut ids = left_ids.clone();
        let mut labels: Vec<String> = left_ids.iter().map(|&id| format!("lh_{}", name(id))).collect();
        for &id in &right_ids {
            ids.push(id + right_offset);
            labels.push(format!("rh_{}", name(id)));
        }
        Ok(Self {
            labeling,
            right_offset,
            ids,
            labels,
            left_ids,
            right_ids,
            excluded,
        })
    }

    #[inline]
    pub fn n_parcels(&self) -> usize {
        self.ids.len()
    }
}

/// Everything a run produced, also written to `output.dir`.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub space: ParcelSpace,
    pub connectome: Connectome,
    pub display_mask: ParcelMask,
    pub embedding_mask: ParcelMask,
    pub gradients: GradientMaps,
    /// One vertex field per mapped gradient, NaN outside retained parcels.
    pub mapped: Vec<Vec<f64>>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    pub n_parcels: usize,
    pub n_timepoints: Option<usize>,
    pub nan_parcels: usize,
    pub reused_correlation: bool,
    pub display_parcels: Vec<String>,
    pub embedding_parcels: Vec<String>,
    pub n_components: usize,
    pub lambdas: Vec<f64>,
    pub n_mapped: usize,
    pub n_vertices: usize,
}

/// Signals are expected vertices × timepoints; a matrix stored the other way
/// round is turned over when only its columns match the labeling.
fn vertices_by_time(m: DMatrix<f64>, n_vertices: usize, what: &str) -> Result<DMatrix<f64>> {
    if m.nrows() == n_vertices {
        Ok(m)
    } else if m.ncols() == n_vertices {
        debug!(what, rows = m.nrows(), cols = m.ncols(), "transposing timeseries");
        Ok(m.transpose())
    } else {
        Err(Error::shape(
            format!("{what} vertices vs atlas labeling"),
            n_vertices,
            m.nrows(),
        ))
    }
}

fn hemisphere_means(
    path: &Path,
    labeling: &Labeling,
    confounds: &DMatrix<f64>,
    params: &CleanParams,
    excluded: &[i32],
    what: &str,
) -> Result<ParcelTimeseries> {
    let raw = vertices_by_time(read_matrix(path)?, labeling.len(), what)?;
    debug!(what, vertices = raw.nrows(), timepoints = raw.ncols(), "loaded timeseries");
    let cleaned = clean(&raw, Some(confounds), params)?;
    aggregate(&cleaned, labeling, excluded)
}

/// Clean both hemispheres in parallel and stack their parcel means.
fn parcel_timeseries(
    cfg: &AppConfig,
    atlas: &Atlas,
    space: &ParcelSpace,
) -> Result<ParcelTimeseries> {
    let confounds = read_matrix(Path::new(&cfg.inputs.confounds))?;
    info!(
        timepoints = confounds.nrows(),
        regressors = confounds.ncols(),
        "loaded confounds"
    );
    let excluded = space.excluded.as_slice();
    let params = &cfg.cleaning;
    let confounds = &confounds;

    let (left, right) = thread::scope(|s| {
        let lh = s.spawn(|| {
            hemisphere_means(
                Path::new(&cfg.inputs.timeseries_lh),
                &atlas.left,
                confounds,
                params,
                excluded,
                "left hemisphere",
            )
        });
        let right = hemisphere_means(
            Path::new(&cfg.inputs.timeseries_rh),
            &atlas.right,
            confounds,
            params,
            excluded,
            "right hemisphere",
        );
        let left = lh
            .join()
            .unwrap_or_else(|_| Err(Error::Degenerate("left hemisphere worker panicked".into())));
        (left, right)
    });
    let (left, right) = (left?, right?);
    debug_assert_eq!(left.ids, space.left_ids);
    debug_assert_eq!(right.ids, space.right_ids);
    ParcelTimeseries::concat(&left, &right, space.right_offset)
}

/// Both hemisphere meshes, each checked against its own labeling.
fn load_meshes(cfg: &AppConfig, atlas: &Atlas) -> Result<(SurfaceMesh, SurfaceMesh)> {
    let open = |what: &str,
                path: &str,
                faces: Option<&str>,
                labeling: &Labeling|
     -> Result<SurfaceMesh> {
        let mesh = SurfaceMesh::open(Path::new(path), faces.map(Path::new))?;
        if mesh.n_vertices() != labeling.len() {
            return Err(Error::shape(
                format!("{what} mesh vertices vs atlas labeling"),
                labeling.len(),
                mesh.n_vertices(),
            ));
        }
        debug!(
            hemisphere = what,
            vertices = mesh.n_vertices(),
            faces = mesh.faces.len(),
            "loaded mesh"
        );
        Ok(mesh)
    };
    let s = &cfg.surfaces;
    Ok((
        open("left", &s.lh, s.lh_faces.as_deref(), &atlas.left)?,
        open("right", &s.rh, s.rh_faces.as_deref(), &atlas.right)?,
    ))
}

pub fn run(cfg: &AppConfig) -> Result<PipelineOutput> {
    cfg.validate()?;
    let out_dir = Path::new(&cfg.output.dir);
    fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;

    let atlas = Atlas::load(
        Path::new(&cfg.atlas.labels_lh),
        Path::new(&cfg.atlas.labels_rh),
        cfg.atlas.names.as_deref().map(Path::new),
    )?;
    let space = ParcelSpace::new(&atlas, cfg.atlas.medial_wall())?;
    info!(
        parcels = space.n_parcels(),
        lh_vertices = atlas.left.len(),
        rh_vertices = atlas.right.len(),
        "loaded atlas"
    );
    let meshes = if cfg.render.enabled && cfg.render.n_mapped > 0 {
        Some(load_meshes(cfg, &atlas)?)
    } else {
        None
    };

    let mut n_timepoints = None;
    let mut nan_parcels = 0;
    let connectome = match &cfg.output.reuse_correlation {
        Some(path) => {
            let c = Connectome::load_npy(Path::new(path))?;
            if c.n_parcels() != space.n_parcels() {
                return Err(Error::shape(
                    "reused correlation vs atlas parcels",
                    space.n_parcels(),
                    c.n_parcels(),
                ));
            }
            info!(path = %path, parcels = c.n_parcels(), "reusing correlation matrix");
            c
        }
        None => {
            let mut ts = parcel_timeseries(cfg, &atlas, &space)?;
            nan_parcels = ts.fill_nan(0.0);
            if nan_parcels > 0 {
                warn!(parcels = nan_parcels, "NaN parcel means replaced with 0");
            }
            n_timepoints = Some(ts.n_time());
            let c = Connectome::estimate(&ts.data, cfg.connectivity.estimator)?;
            info!(
                parcels = c.n_parcels(),
                estimator = ?cfg.connectivity.estimator,
                "estimated correlation"
            );
            c
        }
    };
    connectome.save_npy(&cfg.output.path(CORRELATION_FILE))?;

    let display_mask = ParcelMask::display(&connectome.matrix, cfg.masking.display_std_threshold);
    let embedding_mask = ParcelMask::embedding(&connectome.matrix);
    info!(
        display = display_mask.len(),
        embedding = embedding_mask.len(),
        total = connectome.n_parcels(),
        "masked parcels"
    );

    if cfg.render.enabled {
        let options = MatrixPlotOptions {
            size: cfg.render.matrix_size,
            vmin: cfg.render.matrix_vmin,
            vmax: cfg.render.matrix_vmax,
            cmap: cfg.render.matrix_cmap.parse()?,
            reorder: cfg.render.matrix_reorder,
            title: Some("Parcel correlation".into()),
        };
        plot_matrix(
            &display_mask.submatrix(&connectome.matrix),
            &display_mask.select(&space.labels),
            &options,
            &cfg.output.path(CONNECTIVITY_PNG),
        )?;
        info!(path = %cfg.output.path(CONNECTIVITY_PNG).display(), "wrote connectivity figure");
    }

    let gradients = GradientMaps::fit(&embedding_mask.submatrix(&connectome.matrix), &cfg.gradients)?;
    npy::write_matrix(&cfg.output.path(GRADIENTS_FILE), &gradients.gradients)?;
    npy::write_vec(&cfg.output.path(LAMBDAS_FILE), &gradients.lambdas)?;

    let retained = embedding_mask.select(&space.ids);
    let vertex_mask = space.labeling.mask_in(&retained);
    let n_mapped = cfg.render.n_mapped.min(gradients.n_components());
    let mapped = (0..n_mapped)
        .map(|c| {
            map_to_labels(
                &gradients.component(c),
                space.labeling.as_slice(),
                Some(&vertex_mask),
                f64::NAN,
            )
        })
        .collect::<Result<Vec<_>>>()?;
    let n_vertices = space.labeling.len();
    let mapped_matrix = DMatrix::from_fn(n_vertices, n_mapped, |v, c| mapped[c][v]);
    npy::write_matrix(&cfg.output.path(MAPPED_FILE), &mapped_matrix)?;

    if let Some((lh, rh)) = &meshes {
        let options = HemispherePlotOptions {
            size: cfg.render.size,
            cmap: cfg.render.cmap.parse()?,
            color_range: cfg.render.color_range,
            label_text: cfg.render.label_text.clone(),
            color_bar: cfg.render.color_bar,
        };
        plot_hemispheres(lh, rh, &mapped, &options, &cfg.output.path(GRADIENTS_PNG))?;
        info!(path = %cfg.output.path(GRADIENTS_PNG).display(), "wrote gradient figure");
    }

    let summary = RunSummary {
        n_parcels: space.n_parcels(),
        n_timepoints,
        nan_parcels,
        reused_correlation: cfg.output.reuse_correlation.is_some(),
        display_parcels: display_mask.select(&space.labels),
        embedding_parcels: embedding_mask.select(&space.labels),
        n_components: gradients.n_components(),
        lambdas: gradients.lambdas.clone(),
        n_mapped,
        n_vertices,
    };
    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| Error::Config(format!("summary serialization: {e}")))?;
    let summary_path = cfg.output.path(SUMMARY_FILE);
    fs::write(&summary_path, json).map_err(|e| Error::io(&summary_path, e))?;
    info!(dir = %out_dir.display(), "run complete");

    Ok(PipelineOutput {
        space,
        connectome,
        display_mask,
        embedding_mask,
        gradients,
        mapped,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atlas() -> Atlas {
        let names = ["Unknown", "A", "Medial_wall", "B"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Atlas::new(
            names,
            Labeling::new(vec![0, 1, 1, 2, 3]),
            Labeling::new(vec![3, 3, 2, 0, 1]),
        )
        .unwrap()
    }

    #[test]
    fn parcel_space_skips_background_and_medial_wall() {
        let space = ParcelSpace::new(&atlas(), Some("Medial_wall")).unwrap();
        assert_eq!(space.right_offset, 4);
        assert_eq!(space.ids, vec![1, 3, 5, 7]);
        assert_eq!(space.labels, vec!["lh_A", "lh_B", "rh_A", "rh_B"]);
        assert!(space.labels.iter().all(|l| !l.contains("Unknown")));
    }

    #[test]
    fn parcel_space_keeps_medial_wall_when_unnamed() {
        let space = ParcelSpace::new(&atlas(), None).unwrap();
        assert_eq!(space.n_parcels(), 6);
        assert!(ParcelSpace::new(&atlas(), Some("Missing")).is_err());
    }

    #[test]
    fn transposed_timeseries_is_turned_over() {
        let m = DMatrix::<f64>::zeros(7, 3);
        assert_eq!(vertices_by_time(m.clone(), 3, "t").unwrap().shape(), (3, 7));
        assert_eq!(vertices_by_time(m.clone(), 7, "t").unwrap().shape(), (7, 3));
        assert!(matches!(
            vertices_by_time(m, 5, "t"),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
