//! render/hemispheres.rs — per-vertex fields drawn on both hemispheres.
//!
//! One row per field, four orthographic views per row: left lateral, left
//! medial, right medial, right lateral. Faces are painted back to front with
//! Lambert shading; meshes without faces are drawn as point clouds.

use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::{Error, Result};
use crate::io::surface::SurfaceMesh;
use crate::render::colormap::{Colormap, NAN_COLOR, finite_range};
use crate::render::matrix::draw_colorbar;

const LABEL_COLUMN: u32 = 90;
const COLORBAR_COLUMN: u32 = 90;
const PANEL_MARGIN: f64 = 6.0;

#[derive(Debug, Clone)]
pub struct HemispherePlotOptions {
    pub size: (u32, u32),
    pub cmap: Colormap,
    /// Shared color range; each field uses its own finite range when unset.
    pub color_range: Option<(f64, f64)>,
    pub label_text: Vec<String>,
    pub color_bar: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    LeftLateral,
    LeftMedial,
    RightMedial,
    RightLateral,
}

pub const LAYOUT: [View; 4] = [
    View::LeftLateral,
    View::LeftMedial,
    View::RightMedial,
    View::RightLateral,
];

impl View {
    #[inline]
    pub fn is_left(self) -> bool {
        matches!(self, View::LeftLateral | View::LeftMedial)
    }

    /// +1 when the camera sits on the +x side of the brain, -1 otherwise.
    #[inline]
    fn camera_side(self) -> f64 {
        match self {
            View::LeftLateral | View::RightMedial => -1.0,
            View::LeftMedial | View::RightLateral => 1.0,
        }
    }

    /// Screen coordinates `(u, v)` and closeness to the camera.
    pub fn project(self, p: [f64; 3]) -> (f64, f64, f64) {
        let side = self.camera_side();
        (side * p[1], p[2], side * p[0])
    }

    fn shade(self, normal: [f64; 3]) -> f64 {
        0.35 + 0.65 * (normal[0] * self.camera_side()).abs()
    }
}

fn shaded(c: RGBColor, k: f64) -> RGBColor {
    let s = |x: u8| (x as f64 * k).round().clamp(0.0, 255.0) as u8;
    RGBColor(s(c.0), s(c.1), s(c.2))
}

struct Frame {
    u_min: f64,
    v_min: f64,
    scale: f64,
    x0: f64,
    y0: f64,
}

impl Frame {
    fn fit(points: &[(f64, f64, f64)], (w, h): (u32, u32)) -> Self {
        let (mut u_min, mut u_max, mut v_min, mut v_max) =
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for &(u, v, _) in points {
            u_min = u_min.min(u);
            u_max = u_max.max(u);
            v_min = v_min.min(v);
            v_max = v_max.max(v);
        }
        let du = (u_max - u_min).max(1e-9);
        let dv = (v_max - v_min).max(1e-9);
        let avail_w = (w as f64 - 2.0 * PANEL_MARGIN).max(1.0);
        let avail_h = (h as f64 - 2.0 * PANEL_MARGIN).max(1.0);
        let scale = (avail_w / du).min(avail_h / dv);
        Self {
            u_min,
            v_min,
            scale,
            x0: PANEL_MARGIN + (avail_w - du * scale) / 2.0,
            y0: h as f64 - PANEL_MARGIN - (avail_h - dv * scale) / 2.0,
        }
    }

    fn pixel(&self, u: f64, v: f64) -> (i32, i32) {
        (
            (self.x0 + (u - self.u_min) * self.scale).round() as i32,
            (self.y0 - (v - self.v_min) * self.scale).round() as i32,
        )
    }
}

fn draw_view(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    mesh: &SurfaceMesh,
    values: &[f64],
    view: View,
    cmap: Colormap,
    (lo, hi): (f64, f64),
) -> Result<()> {
    if mesh.n_vertices() == 0 {
        return Ok(());
    }
    let projected: Vec<(f64, f64, f64)> = mesh.vertices.iter().map(|&p| view.project(p)).collect();
    let frame = Frame::fit(&projected, area.dim_in_pixel());

    if mesh.faces.is_empty() {
        let mut order: Vec<usize> = (0..projected.len()).collect();
        order.sort_by(|&a, &b| projected[a].2.total_cmp(&projected[b].2));
        for v in order {
            let (u, w, _) = projected[v];
            let color = cmap.map(values[v], lo, hi);
            area.draw(&Circle::new(frame.pixel(u, w), 2, color.filled()))
                .map_err(Error::render)?;
        }
        return Ok(());
    }

    let closeness = |f: &[usize; 3]| f.iter().map(|&v| projected[v].2).sum::<f64>() / 3.0;
    let mut faces: Vec<&[usize; 3]> = mesh.faces.iter().collect();
    faces.sort_by(|a, b| closeness(a).total_cmp(&closeness(b)));

    for face in faces {
        let vals = face.map(|v| values[v]);
        let base = if vals.iter().any(|x| x.is_nan()) {
            NAN_COLOR
        } else {
            cmap.map(vals.iter().sum::<f64>() / 3.0, lo, hi)
        };
        let color = shaded(base, view.shade(mesh.face_normal(face)));
        let points: Vec<(i32, i32)> = face
            .iter()
            .map(|&v| frame.pixel(projected[v].0, projected[v].1))
            .collect();
        area.draw(&Polygon::new(points, color.filled()))
            .map_err(Error::render)?;
    }
    Ok(())
}

/// Render `fields` (each of length `lh + rh` vertices, left first) to a PNG.
pub fn plot_hemispheres(
    lh: &SurfaceMesh,
    rh: &SurfaceMesh,
    fields: &[Vec<f64>],
    options: &HemispherePlotOptions,
    path: &Path,
) -> Result<()> {
    let n_lh = lh.n_vertices();
    let n_total = n_lh + rh.n_vertices();
    for field in fields {
        if field.len() != n_total {
            return Err(Error::shape("field length vs hemisphere vertices", n_total, field.len()));
        }
    }
    if fields.is_empty() {
        return Err(Error::Render("no fields to plot".into()));
    }

    let root = BitMapBackend::new(path, options.size).into_drawing_area();
    root.fill(&WHITE).map_err(Error::render)?;

    let label_w = if options.label_text.is_empty() { 0 } else { LABEL_COLUMN };
    let bar_w = if options.color_bar { COLORBAR_COLUMN } else { 0 };
    let (labels, rest) = root.split_horizontally(label_w);
    let (grid, bars) = rest.split_horizontally(options.size.0.saturating_sub(label_w + bar_w));

    let rows = fields.len();
    let cells = grid.split_evenly((rows, LAYOUT.len()));
    let label_cells = labels.split_evenly((rows, 1));
    let bar_cells = bars.split_evenly((rows, 1));

    for (r, field) in fields.iter().enumerate() {
        let range = options.color_range.unwrap_or_else(|| finite_range(field));
        let (left_vals, right_vals) = field.split_at(n_lh);
        for (c, &view) in LAYOUT.iter().enumerate() {
            let (mesh, vals) = if view.is_left() {
                (lh, left_vals)
            } else {
                (rh, right_vals)
            };
            draw_view(&cells[r * LAYOUT.len() + c], mesh, vals, view, options.cmap, range)?;
        }

        if let Some(text) = options.label_text.get(r) {
            let (_, h) = label_cells[r].dim_in_pixel();
            label_cells[r]
                .draw(&Text::new(
                    text.clone(),
                    (8, h as i32 / 2 - 8),
                    ("sans-serif", 16).into_font(),
                ))
                .map_err(Error::render)?;
        }
        if options.color_bar {
            let (_, h) = bar_cells[r].dim_in_pixel();
            draw_colorbar(&bar_cells[r], options.cmap, range.0, range.1, 10, h as i32 - 20)?;
        }
    }
    root.present().map_err(Error::render)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lateral_and_medial_views_face_opposite_sides() {
        let p = [30.0, 5.0, 1.0];
        let (u_lat, _, near_lat) = View::LeftLateral.project(p);
        let (u_med, _, near_med) = View::LeftMedial.project(p);
        assert_eq!(u_lat, -u_med);
        assert_eq!(near_lat, -near_med);
        assert_eq!(View::RightLateral.project(p), View::LeftMedial.project(p));
    }

    #[test]
    fn frame_keeps_points_inside_panel() {
        let pts = vec![(-10.0, -5.0, 0.0), (10.0, 5.0, 0.0), (0.0, 0.0, 0.0)];
        let frame = Frame::fit(&pts, (200, 100));
        for &(u, v, _) in &pts {
            let (x, y) = frame.pixel(u, v);
            assert!((0..=200).contains(&x) && (0..=100).contains(&y), "{x},{y}");
        }
    }

    #[test]
    fn shading_never_brightens() {
        let c = RGBColor(100, 200, 250);
        let s = shaded(c, View::LeftLateral.shade([1.0, 0.0, 0.0]));
        assert_eq!(s, c);
        let dim = shaded(c, View::LeftLateral.shade([0.0, 0.0, 1.0]));
        assert!(dim.0 < c.0 && dim.2 < c.2);
    }
}
