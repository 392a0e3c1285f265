//! render/matrix.rs — heatmap of a (masked) connectome.

use std::path::Path;

use nalgebra::DMatrix;
use plotters::prelude::*;
use plotters::coord::Shift;
use plotters::style::FontTransform;

use crate::error::{Error, Result};
use crate::render::colormap::Colormap;

const LABEL_MARGIN: i32 = 160;
const TITLE_MARGIN: i32 = 40;
const COLORBAR_WIDTH: u32 = 110;

#[derive(Debug, Clone)]
pub struct MatrixPlotOptions {
    pub size: (u32, u32),
    pub vmin: f64,
    pub vmax: f64,
    pub cmap: Colormap,
    pub reorder: bool,
    pub title: Option<String>,
}

/// Leaf order of average-linkage clustering of the rows (euclidean distance).
/// Merges take the closest pair, ties broken by the lowest cluster indices;
/// the earlier cluster's leaves come first.
pub fn leaf_order(matrix: &DMatrix<f64>) -> Vec<usize> {
    let n = matrix.nrows();
    let mut dist = DMatrix::from_fn(n, n, |i, j| (matrix.row(i) - matrix.row(j)).norm());
    let mut members: Vec<Option<Vec<usize>>> = (0..n).map(|i| Some(vec![i])).collect();

    for _ in 1..n {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if members[i].is_none() {
                continue;
            }
            for j in (i + 1)..n {
                if members[j].is_none() {
                    continue;
                }
                let d = dist[(i, j)];
                if best.is_none_or(|(_, _, bd)| d < bd) {
                    best = Some((i, j, d));
                }
            }
        }
        let Some((i, j, _)) = best else { break };
        let right = members[j].take().unwrap_or_default();
        let size_i = members[i].as_ref().map_or(0, Vec::len) as f64;
        let size_j = right.len() as f64;
        for k in 0..n {
            if k == i || members[k].is_none() {
                continue;
            }
            let d = (size_i * dist[(k, i)] + size_j * dist[(k, j)]) / (size_i + size_j);
            dist[(k, i)] = d;
            dist[(i, k)] = d;
        }
        if let Some(left) = members[i].as_mut() {
            left.extend(right);
        }
    }
    members.into_iter().flatten().flatten().collect()
}

pub fn plot_matrix(
    matrix: &DMatrix<f64>,
    labels: &[String],
    options: &MatrixPlotOptions,
    path: &Path,
) -> Result<()> {
    let n = matrix.nrows();
    if !matrix.is_square() {
        return Err(Error::shape("plotted matrix columns", n, matrix.ncols()));
    }
    if !labels.is_empty() && labels.len() != n {
        return Err(Error::shape("matrix labels", n, labels.len()));
    }
    let order: Vec<usize> = if options.reorder {
        leaf_order(matrix)
    } else {
        (0..n).collect()
    };

    let root = BitMapBackend::new(path, options.size).into_drawing_area();
    root.fill(&WHITE).map_err(Error::render)?;
    let (heat, bar) = root.split_horizontally(options.size.0.saturating_sub(COLORBAR_WIDTH));

    if let Some(title) = &options.title {
        heat.draw(&Text::new(
            title.clone(),
            (LABEL_MARGIN, 10),
            ("sans-serif", 20).into_font(),
        ))
        .map_err(Error::render)?;
    }

    let (w, h) = heat.dim_in_pixel();
    let side = (w as i32 - LABEL_MARGIN - 10).min(h as i32 - TITLE_MARGIN - LABEL_MARGIN);
    let cell = if n > 0 { side as f64 / n as f64 } else { 0.0 };
    let px = |k: usize| (k as f64 * cell).round() as i32;

    for (r, &i) in order.iter().enumerate() {
        for (c, &j) in order.iter().enumerate() {
            let color = options.cmap.map(matrix[(i, j)], options.vmin, options.vmax);
            let top_left = (LABEL_MARGIN + px(c), TITLE_MARGIN + px(r));
            let bottom_right = (LABEL_MARGIN + px(c + 1), TITLE_MARGIN + px(r + 1));
            heat.draw(&Rectangle::new([top_left, bottom_right], color.filled()))
                .map_err(Error::render)?;
        }
    }

    let font_px = (cell * 0.8).min(12.0);
    if !labels.is_empty() && font_px >= 4.0 {
        let row_style = TextStyle::from(("sans-serif", font_px).into_font());
        let col_style = row_style.transform(FontTransform::Rotate90);
        for (k, &i) in order.iter().enumerate() {
            let mid = (k as f64 * cell + cell / 2.0).round() as i32;
            heat.draw(&Text::new(
                labels[i].clone(),
                (4, TITLE_MARGIN + mid - font_px as i32 / 2),
                row_style.clone(),
            ))
            .map_err(Error::render)?;
            heat.draw(&Text::new(
                labels[i].clone(),
                (LABEL_MARGIN + mid + font_px as i32 / 2, TITLE_MARGIN + side + 4),
                col_style.clone(),
            ))
            .map_err(Error::render)?;
        }
    }

    draw_colorbar(&bar, options.cmap, options.vmin, options.vmax, TITLE_MARGIN, side)?;
    root.present().map_err(Error::render)?;
    Ok(())
}

/// Vertical color bar with end labels, `top` and `height` in pixels.
pub fn draw_colorbar(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    cmap: Colormap,
    vmin: f64,
    vmax: f64,
    top: i32,
    height: i32,
) -> Result<()> {
    let steps = height.max(1);
    for s in 0..steps {
        let t = 1.0 - s as f64 / (steps - 1).max(1) as f64;
        area.draw(&Rectangle::new(
            [(10, top + s), (30, top + s + 1)],
            cmap.at(t).filled(),
        ))
        .map_err(Error::render)?;
    }
    let style = ("sans-serif", 14).into_font();
    area.draw(&Text::new(format!("{vmax:.2}"), (36, top), style.clone()))
        .map_err(Error::render)?;
    area.draw(&Text::new(format!("{vmin:.2}"), (36, top + height - 14), style))
        .map_err(Error::render)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_order_groups_similar_rows() {
        let m = DMatrix::from_row_slice(
            4,
            2,
            &[
                0.0, 0.0, //
                10.0, 10.0, //
                0.1, 0.0, //
                10.0, 10.2,
            ],
        );
        let order = leaf_order(&m);
        assert_eq!(order, vec![0, 2, 1, 3]);
    }

    #[test]
    fn leaf_order_is_a_permutation() {
        let m = DMatrix::from_fn(7, 3, |i, j| ((i * 7 + j * 3) % 5) as f64);
        let mut order = leaf_order(&m);
        order.sort_unstable();
        assert_eq!(order, (0..7).collect::<Vec<_>>());
    }
}
