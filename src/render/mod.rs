//! PNG output with `plotters`: connectome heatmaps and surface fields.

pub mod colormap;
pub mod hemispheres;
pub mod matrix;
