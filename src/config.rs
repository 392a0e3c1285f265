use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::connectivity::CovarianceEstimator;
use crate::core::gradient::GradientParams;
use crate::core::masking::DEFAULT_DISPLAY_STD_THRESHOLD;
use crate::core::signal::CleanParams;
use crate::error::{Error, Result};
use crate::render::colormap::Colormap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputsConfig {
    #[serde(default = "InputsConfig::default_confounds")]
    pub confounds: String,
    #[serde(default = "InputsConfig::default_timeseries_lh")]
    pub timeseries_lh: String,
    #[serde(default = "InputsConfig::default_timeseries_rh")]
    pub timeseries_rh: String,
}

impl InputsConfig {
    fn default_confounds() -> String {
        "data/confounds.txt".into()
    }
    fn default_timeseries_lh() -> String {
        "data/lh.timeseries.mgz".into()
    }
    fn default_timeseries_rh() -> String {
        "data/rh.timeseries.mgz".into()
    }
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            confounds: Self::default_confounds(),
            timeseries_lh: Self::default_timeseries_lh(),
            timeseries_rh: Self::default_timeseries_rh(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtlasConfig {
    #[serde(default = "AtlasConfig::default_labels_lh")]
    pub labels_lh: String,
    #[serde(default = "AtlasConfig::default_labels_rh")]
    pub labels_rh: String,
    /// One label name per line. Required for text labelings; `.annot` files
    /// carry their own colortable names.
    #[serde(default)]
    pub names: Option<String>,
    /// Label excluded from aggregation; empty disables the exclusion.
    #[serde(default = "AtlasConfig::default_medial_wall")]
    pub medial_wall: String,
}

impl AtlasConfig {
    fn default_labels_lh() -> String {
        "data/lh.aparc.a2009s.annot".into()
    }
    fn default_labels_rh() -> String {
        "data/rh.aparc.a2009s.annot".into()
    }
    fn default_medial_wall() -> String {
        "Medial_wall".into()
    }

    pub fn medial_wall(&self) -> Option<&str> {
        let name = self.medial_wall.trim();
        (!name.is_empty()).then_some(name)
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            labels_lh: Self::default_labels_lh(),
            labels_rh: Self::default_labels_rh(),
            names: None,
            medial_wall: Self::default_medial_wall(),
        }
    }
}

/// FreeSurfer surfaces (`lh.pial`, ...). A `*_faces` table switches the
/// matching entry to a text vertex table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurfacesConfig {
    #[serde(default = "SurfacesConfig::default_lh")]
    pub lh: String,
    #[serde(default)]
    pub lh_faces: Option<String>,
    #[serde(default = "SurfacesConfig::default_rh")]
    pub rh: String,
    #[serde(default)]
    pub rh_faces: Option<String>,
}

impl SurfacesConfig {
    fn default_lh() -> String {
        "data/lh.pial".into()
    }
    fn default_rh() -> String {
        "data/rh.pial".into()
    }
}

impl Default for SurfacesConfig {
    fn default() -> Self {
        Self {
            lh: Self::default_lh(),
            lh_faces: None,
            rh: Self::default_rh(),
            rh_faces: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConnectivityConfig {
    #[serde(default)]
    pub estimator: CovarianceEstimator,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaskingConfig {
    #[serde(default = "MaskingConfig::default_display_std_threshold")]
    pub display_std_threshold: f64,
}

impl MaskingConfig {
    fn default_display_std_threshold() -> f64 {
        DEFAULT_DISPLAY_STD_THRESHOLD
    }
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            display_std_threshold: Self::default_display_std_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderConfig {
    #[serde(default = "RenderConfig::default_enabled")]
    pub enabled: bool,
    /// How many leading gradients are mapped to vertices and drawn.
    #[serde(default = "RenderConfig::default_n_mapped")]
    pub n_mapped: usize,
    #[serde(default = "RenderConfig::default_cmap")]
    pub cmap: String,
    #[serde(default = "RenderConfig::default_size")]
    pub size: (u32, u32),
    #[serde(default = "RenderConfig::default_label_text")]
    pub label_text: Vec<String>,
    #[serde(default = "RenderConfig::default_enabled")]
    pub color_bar: bool,
    #[serde(default)]
    pub color_range: Option<(f64, f64)>,
    #[serde(default = "RenderConfig::default_matrix_cmap")]
    pub matrix_cmap: String,
    #[serde(default = "RenderConfig::default_matrix_vmin")]
    pub matrix_vmin: f64,
    #[serde(default = "RenderConfig::default_matrix_vmax")]
    pub matrix_vmax: f64,
    #[serde(default = "RenderConfig::default_enabled")]
    pub matrix_reorder: bool,
    #[serde(default = "RenderConfig::default_matrix_size")]
    pub matrix_size: (u32, u32),
}

impl RenderConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_n_mapped() -> usize {
        2
    }
    fn default_cmap() -> String {
        "viridis_r".into()
    }
    fn default_size() -> (u32, u32) {
        (1200, 600)
    }
    fn default_label_text() -> Vec<String> {
        vec!["Grad1".into(), "Grad2".into()]
    }
    fn default_matrix_cmap() -> String {
        "RdBu_r".into()
    }
    fn default_matrix_vmin() -> f64 {
        -0.8
    }
    fn default_matrix_vmax() -> f64 {
        0.8
    }
    fn default_matrix_size() -> (u32, u32) {
        (1200, 1200)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_mapped: Self::default_n_mapped(),
            cmap: Self::default_cmap(),
            size: Self::default_size(),
            label_text: Self::default_label_text(),
            color_bar: true,
            color_range: None,
            matrix_cmap: Self::default_matrix_cmap(),
            matrix_vmin: Self::default_matrix_vmin(),
            matrix_vmax: Self::default_matrix_vmax(),
            matrix_reorder: true,
            matrix_size: Self::default_matrix_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "OutputConfig::default_dir")]
    pub dir: String,
    /// Load this correlation matrix instead of computing one.
    #[serde(default)]
    pub reuse_correlation: Option<String>,
}

impl OutputConfig {
    fn default_dir() -> String {
        "out".into()
    }

    pub fn path(&self, file: &str) -> PathBuf {
        Path::new(&self.dir).join(file)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            reuse_correlation: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub atlas: AtlasConfig,
    #[serde(default)]
    pub surfaces: SurfacesConfig,
    #[serde(default)]
    pub cleaning: CleanParams,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub masking: MaskingConfig,
    #[serde(default)]
    pub gradients: GradientParams,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Every `key = value` line prefixed with `# `; section headers stay live.
fn commented(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            out.push('\n');
        } else if trimmed.starts_with('[') && trimmed.ends_with(']') && !trimmed.contains('=') {
            out.push_str(line);
            out.push('\n');
        } else {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

impl AppConfig {
    /// Strict load: missing or malformed files are errors.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let cfg: Self = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            match fs::read_to_string(path_obj) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(cfg) => return cfg,
                    Err(err) => {
                        warn!("Failed to parse config {path}: {err}. Using defaults.");
                    }
                },
                Err(err) => {
                    warn!("Failed to read config {path}: {err}. Using defaults.");
                }
            }
            return Self::default();
        }

        // File does not exist: write defaults and return them.
        let default_cfg = Self::default();
        match toml::to_string_pretty(&default_cfg) {
            Ok(text) => {
                if let Err(err) = fs::write(path_obj, commented(&text)) {
                    warn!("Failed to write default config to {path}: {err}");
                }
            }
            Err(err) => warn!("Failed to serialize default config: {err}"),
        }
        default_cfg
    }

    pub fn validate(&self) -> Result<()> {
        self.gradients.validate()?;
        if !(self.masking.display_std_threshold >= 0.0) {
            return Err(Error::Config(format!(
                "masking.display_std_threshold must be non-negative, got {}",
                self.masking.display_std_threshold
            )));
        }
        if self.render.n_mapped > self.gradients.n_components {
            return Err(Error::Config(format!(
                "render.n_mapped ({}) exceeds gradients.n_components ({})",
                self.render.n_mapped, self.gradients.n_components
            )));
        }
        if self.render.matrix_vmin >= self.render.matrix_vmax {
            return Err(Error::Config("render.matrix_vmin must be below matrix_vmax".into()));
        }
        if let Some((lo, hi)) = self.render.color_range {
            if lo >= hi {
                return Err(Error::Config("render.color_range must be increasing".into()));
            }
        }
        self.render.cmap.parse::<Colormap>()?;
        self.render.matrix_cmap.parse::<Colormap>()?;
        Ok(())
    }
}
