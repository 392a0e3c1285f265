use clap::Parser;

use crate::config::AppConfig;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to config TOML (written with commented defaults when missing)
    #[arg(long, default_value = "gradprep.toml")]
    pub config: String,

    /// Output directory (overrides config)
    #[arg(long)]
    pub out_dir: Option<String>,

    /// Number of gradient components to fit (overrides config)
    #[arg(long)]
    pub n_components: Option<usize>,

    /// Random state for the eigensolver (overrides config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Load this correlation matrix (.npy) instead of computing one
    #[arg(long, value_name = "NPY")]
    pub reuse_correlation: Option<String>,

    /// Skip PNG rendering
    #[arg(long, default_value_t = false)]
    pub no_render: bool,
}

impl Args {
    /// Command-line values win over the file.
    pub fn apply(&self, cfg: &mut AppConfig) {
        if let Some(dir) = &self.out_dir {
            cfg.output.dir = dir.clone();
        }
        if let Some(k) = self.n_components {
            cfg.gradients.n_components = k;
            cfg.render.n_mapped = cfg.render.n_mapped.min(k);
        }
        if let Some(seed) = self.seed {
            cfg.gradients.random_state = seed;
        }
        if let Some(path) = &self.reuse_correlation {
            cfg.output.reuse_correlation = Some(path.clone());
        }
        if self.no_render {
            cfg.render.enabled = false;
        }
    }
}
