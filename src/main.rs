// Entry point: load config, apply command-line overrides, run the pipeline.
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gradprep::cli::Args;
use gradprep::config::AppConfig;
use gradprep::pipeline;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut cfg = AppConfig::load_or_default(&args.config);
    args.apply(&mut cfg);
    cfg.validate()?;
    info!(config = %args.config, out_dir = %cfg.output.dir, "starting run");

    let output = pipeline::run(&cfg)?;
    info!(
        parcels = output.summary.n_parcels,
        embedded = output.embedding_mask.len(),
        components = output.gradients.n_components(),
        "done"
    );
    Ok(())
}
