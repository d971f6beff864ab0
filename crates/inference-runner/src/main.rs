//! Inference Runner - Main Entry Point

use anyhow::Context;
use inference_runner::{init_logging, run, RunnerConfig};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let config = RunnerConfig::load(config_path.as_deref())
        .with_context(|| format!("loading config {:?}", config_path))?;

    init_logging(config.log_json);
    info!("=== Inference Runner v{} ===", env!("CARGO_PKG_VERSION"));

    let stdout = std::io::stdout();
    let summary = run(&config, &mut stdout.lock())?;

    info!(
        "Processed {} examples in {} batches ({} bytes)",
        summary.examples, summary.batches, summary.bytes
    );
    Ok(())
}
