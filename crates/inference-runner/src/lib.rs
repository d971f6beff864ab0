//! Inference Runner
//!
//! Drives a model handler the way a host pipeline would: load the model once,
//! split JSON-lines input into batches, run each batch and write one JSON line
//! per prediction.

mod config;
mod linear;
mod runner;

pub use config::RunnerConfig;
pub use linear::LinearRegression;
pub use runner::{run, run_batches, run_with, PredictionRecord, RunSummary, TensorJson, DEFAULT_BATCH_SIZE};

use model_handler::HandlerError;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Runner errors
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] filesystems::FsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input on line {line}: {source}")]
    Input {
        line: usize,
        source: serde_json::Error,
    },

    #[error("Failed to encode prediction: {0}")]
    Output(#[from] serde_json::Error),
}

/// Install the global tracing subscriber.
///
/// The level comes from `RUST_LOG` (default `info`); `json` selects
/// structured output.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("Logging already initialised: {}", e);
    }
}
