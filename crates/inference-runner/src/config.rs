//! Runner configuration

use model_handler::{HandlerConfig, InferenceArgs};
use serde::{Deserialize, Serialize};

use crate::RunnerError;

/// Environment variable prefix for overrides, e.g. `RUNINFERENCE__HANDLER__DEVICE=GPU`
pub const ENV_PREFIX: &str = "RUNINFERENCE";

/// Runner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Model handler settings
    pub handler: HandlerConfig,

    /// JSON-lines input: one array per line, or one object of arrays when `keyed`
    pub input_path: String,

    /// Treat input lines as keyed tensors
    pub keyed: bool,

    /// Extra arguments passed to every model call
    pub inference_args: InferenceArgs,

    /// Emit logs as JSON
    pub log_json: bool,
}

impl RunnerConfig {
    /// Load from an optional config file, then apply environment overrides
    pub fn load(path: Option<&str>) -> Result<Self, RunnerError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}
