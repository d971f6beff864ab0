//! Handler configuration

use serde::{Deserialize, Serialize};
use tensor::Device;
use tracing::warn;

use crate::ModelParams;

/// Handler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Path of the serialized state dict
    pub state_dict_path: String,

    /// Requested device: `"GPU"`, `"CUDA"` or `"ACCELERATOR"` (any case) select the
    /// accelerator, `"CPU"` the CPU. Other names fall back to the CPU with a warning.
    pub device: String,

    /// Keyword arguments for the model constructor
    pub model_params: ModelParams,

    /// Batch size hints for the host pipeline
    pub min_batch_size: Option<usize>,
    pub max_batch_size: Option<usize>,

    /// Name of an alternate entry point from the model's method table
    pub inference_method: Option<String>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            state_dict_path: String::new(),
            device: "CPU".to_string(),
            model_params: ModelParams::new(),
            min_batch_size: None,
            max_batch_size: None,
            inference_method: None,
        }
    }
}

impl HandlerConfig {
    /// Requested device. Unrecognised names select the CPU.
    pub fn device(&self) -> Device {
        self.device.parse().unwrap_or_else(|_| {
            warn!("Unknown device '{}', using CPU", self.device);
            Device::Cpu
        })
    }
}
