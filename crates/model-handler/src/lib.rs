//! Model Handlers
//!
//! Adapts a trained model to the batch-inference contract of a host pipeline:
//! - Load weights from a storage path, falling back to CPU when the accelerator
//!   is missing or loading onto it fails
//! - Stack a batch of tensors (or keyed tensors) into one vectorized model call
//! - Pair every input example with its slice of the model output

mod config;
mod handler;
mod inference;
mod keyed;
mod loader;
mod module;
mod result;
mod runtime;
mod tensor_handler;

pub use config::HandlerConfig;
pub use handler::{BatchingHints, ModelHandler, METRICS_NAMESPACE};
pub use inference::{
    default_keyed_tensor_inference_fn, default_tensor_inference_fn, make_keyed_tensor_model_fn,
    make_tensor_model_fn, KeyedTensorInferenceFn, TensorInferenceFn,
};
pub use keyed::KeyedTensorModelHandler;
pub use loader::{load_model, ModelConstructor};
pub use module::{KeyedMethod, KeyedTensor, ModelOutput, Module, TensorMethod};
pub use result::{convert_to_result, PredictionResult};
pub use runtime::{DeviceRuntime, HostRuntime};
pub use tensor_handler::TensorModelHandler;

pub use filesystems::{FileSystems, FsError};
pub use tensor::{Device, Tensor, TensorError};

use thiserror::Error;

/// Keyword arguments passed to the model on every call, not batched
pub type InferenceArgs = serde_json::Map<String, serde_json::Value>;

/// Keyword arguments used to construct the model
pub type ModelParams = serde_json::Map<String, serde_json::Value>;

/// Handler errors
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Storage error: {0}")]
    Storage(#[from] FsError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    #[error("Allocation on {device} failed: {reason}")]
    DeviceAllocation { device: Device, reason: String },

    #[error("Model construction failed: {0}")]
    ModelConstruction(String),

    #[error("Invalid state dict: {0}")]
    StateDict(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Key '{key}' present in {actual} of {expected} examples")]
    MissingKey {
        key: String,
        expected: usize,
        actual: usize,
    },

    #[error("Model returned {actual} predictions for a batch of {expected}")]
    OutputMismatch { expected: usize, actual: usize },

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
