//! Tensor Primitives
//!
//! Device-tagged dense `f32` tensors backed by `ndarray`, batch stacking along a new
//! leading axis, and the encoded state dict format read by the model loader.

mod device;
mod stack;
mod state_dict;
mod tensor;

pub use device::Device;
pub use stack::stack;
pub use state_dict::{decode_state_dict, encode_state_dict, StateDict};
pub use tensor::{convert_to_device, Tensor};

use thiserror::Error;

/// Tensor errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Cannot stack tensor {index}: expected shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Cannot stack tensor {index}: expected device {expected}, got {actual}")]
    DeviceMismatch {
        index: usize,
        expected: Device,
        actual: Device,
    },

    #[error("Cannot stack an empty sequence of tensors")]
    EmptyBatch,

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("State dict encoding failed: {0}")]
    Encode(String),

    #[error("State dict decoding failed: {0}")]
    Decode(String),
}
