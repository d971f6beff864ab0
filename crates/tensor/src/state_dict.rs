//! State dict encoding
//!
//! Weights are stored as a postcard-encoded map from parameter name to array.
//! Decoded tensors are host (CPU) resident; placing them on a device is up to
//! the caller.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::{Tensor, TensorError};

/// Named model parameters
pub type StateDict = BTreeMap<String, Tensor>;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct EncodedStateDict {
    version: u32,
    tensors: BTreeMap<String, ArrayD<f32>>,
}

/// Encode a state dict to bytes
pub fn encode_state_dict(state_dict: &StateDict) -> Result<Vec<u8>, TensorError> {
    let encoded = EncodedStateDict {
        version: FORMAT_VERSION,
        tensors: state_dict
            .iter()
            .map(|(name, tensor)| (name.clone(), tensor.data().clone()))
            .collect(),
    };
    postcard::to_allocvec(&encoded).map_err(|e| TensorError::Encode(e.to_string()))
}

/// Decode a state dict from bytes into CPU tensors
pub fn decode_state_dict(bytes: &[u8]) -> Result<StateDict, TensorError> {
    let encoded: EncodedStateDict =
        postcard::from_bytes(bytes).map_err(|e| TensorError::Decode(e.to_string()))?;

    if encoded.version != FORMAT_VERSION {
        return Err(TensorError::Decode(format!(
            "unsupported format version {} (expected {})",
            encoded.version, FORMAT_VERSION
        )));
    }

    debug!("Decoded state dict with {} tensors", encoded.tensors.len());
    Ok(encoded
        .tensors
        .into_iter()
        .map(|(name, data)| (name, Tensor::new(data)))
        .collect())
}
