//! Model contract

use std::collections::BTreeMap;
use tensor::{Device, StateDict, Tensor};

use crate::{HandlerError, InferenceArgs};

/// One example (or one batch) of named input tensors
pub type KeyedTensor = BTreeMap<String, Tensor>;

/// Alternate entry point taking a batched tensor
pub type TensorMethod<M> = fn(&M, Tensor, &InferenceArgs) -> Result<ModelOutput, HandlerError>;

/// Alternate entry point taking batched tensors by name
pub type KeyedMethod<M> = fn(&M, KeyedTensor, &InferenceArgs) -> Result<ModelOutput, HandlerError>;

/// Output of a model call
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// A single tensor
    Tensor(Tensor),
    /// Named output tensors
    Keyed(KeyedTensor),
}

impl ModelOutput {
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            ModelOutput::Tensor(t) => Some(t),
            ModelOutput::Keyed(_) => None,
        }
    }

    pub fn as_keyed(&self) -> Option<&KeyedTensor> {
        match self {
            ModelOutput::Tensor(_) => None,
            ModelOutput::Keyed(k) => Some(k),
        }
    }
}

impl From<Tensor> for ModelOutput {
    fn from(tensor: Tensor) -> Self {
        ModelOutput::Tensor(tensor)
    }
}

impl From<KeyedTensor> for ModelOutput {
    fn from(outputs: KeyedTensor) -> Self {
        ModelOutput::Keyed(outputs)
    }
}

/// A model that can be loaded from a state dict and invoked on batches.
///
/// Implementations are always called with batched inputs (leading batch
/// dimension) already resident on the model's device. Inference never tracks
/// gradients: after [`Module::eval`] the model is read-only.
pub trait Module {
    /// Apply loaded weights
    fn load_state_dict(&mut self, state_dict: StateDict) -> Result<(), HandlerError>;

    /// Move parameters to `device`
    fn to_device(&mut self, device: Device);

    /// Switch to inference mode
    fn eval(&mut self);

    /// Default entry point for plain tensor batches
    fn forward(&self, input: Tensor, args: &InferenceArgs) -> Result<ModelOutput, HandlerError>;

    /// Default entry point for keyed tensor batches
    fn forward_keyed(
        &self,
        _inputs: KeyedTensor,
        _args: &InferenceArgs,
    ) -> Result<ModelOutput, HandlerError> {
        Err(HandlerError::UnsupportedInput(
            "model does not accept keyed inputs".to_string(),
        ))
    }

    /// Alternate plain-tensor entry points this model publishes, by name
    fn tensor_method(_name: &str) -> Option<TensorMethod<Self>>
    where
        Self: Sized,
    {
        None
    }

    /// Alternate keyed-tensor entry points this model publishes, by name
    fn keyed_method(_name: &str) -> Option<KeyedMethod<Self>>
    where
        Self: Sized,
    {
        None
    }
}
