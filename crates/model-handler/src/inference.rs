//! Batch-to-prediction functions
//!
//! Each function stacks a batch into one tensor per input slot, moves it to
//! the model's device, calls the model once and pairs the outputs with the
//! inputs. The model entry point is chosen from a closed set: the default
//! `forward`, or a method the model publishes through its method table.

use std::collections::BTreeMap;
use std::fmt;
use tensor::{convert_to_device, stack, Device, Tensor};
use tracing::debug;

use crate::{
    convert_to_result, HandlerError, InferenceArgs, KeyedMethod, KeyedTensor, Module,
    PredictionResult, TensorMethod,
};

/// How a plain tensor batch is handed to the model
pub enum TensorInferenceFn<M> {
    /// Call [`Module::forward`]
    Forward,
    /// Call an alternate entry point
    Method(TensorMethod<M>),
}

impl<M: Module> TensorInferenceFn<M> {
    /// Resolve a method name through the model's method table
    pub fn named(name: &str) -> Result<Self, HandlerError> {
        M::tensor_method(name)
            .map(TensorInferenceFn::Method)
            .ok_or_else(|| HandlerError::Config(format!("model has no tensor method '{}'", name)))
    }

    /// Run the batch through the model
    pub fn call(
        &self,
        batch: &[Tensor],
        model: &M,
        device: Device,
        inference_args: &InferenceArgs,
        model_id: Option<&str>,
    ) -> Result<Vec<PredictionResult<Tensor>>, HandlerError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let batched = convert_to_device(stack(batch)?, device);
        debug!("Running model on batch {:?} ({})", batched.shape(), device);

        let predictions = match self {
            TensorInferenceFn::Forward => model.forward(batched, inference_args)?,
            TensorInferenceFn::Method(method) => method(model, batched, inference_args)?,
        };

        convert_to_result(batch, predictions, model_id)
    }
}

impl<M> Default for TensorInferenceFn<M> {
    fn default() -> Self {
        TensorInferenceFn::Forward
    }
}

impl<M> Clone for TensorInferenceFn<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for TensorInferenceFn<M> {}

impl<M> fmt::Debug for TensorInferenceFn<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorInferenceFn::Forward => f.write_str("Forward"),
            TensorInferenceFn::Method(_) => f.write_str("Method"),
        }
    }
}

/// How a keyed tensor batch is handed to the model
pub enum KeyedTensorInferenceFn<M> {
    /// Call [`Module::forward_keyed`]
    Forward,
    /// Call an alternate entry point
    Method(KeyedMethod<M>),
}

impl<M: Module> KeyedTensorInferenceFn<M> {
    /// Resolve a method name through the model's method table
    pub fn named(name: &str) -> Result<Self, HandlerError> {
        M::keyed_method(name)
            .map(KeyedTensorInferenceFn::Method)
            .ok_or_else(|| HandlerError::Config(format!("model has no keyed method '{}'", name)))
    }

    /// Group the batch by key, stack each key and run the model once
    pub fn call(
        &self,
        batch: &[KeyedTensor],
        model: &M,
        device: Device,
        inference_args: &InferenceArgs,
        model_id: Option<&str>,
    ) -> Result<Vec<PredictionResult<KeyedTensor>>, HandlerError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let batched = stack_by_key(batch, device)?;
        debug!("Running model on keyed batch of {} with keys {:?}", batch.len(), batched.keys());

        let predictions = match self {
            KeyedTensorInferenceFn::Forward => model.forward_keyed(batched, inference_args)?,
            KeyedTensorInferenceFn::Method(method) => method(model, batched, inference_args)?,
        };

        convert_to_result(batch, predictions, model_id)
    }
}

impl<M> Default for KeyedTensorInferenceFn<M> {
    fn default() -> Self {
        KeyedTensorInferenceFn::Forward
    }
}

impl<M> Clone for KeyedTensorInferenceFn<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for KeyedTensorInferenceFn<M> {}

impl<M> fmt::Debug for KeyedTensorInferenceFn<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyedTensorInferenceFn::Forward => f.write_str("Forward"),
            KeyedTensorInferenceFn::Method(_) => f.write_str("Method"),
        }
    }
}

/// Collect each key's tensors in batch order and stack them on `device`
fn stack_by_key(batch: &[KeyedTensor], device: Device) -> Result<KeyedTensor, HandlerError> {
    let mut grouped: BTreeMap<&str, Vec<&Tensor>> = BTreeMap::new();
    for example in batch {
        for (key, tensor) in example {
            grouped.entry(key.as_str()).or_default().push(tensor);
        }
    }

    let mut batched = KeyedTensor::new();
    for (key, tensors) in grouped {
        if tensors.len() != batch.len() {
            return Err(HandlerError::MissingKey {
                key: key.to_string(),
                expected: batch.len(),
                actual: tensors.len(),
            });
        }
        let stacked = convert_to_device(stack(tensors)?, device);
        batched.insert(key.to_string(), stacked);
    }
    Ok(batched)
}

/// Stack `batch`, call `model.forward` and pair outputs with inputs
pub fn default_tensor_inference_fn<M: Module>(
    batch: &[Tensor],
    model: &M,
    device: Device,
    inference_args: Option<&InferenceArgs>,
    model_id: Option<&str>,
) -> Result<Vec<PredictionResult<Tensor>>, HandlerError> {
    let empty = InferenceArgs::new();
    TensorInferenceFn::Forward.call(batch, model, device, inference_args.unwrap_or(&empty), model_id)
}

/// Inference function that calls `method` instead of `forward`
pub fn make_tensor_model_fn<M: Module>(method: TensorMethod<M>) -> TensorInferenceFn<M> {
    TensorInferenceFn::Method(method)
}

/// Group `batch` by key, call `model.forward_keyed` and pair outputs with inputs
pub fn default_keyed_tensor_inference_fn<M: Module>(
    batch: &[KeyedTensor],
    model: &M,
    device: Device,
    inference_args: Option<&InferenceArgs>,
    model_id: Option<&str>,
) -> Result<Vec<PredictionResult<KeyedTensor>>, HandlerError> {
    let empty = InferenceArgs::new();
    KeyedTensorInferenceFn::Forward.call(batch, model, device, inference_args.unwrap_or(&empty), model_id)
}

/// Keyed inference function that calls `method` instead of `forward_keyed`
pub fn make_keyed_tensor_model_fn<M: Module>(method: KeyedMethod<M>) -> KeyedTensorInferenceFn<M> {
    KeyedTensorInferenceFn::Method(method)
}
