//! Host pipeline contract and state shared by both handlers

use filesystems::FileSystems;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tensor::Device;
use tracing::info;

use crate::{
    load_model, DeviceRuntime, HandlerError, HostRuntime, InferenceArgs, ModelConstructor,
    ModelParams, Module, PredictionResult,
};

/// Namespace for metrics collected while running these handlers
pub const METRICS_NAMESPACE: &str = "RunInference_Tensor";

/// Batch size hints for the host pipeline's dynamic batcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchingHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<usize>,
}

impl BatchingHints {
    pub fn is_empty(&self) -> bool {
        self.min_batch_size.is_none() && self.max_batch_size.is_none()
    }
}

/// What a host pipeline needs from a model handler.
///
/// The pipeline calls [`load_model`](Self::load_model) once per worker before
/// any [`run_inference`](Self::run_inference) call, and does not mutate the
/// model while inference runs.
pub trait ModelHandler {
    /// One element of a batch
    type Example;
    /// The loaded model
    type Model;

    /// Load and initialise the model
    fn load_model(&mut self) -> Result<Self::Model, HandlerError>;

    /// Run one batch; returns one result per example, in batch order
    fn run_inference(
        &self,
        batch: &[Self::Example],
        model: &Self::Model,
        inference_args: Option<&InferenceArgs>,
    ) -> Result<Vec<PredictionResult<Self::Example>>, HandlerError>;

    /// Size of the batch data in bytes
    fn num_bytes(&self, batch: &[Self::Example]) -> usize;

    fn metrics_namespace(&self) -> &'static str {
        METRICS_NAMESPACE
    }

    /// Check extra inference arguments before the pipeline starts.
    ///
    /// Accepts everything; bad arguments surface from the model call itself.
    fn validate_inference_args(&self, _inference_args: Option<&InferenceArgs>) -> Result<(), HandlerError> {
        Ok(())
    }

    fn batch_elements_kwargs(&self) -> BatchingHints;

    /// Point subsequent loads at a new weights path; `None` or empty keeps the current one
    fn update_model_path(&mut self, model_path: Option<&str>);
}

/// Loading state common to the plain and keyed handlers
pub(crate) struct HandlerCore<M> {
    pub(crate) state_dict_path: String,
    pub(crate) device: Device,
    pub(crate) batching: BatchingHints,
    constructor: ModelConstructor<M>,
    model_params: ModelParams,
    filesystems: FileSystems,
    runtime: Arc<dyn DeviceRuntime>,
}

impl<M: Module> HandlerCore<M> {
    pub(crate) fn new(
        state_dict_path: String,
        constructor: ModelConstructor<M>,
        model_params: ModelParams,
        device: Device,
    ) -> Self {
        match device {
            Device::Accelerator => info!("Device is set to accelerator"),
            Device::Cpu => info!("Device is set to CPU"),
        }
        Self {
            state_dict_path,
            device,
            batching: BatchingHints::default(),
            constructor,
            model_params,
            filesystems: FileSystems::new(),
            runtime: Arc::new(HostRuntime),
        }
    }

    pub(crate) fn set_filesystems(&mut self, filesystems: FileSystems) {
        self.filesystems = filesystems;
    }

    pub(crate) fn set_runtime(&mut self, runtime: Arc<dyn DeviceRuntime>) {
        self.runtime = runtime;
    }

    /// Load without touching handler state
    pub(crate) fn load(&self) -> Result<(M, Device), HandlerError> {
        load_model(
            &self.constructor,
            &self.model_params,
            &self.state_dict_path,
            self.device,
            &self.filesystems,
            self.runtime.as_ref(),
        )
    }

    /// Load and keep the device actually used for later inference calls
    pub(crate) fn load_and_record(&mut self) -> Result<M, HandlerError> {
        let (model, device) = self.load()?;
        if device != self.device {
            info!("Handler device downgraded from {} to {}", self.device, device);
            self.device = device;
        }
        Ok(model)
    }

    pub(crate) fn update_model_path(&mut self, model_path: Option<&str>) {
        if let Some(path) = model_path.filter(|p| !p.is_empty()) {
            info!("Updating model path from {} to {}", self.state_dict_path, path);
            self.state_dict_path = path.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batching_hints_serialize_only_set_values() {
        let hints = BatchingHints {
            min_batch_size: None,
            max_batch_size: Some(64),
        };
        assert_eq!(serde_json::to_string(&hints).unwrap(), r#"{"max_batch_size":64}"#);
        assert!(!hints.is_empty());
        assert!(BatchingHints::default().is_empty());
    }
}
