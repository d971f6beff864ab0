//! Keyed tensor handler

use filesystems::FileSystems;
use std::sync::Arc;
use tensor::{Device, Tensor};

use crate::handler::HandlerCore;
use crate::{
    BatchingHints, DeviceRuntime, HandlerConfig, HandlerError, InferenceArgs, KeyedTensor,
    KeyedTensorInferenceFn, ModelHandler, ModelParams, Module, PredictionResult,
};

/// Handler for batches of keyed tensors.
///
/// Every example maps the same input names to same-shaped tensors. Tensors are
/// grouped by name across the batch, stacked, and passed to the model as named
/// inputs in a single call.
pub struct KeyedTensorModelHandler<M> {
    core: HandlerCore<M>,
    inference_fn: KeyedTensorInferenceFn<M>,
}

impl<M: Module> KeyedTensorModelHandler<M> {
    pub fn new<F>(
        state_dict_path: impl Into<String>,
        constructor: F,
        model_params: ModelParams,
        device: Device,
    ) -> Self
    where
        F: Fn(&ModelParams) -> Result<M, HandlerError> + Send + Sync + 'static,
    {
        Self {
            core: HandlerCore::new(state_dict_path.into(), Arc::new(constructor), model_params, device),
            inference_fn: KeyedTensorInferenceFn::Forward,
        }
    }

    pub fn from_config<F>(config: &HandlerConfig, constructor: F) -> Result<Self, HandlerError>
    where
        F: Fn(&ModelParams) -> Result<M, HandlerError> + Send + Sync + 'static,
    {
        let mut handler = Self::new(
            config.state_dict_path.clone(),
            constructor,
            config.model_params.clone(),
            config.device(),
        );
        if let Some(name) = &config.inference_method {
            handler.inference_fn = KeyedTensorInferenceFn::named(name)?;
        }
        handler.core.batching = BatchingHints {
            min_batch_size: config.min_batch_size,
            max_batch_size: config.max_batch_size,
        };
        Ok(handler)
    }

    pub fn with_inference_fn(mut self, inference_fn: KeyedTensorInferenceFn<M>) -> Self {
        self.inference_fn = inference_fn;
        self
    }

    pub fn with_min_batch_size(mut self, min_batch_size: usize) -> Self {
        self.core.batching.min_batch_size = Some(min_batch_size);
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.core.batching.max_batch_size = Some(max_batch_size);
        self
    }

    pub fn with_filesystems(mut self, filesystems: FileSystems) -> Self {
        self.core.set_filesystems(filesystems);
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn DeviceRuntime>) -> Self {
        self.core.set_runtime(runtime);
        self
    }

    pub fn load(&self) -> Result<(M, Device), HandlerError> {
        self.core.load()
    }

    pub fn device(&self) -> Device {
        self.core.device
    }

    pub fn state_dict_path(&self) -> &str {
        &self.core.state_dict_path
    }
}

impl<M: Module> ModelHandler for KeyedTensorModelHandler<M> {
    type Example = KeyedTensor;
    type Model = M;

    fn load_model(&mut self) -> Result<M, HandlerError> {
        self.core.load_and_record()
    }

    fn run_inference(
        &self,
        batch: &[KeyedTensor],
        model: &M,
        inference_args: Option<&InferenceArgs>,
    ) -> Result<Vec<PredictionResult<KeyedTensor>>, HandlerError> {
        let empty = InferenceArgs::new();
        self.inference_fn.call(
            batch,
            model,
            self.core.device,
            inference_args.unwrap_or(&empty),
            Some(&self.core.state_dict_path),
        )
    }

    fn num_bytes(&self, batch: &[KeyedTensor]) -> usize {
        batch
            .iter()
            .flat_map(|example| example.values())
            .map(Tensor::num_bytes)
            .sum()
    }

    fn batch_elements_kwargs(&self) -> BatchingHints {
        self.core.batching
    }

    fn update_model_path(&mut self, model_path: Option<&str>) {
        self.core.update_model_path(model_path);
    }
}
