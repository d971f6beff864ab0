//! Plain tensor handler

use filesystems::FileSystems;
use std::sync::Arc;
use tensor::{Device, Tensor};

use crate::handler::HandlerCore;
use crate::{
    BatchingHints, DeviceRuntime, HandlerConfig, HandlerError, InferenceArgs, ModelHandler,
    ModelParams, Module, PredictionResult, TensorInferenceFn,
};

/// Handler for batches of plain tensors.
///
/// Every tensor in a batch must have the same shape; the batch is stacked into
/// one `(batch_size, ...)` tensor and passed to the model in a single call.
pub struct TensorModelHandler<M> {
    core: HandlerCore<M>,
    inference_fn: TensorInferenceFn<M>,
}

impl<M: Module> TensorModelHandler<M> {
    /// Create a handler that builds models with `constructor(model_params)` and
    /// loads weights from `state_dict_path`
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
            inference_fn: TensorInferenceFn::Forward,
        }
    }

    /// Create a handler from configuration
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
            handler.inference_fn = TensorInferenceFn::named(name)?;
        }
        handler.core.batching = BatchingHints {
            min_batch_size: config.min_batch_size,
            max_batch_size: config.max_batch_size,
        };
        Ok(handler)
    }

    pub fn with_inference_fn(mut self, inference_fn: TensorInferenceFn<M>) -> Self {
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

    /// Storage used to read weights
    pub fn with_filesystems(mut self, filesystems: FileSystems) -> Self {
        self.core.set_filesystems(filesystems);
        self
    }

    /// Device runtime used for availability checks and weight placement
    pub fn with_runtime(mut self, runtime: Arc<dyn DeviceRuntime>) -> Self {
        self.core.set_runtime(runtime);
        self
    }

    /// Load the model without recording the resolved device
    pub fn load(&self) -> Result<(M, Device), HandlerError> {
        self.core.load()
    }

    /// Device used for inference (CPU after a fallback)
    pub fn device(&self) -> Device {
        self.core.device
    }

    pub fn state_dict_path(&self) -> &str {
        &self.core.state_dict_path
    }
}

impl<M: Module> ModelHandler for TensorModelHandler<M> {
    type Example = Tensor;
    type Model = M;

    fn load_model(&mut self) -> Result<M, HandlerError> {
        self.core.load_and_record()
    }

    fn run_inference(
        &self,
        batch: &[Tensor],
        model: &M,
        inference_args: Option<&InferenceArgs>,
    ) -> Result<Vec<PredictionResult<Tensor>>, HandlerError> {
        let empty = InferenceArgs::new();
        self.inference_fn.call(
            batch,
            model,
            self.core.device,
            inference_args.unwrap_or(&empty),
            Some(&self.core.state_dict_path),
        )
    }

    fn num_bytes(&self, batch: &[Tensor]) -> usize {
        batch.iter().map(Tensor::num_bytes).sum()
    }

    fn batch_elements_kwargs(&self) -> BatchingHints {
        self.core.batching
    }

    fn update_model_path(&mut self, model_path: Option<&str>) {
        self.core.update_model_path(model_path);
    }
}
