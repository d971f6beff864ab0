//! Built-in linear regression model

use ndarray::{Array1, Array2, Ix1, Ix2};
use model_handler::{
    Device, HandlerError, InferenceArgs, KeyedMethod, KeyedTensor, ModelOutput, ModelParams,
    Module, Tensor, TensorMethod,
};
use tensor::StateDict;
use tracing::debug;

/// Parameter names in the state dict
pub const WEIGHT_KEY: &str = "linear.weight";
pub const BIAS_KEY: &str = "linear.bias";

/// Input name used for keyed batches
pub const KEYED_INPUT: &str = "x";

/// `y = x W^T + b` over `(batch, input_dim)` inputs
#[derive(Debug, Clone)]
pub struct LinearRegression {
    weight: Array2<f32>,
    bias: Array1<f32>,
    device: Device,
    training: bool,
}

impl LinearRegression {
    /// Build from `input_dim` and `output_dim` (default 1) params, zero-initialised
    pub fn from_params(params: &ModelParams) -> Result<Self, HandlerError> {
        let input_dim = dim(params, "input_dim")?
            .ok_or_else(|| HandlerError::ModelConstruction("missing 'input_dim'".to_string()))?;
        let output_dim = dim(params, "output_dim")?.unwrap_or(1);

        let fits = output_dim
            .checked_mul(input_dim)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
            .map_or(false, |bytes| bytes <= isize::MAX as usize);
        if !fits {
            return Err(HandlerError::ModelConstruction(format!(
                "weight shape ({}, {}) is too large",
                output_dim, input_dim
            )));
        }

        Ok(Self {
            weight: Array2::zeros((output_dim, input_dim)),
            bias: Array1::zeros(output_dim),
            device: Device::Cpu,
            training: true,
        })
    }

    /// State dict holding the given weights, for writing model files
    pub fn state_dict(weight: Array2<f32>, bias: Array1<f32>) -> StateDict {
        let mut state = StateDict::new();
        state.insert(WEIGHT_KEY.to_string(), Tensor::new(weight.into_dyn()));
        state.insert(BIAS_KEY.to_string(), Tensor::new(bias.into_dyn()));
        state
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    fn linear(&self, input: &Tensor) -> Result<Tensor, HandlerError> {
        let x = input
            .data()
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|e| HandlerError::Inference(format!("expected (batch, features) input: {}", e)))?;
        if x.ncols() != self.weight.ncols() {
            return Err(HandlerError::Inference(format!(
                "expected {} features, got {}",
                self.weight.ncols(),
                x.ncols()
            )));
        }
        let y = x.dot(&self.weight.t()) + &self.bias;
        Ok(Tensor::new(y.into_dyn()).on(input.device()))
    }

    fn sigmoid(&self, input: Tensor, _args: &InferenceArgs) -> Result<ModelOutput, HandlerError> {
        Ok(self.linear(&input)?.map(|v| 1.0 / (1.0 + (-v).exp())).into())
    }

    fn sigmoid_keyed(&self, mut inputs: KeyedTensor, args: &InferenceArgs) -> Result<ModelOutput, HandlerError> {
        let x = take_input(&mut inputs)?;
        self.sigmoid(x, args)
    }
}

fn dim(params: &ModelParams, name: &str) -> Result<Option<usize>, HandlerError> {
    match params.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .filter(|&v| v > 0)
            .and_then(|v| usize::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| HandlerError::ModelConstruction(format!("'{}' must be a positive integer", name))),
    }
}

fn take_input(inputs: &mut KeyedTensor) -> Result<Tensor, HandlerError> {
    inputs
        .remove(KEYED_INPUT)
        .ok_or_else(|| HandlerError::Inference(format!("missing keyed input '{}'", KEYED_INPUT)))
}

impl Module for LinearRegression {
    fn load_state_dict(&mut self, mut state_dict: StateDict) -> Result<(), HandlerError> {
        let weight = state_dict
            .remove(WEIGHT_KEY)
            .ok_or_else(|| HandlerError::StateDict(format!("missing '{}'", WEIGHT_KEY)))?;
        let bias = state_dict
            .remove(BIAS_KEY)
            .ok_or_else(|| HandlerError::StateDict(format!("missing '{}'", BIAS_KEY)))?;

        let weight = weight
            .into_data()
            .into_dimensionality::<Ix2>()
            .map_err(|e| HandlerError::StateDict(format!("{}: {}", WEIGHT_KEY, e)))?;
        let bias = bias
            .into_data()
            .into_dimensionality::<Ix1>()
            .map_err(|e| HandlerError::StateDict(format!("{}: {}", BIAS_KEY, e)))?;

        if weight.dim() != self.weight.dim() || bias.dim() != self.bias.dim() {
            return Err(HandlerError::StateDict(format!(
                "shape mismatch: weight {:?} bias {:?}, expected {:?} and {:?}",
                weight.dim(),
                bias.dim(),
                self.weight.dim(),
                self.bias.dim()
            )));
        }

        self.weight = weight;
        self.bias = bias;
        Ok(())
    }

    fn to_device(&mut self, device: Device) {
        debug!("Moving linear model to {}", device);
        self.device = device;
    }

    fn eval(&mut self) {
        self.training = false;
    }

    fn forward(&self, input: Tensor, _args: &InferenceArgs) -> Result<ModelOutput, HandlerError> {
        Ok(self.linear(&input)?.into())
    }

    fn forward_keyed(&self, mut inputs: KeyedTensor, args: &InferenceArgs) -> Result<ModelOutput, HandlerError> {
        let x = take_input(&mut inputs)?;
        self.forward(x, args)
    }

    fn tensor_method(name: &str) -> Option<TensorMethod<Self>> {
        match name {
            "sigmoid" => Some(Self::sigmoid as TensorMethod<Self>),
            _ => None,
        }
    }

    fn keyed_method(name: &str) -> Option<KeyedMethod<Self>> {
        match name {
            "sigmoid" => Some(Self::sigmoid_keyed as KeyedMethod<Self>),
            _ => None,
        }
    }
}
