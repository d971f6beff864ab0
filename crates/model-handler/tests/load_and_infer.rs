//! End-to-end handler tests: weights in an in-memory filesystem, fake device runtimes

use filesystems::MemoryFileSystem;
use model_handler::{
    Device, DeviceRuntime, FileSystems, HandlerError, InferenceArgs, KeyedTensor,
    KeyedTensorModelHandler, ModelHandler, ModelOutput, ModelParams, Module, Tensor,
    TensorModelHandler, METRICS_NAMESPACE,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tensor::{encode_state_dict, StateDict};

/// y = x * scale + shift, applied elementwise
struct Affine {
    scale: f32,
    shift: f32,
    device: Device,
}

impl Affine {
    fn new(params: &ModelParams) -> Result<Self, HandlerError> {
        let shift = params
            .get("shift")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| HandlerError::ModelConstruction("missing 'shift'".to_string()))?;
        Ok(Self {
            scale: 0.0,
            shift: shift as f32,
            device: Device::Cpu,
        })
    }
}

impl Module for Affine {
    fn load_state_dict(&mut self, state_dict: StateDict) -> Result<(), HandlerError> {
        let scale = state_dict
            .get("scale")
            .ok_or_else(|| HandlerError::StateDict("missing 'scale'".to_string()))?;
        self.scale = scale.to_vec()[0];
        Ok(())
    }

    fn to_device(&mut self, device: Device) {
        self.device = device;
    }

    fn eval(&mut self) {}

    fn forward(&self, input: Tensor, args: &InferenceArgs) -> Result<ModelOutput, HandlerError> {
        if input.device() != self.device {
            return Err(HandlerError::Inference(format!(
                "input on {}, model on {}",
                input.device(),
                self.device
            )));
        }
        let extra = args.get("offset").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
        Ok(input.map(|v| v * self.scale + self.shift + extra).into())
    }

    fn forward_keyed(&self, inputs: KeyedTensor, args: &InferenceArgs) -> Result<ModelOutput, HandlerError> {
        let x = inputs
            .get("x")
            .cloned()
            .ok_or_else(|| HandlerError::Inference("missing 'x'".to_string()))?;
        self.forward(x, args)
    }
}

/// Runtime with an accelerator whose first `failures` placements fail
struct FlakyAccelerator {
    failures: AtomicUsize,
}

impl FlakyAccelerator {
    fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(times),
        })
    }
}

impl DeviceRuntime for FlakyAccelerator {
    fn is_available(&self, _device: Device) -> bool {
        true
    }

    fn place(&self, tensor: Tensor, device: Device) -> Result<Tensor, HandlerError> {
        if device.is_accelerator() {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(HandlerError::DeviceAllocation {
                    device,
                    reason: "out of memory".to_string(),
                });
            }
        }
        Ok(tensor.to(device))
    }
}

fn weights(path: &str, scale: f32) -> FileSystems {
    let mut state = StateDict::new();
    state.insert("scale".to_string(), Tensor::from(vec![scale]));

    let mem = MemoryFileSystem::new();
    mem.insert(path, encode_state_dict(&state).unwrap()).unwrap();
    FileSystems::new().with(Arc::new(mem))
}

fn params(shift: f64) -> ModelParams {
    let mut params = ModelParams::new();
    params.insert("shift".to_string(), shift.into());
    params
}

fn tensor_handler(device: Device) -> TensorModelHandler<Affine> {
    TensorModelHandler::new("mem://affine.bin", Affine::new, params(1.0), device)
        .with_filesystems(weights("mem://affine.bin", 2.0))
}

#[test]
fn test_load_and_infer_on_cpu() {
    let mut handler = tensor_handler(Device::Cpu);
    let model = handler.load_model().unwrap();

    let batch = vec![Tensor::from(vec![1.0, 2.0]), Tensor::from(vec![3.0, 4.0])];
    let results = handler.run_inference(&batch, &model, None).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].inference.as_tensor().unwrap().to_vec(), vec![3.0, 5.0]);
    assert_eq!(results[1].inference.as_tensor().unwrap().to_vec(), vec![7.0, 9.0]);
    assert_eq!(results[1].model_id.as_deref(), Some("mem://affine.bin"));
}

#[test]
fn test_inference_args_reach_model() {
    let mut handler = tensor_handler(Device::Cpu);
    let model = handler.load_model().unwrap();

    let mut args = InferenceArgs::new();
    args.insert("offset".to_string(), serde_json::Value::from(10.0_f64));
    handler.validate_inference_args(Some(&args)).unwrap();

    let results = handler
        .run_inference(&[Tensor::from(vec![1.0])], &model, Some(&args))
        .unwrap();
    assert_eq!(results[0].inference.as_tensor().unwrap().to_vec(), vec![13.0]);
}

#[test]
fn test_missing_accelerator_degrades_to_cpu() {
    let mut handler = tensor_handler(Device::Accelerator);
    assert_eq!(handler.device(), Device::Accelerator);

    let model = handler.load_model().unwrap();

    assert_eq!(handler.device(), Device::Cpu);
    assert_eq!(model.device, Device::Cpu);
    assert_eq!(handler.metrics_namespace(), METRICS_NAMESPACE);

    let results = handler.run_inference(&[Tensor::from(vec![0.0])], &model, None).unwrap();
    assert_eq!(results[0].inference.as_tensor().unwrap().device(), Device::Cpu);
}

#[test]
fn test_accelerator_failure_retries_on_cpu() {
    let runtime = FlakyAccelerator::failing(1);
    let mut handler = tensor_handler(Device::Accelerator).with_runtime(runtime);

    let model = handler.load_model().unwrap();

    assert_eq!(model.device, Device::Cpu);
    assert_eq!(model.scale, 2.0);
    assert_eq!(handler.device(), Device::Cpu);
}

#[test]
fn test_fallback_is_one_way() {
    let runtime = FlakyAccelerator::failing(1);
    let mut handler = tensor_handler(Device::Accelerator).with_runtime(runtime);

    handler.load_model().unwrap();
    // The accelerator works now, but the handler stays on the CPU
    let model = handler.load_model().unwrap();

    assert_eq!(model.device, Device::Cpu);
    assert_eq!(handler.device(), Device::Cpu);
}

#[test]
fn test_accelerator_load_without_failure() {
    let mut handler = tensor_handler(Device::Accelerator).with_runtime(FlakyAccelerator::failing(0));
    let model = handler.load_model().unwrap();

    assert_eq!(model.device, Device::Accelerator);

    let batch = vec![Tensor::from(vec![1.0])];
    let results = handler.run_inference(&batch, &model, None).unwrap();
    assert_eq!(results[0].inference.as_tensor().unwrap().device(), Device::Accelerator);
    assert_eq!(results[0].example.device(), Device::Cpu);
}

#[test]
fn test_load_is_side_effect_free() {
    let handler = tensor_handler(Device::Accelerator);
    let (_, device) = handler.load().unwrap();

    assert_eq!(device, Device::Cpu);
    assert_eq!(handler.device(), Device::Accelerator);
}

#[test]
fn test_update_model_path_reloads_new_weights() {
    let mem = MemoryFileSystem::new();
    for (path, scale) in [("mem://v1.bin", 1.0), ("mem://v2.bin", 5.0)] {
        let mut state = StateDict::new();
        state.insert("scale".to_string(), Tensor::from(vec![scale]));
        mem.insert(path, encode_state_dict(&state).unwrap()).unwrap();
    }
    let mut handler = TensorModelHandler::new("mem://v1.bin", Affine::new, params(0.0), Device::Cpu)
        .with_filesystems(FileSystems::new().with(Arc::new(mem)));

    assert_eq!(handler.load_model().unwrap().scale, 1.0);

    handler.update_model_path(Some("mem://v2.bin"));
    let model = handler.load_model().unwrap();
    assert_eq!(model.scale, 5.0);

    let results = handler.run_inference(&[Tensor::from(vec![1.0])], &model, None).unwrap();
    assert_eq!(results[0].model_id.as_deref(), Some("mem://v2.bin"));
}

#[test]
fn test_missing_weights_are_fatal() {
    let mut handler = TensorModelHandler::new("mem://absent.bin", Affine::new, params(0.0), Device::Accelerator)
        .with_filesystems(weights("mem://affine.bin", 2.0))
        .with_runtime(FlakyAccelerator::failing(0));

    assert!(matches!(handler.load_model(), Err(HandlerError::Storage(_))));
}

#[test]
fn test_cpu_retry_failure_is_fatal() {
    let mem = MemoryFileSystem::new();
    mem.insert("mem://bad.bin", vec![0xff, 0xff]).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let constructor = move |p: &ModelParams| {
        counted.fetch_add(1, Ordering::SeqCst);
        Affine::new(p)
    };

    let mut handler = TensorModelHandler::new("mem://bad.bin", constructor, params(0.0), Device::Accelerator)
        .with_filesystems(FileSystems::new().with(Arc::new(mem)))
        .with_runtime(FlakyAccelerator::failing(0));

    assert!(matches!(handler.load_model(), Err(HandlerError::Tensor(_))));
    // One accelerator attempt, one CPU retry
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_constructor_failure_is_fatal() {
    let mut handler = TensorModelHandler::new("mem://affine.bin", Affine::new, ModelParams::new(), Device::Cpu)
        .with_filesystems(weights("mem://affine.bin", 2.0));

    assert!(matches!(handler.load_model(), Err(HandlerError::ModelConstruction(_))));
}

#[test]
fn test_keyed_handler_end_to_end() {
    let mut handler = KeyedTensorModelHandler::new("mem://affine.bin", Affine::new, params(0.5), Device::Cpu)
        .with_filesystems(weights("mem://affine.bin", 2.0));
    let model = handler.load_model().unwrap();

    let batch: Vec<KeyedTensor> = (0..3)
        .map(|i| {
            let mut example = KeyedTensor::new();
            example.insert("x".to_string(), Tensor::from(vec![i as f32]));
            example
        })
        .collect();

    let results = handler.run_inference(&batch, &model, None).unwrap();

    let outputs: Vec<f32> = results
        .iter()
        .map(|r| r.inference.as_tensor().unwrap().to_vec()[0])
        .collect();
    assert_eq!(outputs, vec![0.5, 2.5, 4.5]);
    assert!(results.iter().all(|r| r.model_id.as_deref() == Some("mem://affine.bin")));
}

proptest! {
    #[test]
    fn prop_plain_results_match_batch(
        rows in prop::collection::vec(prop::collection::vec(-100.0f32..100.0, 4), 1..16)
    ) {
        let handler = tensor_handler(Device::Cpu);
        let model = handler.load().unwrap().0;
        let batch: Vec<Tensor> = rows.into_iter().map(Tensor::from).collect();

        let results = handler.run_inference(&batch, &model, None).unwrap();

        prop_assert_eq!(results.len(), batch.len());
        for (result, input) in results.iter().zip(&batch) {
            prop_assert_eq!(&result.example, input);
        }
    }

    #[test]
    fn prop_keyed_results_match_batch(n in 1usize..12, width in 1usize..6) {
        let handler = KeyedTensorModelHandler::new("mem://affine.bin", Affine::new, params(0.0), Device::Cpu)
            .with_filesystems(weights("mem://affine.bin", 1.0));
        let model = handler.load().unwrap().0;
        let batch: Vec<KeyedTensor> = (0..n)
            .map(|i| {
                let mut example = KeyedTensor::new();
                example.insert("x".to_string(), Tensor::from(vec![i as f32; width]));
                example.insert("y".to_string(), Tensor::zeros(&[width]));
                example
            })
            .collect();

        let results = handler.run_inference(&batch, &model, None).unwrap();

        prop_assert_eq!(results.len(), n);
        for (i, result) in results.iter().enumerate() {
            prop_assert_eq!(&result.example, &batch[i]);
            prop_assert_eq!(result.model_id.as_deref(), Some("mem://affine.bin"));
        }
    }

    #[test]
    fn prop_num_bytes_is_elements_times_width(
        shapes in prop::collection::vec(prop::collection::vec(1usize..5, 1..4), 0..8)
    ) {
        let handler = tensor_handler(Device::Cpu);
        let batch: Vec<Tensor> = shapes.iter().map(|s| Tensor::zeros(s)).collect();
        let expected: usize = shapes.iter().map(|s| s.iter().product::<usize>() * 4).sum();

        prop_assert_eq!(handler.num_bytes(&batch), expected);
    }
}
