//! Model loading with accelerator fallback

use filesystems::{FileSystems, FsError};
use std::io::Read;
use std::sync::Arc;
use tensor::{decode_state_dict, Device, StateDict};
use tracing::{debug, info, warn};

use crate::{DeviceRuntime, HandlerError, ModelParams, Module};

/// Builds a fresh, uninitialised model from its construction parameters
pub type ModelConstructor<M> =
    Arc<dyn Fn(&ModelParams) -> Result<M, HandlerError> + Send + Sync>;

/// Construct a model, load its weights from `state_dict_path` and place it on a device.
///
/// An unavailable accelerator is replaced by the CPU up front. If decoding or
/// placing the weights fails while targeting the accelerator, the whole load is
/// retried once on the CPU. Failures on the CPU are returned as-is.
///
/// Returns the model in inference mode together with the device actually used.
pub fn load_model<M: Module>(
    constructor: &ModelConstructor<M>,
    model_params: &ModelParams,
    state_dict_path: &str,
    device: Device,
    filesystems: &FileSystems,
    runtime: &dyn DeviceRuntime,
) -> Result<(M, Device), HandlerError> {
    let mut model = constructor(model_params)?;

    let device = if device.is_accelerator() && !runtime.is_available(device) {
        warn!("Model handler specified an accelerator device, but none is available. Switching to CPU.");
        Device::Cpu
    } else {
        device
    };

    let bytes = read_all(filesystems, state_dict_path)?;

    info!("Loading state dict {} onto a {} device", state_dict_path, device);
    let state_dict = match place_state_dict(&bytes, device, runtime) {
        Ok(state_dict) => state_dict,
        Err(e) if device.is_accelerator() => {
            warn!(
                "Loading the model onto an accelerator failed due to an error:\n{}\nAttempting to load onto a CPU device instead.",
                e
            );
            return load_model(
                constructor,
                model_params,
                state_dict_path,
                Device::Cpu,
                filesystems,
                runtime,
            );
        }
        Err(e) => return Err(e),
    };

    model.load_state_dict(state_dict)?;
    model.to_device(device);
    model.eval();
    info!("Finished loading model");

    Ok((model, device))
}

fn read_all(filesystems: &FileSystems, path: &str) -> Result<Vec<u8>, HandlerError> {
    let mut stream = filesystems.open(path)?;
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).map_err(FsError::from)?;
    debug!("Read {} bytes from {}", bytes.len(), path);
    Ok(bytes)
}

fn place_state_dict(
    bytes: &[u8],
    device: Device,
    runtime: &dyn DeviceRuntime,
) -> Result<StateDict, HandlerError> {
    decode_state_dict(bytes)?
        .into_iter()
        .map(|(name, tensor)| Ok((name, runtime.place(tensor, device)?)))
        .collect()
}
