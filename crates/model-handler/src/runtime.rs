//! Device runtime

use tensor::{convert_to_device, Device, Tensor};

use crate::HandlerError;

/// Reports which devices exist and materialises tensors on them
pub trait DeviceRuntime: Send + Sync {
    /// Whether `device` can be used in this environment
    fn is_available(&self, device: Device) -> bool;

    /// Place a host tensor on `device`
    fn place(&self, tensor: Tensor, device: Device) -> Result<Tensor, HandlerError> {
        Ok(convert_to_device(tensor, device))
    }
}

/// Host-only runtime: the CPU is the only device
#[derive(Debug, Clone, Copy, Default)]
pub struct HostRuntime;

impl DeviceRuntime for HostRuntime {
    fn is_available(&self, device: Device) -> bool {
        device == Device::Cpu
    }

    fn place(&self, tensor: Tensor, device: Device) -> Result<Tensor, HandlerError> {
        if !self.is_available(device) {
            return Err(HandlerError::DeviceAllocation {
                device,
                reason: "no accelerator present".to_string(),
            });
        }
        Ok(convert_to_device(tensor, device))
    }
}
