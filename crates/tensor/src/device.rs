//! Compute devices

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TensorError;

/// Device a tensor or model is resident on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// General-purpose processor, always available
    #[default]
    Cpu,
    /// Accelerator (GPU), availability depends on the environment
    Accelerator,
}

impl Device {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Accelerator => "accelerator",
        }
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Accelerator)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CPU" => Ok(Device::Cpu),
            "GPU" | "CUDA" | "ACCELERATOR" => Ok(Device::Accelerator),
            _ => Err(TensorError::UnknownDevice(s.to_string())),
        }
    }
}
