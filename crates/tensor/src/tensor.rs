//! Device-tagged tensor

use ndarray::{Array1, ArrayD, Axis, IxDyn};
use tracing::debug;

use crate::{Device, TensorError};

/// Dense `f32` tensor resident on a device
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
    device: Device,
}

impl Tensor {
    /// Create a CPU tensor from an array
    pub fn new(data: ArrayD<f32>) -> Self {
        Self {
            data,
            device: Device::Cpu,
        }
    }

    /// Create a CPU tensor from a shape and row-major values
    pub fn from_shape_vec(shape: &[usize], values: Vec<f32>) -> Result<Self, TensorError> {
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)
            .map_err(|e| TensorError::InvalidShape(e.to_string()))?;
        Ok(Self::new(data))
    }

    /// Create a CPU tensor of zeros
    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)))
    }

    /// Tag the tensor as resident on `device` without copying.
    ///
    /// Used when a tensor is materialised directly on a device, e.g. by a
    /// device runtime placing freshly decoded weights.
    pub fn on(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn into_data(self) -> ArrayD<f32> {
        self.data
    }

    /// Size of the leading dimension (0 for scalars)
    pub fn len(&self) -> usize {
        self.data.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of elements
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Byte width of one element
    pub fn element_size(&self) -> usize {
        std::mem::size_of::<f32>()
    }

    /// Storage size in bytes (element count x element width)
    pub fn num_bytes(&self) -> usize {
        self.numel() * self.element_size()
    }

    /// Row-major copy of the values
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Copy the tensor to `device`
    pub fn to(&self, device: Device) -> Tensor {
        debug!("Transferring tensor {:?} from {} to {}", self.shape(), self.device, device);
        Tensor {
            data: self.data.to_owned(),
            device,
        }
    }

    /// Split along the leading dimension, one tensor per row
    pub fn unbind(&self) -> Vec<Tensor> {
        if self.data.ndim() == 0 {
            return Vec::new();
        }
        self.data
            .axis_iter(Axis(0))
            .map(|row| Tensor {
                data: row.to_owned(),
                device: self.device,
            })
            .collect()
    }

    /// Apply `f` to every element, keeping device and shape
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            data: self.data.mapv(f),
            device: self.device,
        }
    }
}

impl From<Vec<f32>> for Tensor {
    fn from(values: Vec<f32>) -> Self {
        Self::new(Array1::from(values).into_dyn())
    }
}

impl From<ArrayD<f32>> for Tensor {
    fn from(data: ArrayD<f32>) -> Self {
        Self::new(data)
    }
}

/// Return `tensor` resident on `device`, transferring only if it lives elsewhere
pub fn convert_to_device(tensor: Tensor, device: Device) -> Tensor {
    if tensor.device() == device {
        return tensor;
    }
    tensor.to(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_bytes() {
        let t = Tensor::zeros(&[2, 3]);
        assert_eq!(t.numel(), 6);
        assert_eq!(t.num_bytes(), 24);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_convert_same_device_is_noop() {
        let t = Tensor::from(vec![1.0, 2.0, 3.0]);
        let ptr = t.data().as_ptr();

        let converted = convert_to_device(t, Device::Cpu);
        assert_eq!(converted.device(), Device::Cpu);
        assert_eq!(converted.data().as_ptr(), ptr);
    }

    #[test]
    fn test_convert_other_device_copies() {
        let t = Tensor::from(vec![1.0, 2.0]);
        let converted = convert_to_device(t.clone(), Device::Accelerator);

        assert_eq!(converted.device(), Device::Accelerator);
        assert_eq!(converted.to_vec(), t.to_vec());
    }

    #[test]
    fn test_unbind_rows() {
        let t = Tensor::from_shape_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let rows = t.unbind();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].to_vec(), vec![3.0, 4.0]);
        assert_eq!(rows[1].shape(), &[2]);
    }

    #[test]
    fn test_invalid_shape() {
        assert!(Tensor::from_shape_vec(&[2, 2], vec![1.0]).is_err());
    }
}
