//! Batch stacking

use ndarray::{ArrayViewD, Axis};

use crate::{Tensor, TensorError};

/// Stack same-shaped tensors into one tensor with a new leading batch dimension.
///
/// All tensors must share shape and device; the result lives on that device.
pub fn stack<'a, I>(tensors: I) -> Result<Tensor, TensorError>
where
    I: IntoIterator<Item = &'a Tensor>,
{
    let tensors: Vec<&Tensor> = tensors.into_iter().collect();
    let first = tensors.first().ok_or(TensorError::EmptyBatch)?;

    for (index, tensor) in tensors.iter().enumerate().skip(1) {
        if tensor.shape() != first.shape() {
            return Err(TensorError::ShapeMismatch {
                index,
                expected: first.shape().to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }
        if tensor.device() != first.device() {
            return Err(TensorError::DeviceMismatch {
                index,
                expected: first.device(),
                actual: tensor.device(),
            });
        }
    }

    let views: Vec<ArrayViewD<'_, f32>> = tensors.iter().map(|t| t.data().view()).collect();
    let data = ndarray::stack(Axis(0), &views)
        .map_err(|e| TensorError::InvalidShape(e.to_string()))?;

    Ok(Tensor::new(data).on(first.device()))
}
