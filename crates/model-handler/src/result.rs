//! Prediction results

use crate::{HandlerError, KeyedTensor, ModelOutput};

/// One input example paired with its model output
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult<E> {
    /// The original input example
    pub example: E,
    /// This example's slice of the model output
    pub inference: ModelOutput,
    /// Identifier of the model that produced the output (its weights path)
    pub model_id: Option<String>,
}

/// Split batched `predictions` along the leading dimension and pair each row
/// with its input, in batch order.
///
/// Keyed outputs become one map per example and must hold at least one
/// tensor. Every output tensor must have exactly one row per example.
pub fn convert_to_result<E: Clone>(
    batch: &[E],
    predictions: ModelOutput,
    model_id: Option<&str>,
) -> Result<Vec<PredictionResult<E>>, HandlerError> {
    let expected = batch.len();

    let per_example: Vec<ModelOutput> = match predictions {
        ModelOutput::Tensor(tensor) => {
            check_rows(expected, tensor.len())?;
            tensor.unbind().into_iter().map(ModelOutput::Tensor).collect()
        }
        ModelOutput::Keyed(outputs) => {
            if outputs.is_empty() && expected > 0 {
                return Err(HandlerError::OutputMismatch { expected, actual: 0 });
            }
            let mut rows = vec![KeyedTensor::new(); expected];
            for (key, tensor) in outputs {
                check_rows(expected, tensor.len())?;
                for (row, value) in rows.iter_mut().zip(tensor.unbind()) {
                    row.insert(key.clone(), value);
                }
            }
            rows.into_iter().map(ModelOutput::Keyed).collect()
        }
    };

    Ok(batch
        .iter()
        .cloned()
        .zip(per_example)
        .map(|(example, inference)| PredictionResult {
            example,
            inference,
            model_id: model_id.map(str::to_string),
        })
        .collect())
}

fn check_rows(expected: usize, actual: usize) -> Result<(), HandlerError> {
    if expected != actual {
        return Err(HandlerError::OutputMismatch { expected, actual });
    }
    Ok(())
}
