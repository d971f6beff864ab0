//! Batch runner

use filesystems::FileSystems;
use model_handler::{
    InferenceArgs, KeyedTensor, KeyedTensorModelHandler, ModelHandler, ModelOutput,
    PredictionResult, Tensor, TensorModelHandler,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use tracing::{debug, info};

use crate::{LinearRegression, RunnerConfig, RunnerError};

/// Batch size used when the handler gives no maximum
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// JSON form of a tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorJson {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl From<&Tensor> for TensorJson {
    fn from(tensor: &Tensor) -> Self {
        Self {
            shape: tensor.shape().to_vec(),
            values: tensor.to_vec(),
        }
    }
}

/// One output line
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRecord {
    pub example: serde_json::Value,
    pub inference: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

/// Totals for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub examples: usize,
    pub batches: usize,
    pub bytes: usize,
}

fn tensor_value(tensor: &Tensor) -> Result<serde_json::Value, RunnerError> {
    Ok(serde_json::to_value(TensorJson::from(tensor))?)
}

fn keyed_value(tensors: &KeyedTensor) -> Result<serde_json::Value, RunnerError> {
    let map: BTreeMap<&str, TensorJson> = tensors
        .iter()
        .map(|(key, tensor)| (key.as_str(), TensorJson::from(tensor)))
        .collect();
    Ok(serde_json::to_value(map)?)
}

fn output_value(output: &ModelOutput) -> Result<serde_json::Value, RunnerError> {
    match output {
        ModelOutput::Tensor(tensor) => tensor_value(tensor),
        ModelOutput::Keyed(tensors) => keyed_value(tensors),
    }
}

/// Load the model once, then run `examples` through `handler` in batches of at
/// most the handler's max batch size, writing one JSON line per result
pub fn run_batches<H, F>(
    handler: &mut H,
    examples: &[H::Example],
    inference_args: &InferenceArgs,
    encode_example: F,
    out: &mut dyn Write,
) -> Result<RunSummary, RunnerError>
where
    H: ModelHandler,
    F: Fn(&H::Example) -> Result<serde_json::Value, RunnerError>,
{
    handler.validate_inference_args(Some(inference_args))?;
    let model = handler.load_model()?;

    let batch_size = handler
        .batch_elements_kwargs()
        .max_batch_size
        .unwrap_or(DEFAULT_BATCH_SIZE)
        .max(1);
    let namespace = handler.metrics_namespace();
    info!("[{}] Running {} examples in batches of {}", namespace, examples.len(), batch_size);

    let mut summary = RunSummary::default();
    for batch in examples.chunks(batch_size) {
        let bytes = handler.num_bytes(batch);
        let results: Vec<PredictionResult<H::Example>> =
            handler.run_inference(batch, &model, Some(inference_args))?;
        debug!("[{}] Batch {} ({} examples, {} bytes)", namespace, summary.batches, batch.len(), bytes);

        for result in &results {
            let record = PredictionRecord {
                example: encode_example(&result.example)?,
                inference: output_value(&result.inference)?,
                model_id: result.model_id.clone(),
            };
            serde_json::to_writer(&mut *out, &record)?;
            writeln!(out)?;
        }

        summary.examples += results.len();
        summary.batches += 1;
        summary.bytes += bytes;
    }

    out.flush()?;
    Ok(summary)
}

/// Parse non-empty JSON lines
fn read_lines<T>(filesystems: &FileSystems, path: &str) -> Result<Vec<T>, RunnerError>
where
    T: for<'de> Deserialize<'de>,
{
    let reader = BufReader::new(filesystems.open(path)?);
    let mut items = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|source| RunnerError::Input {
            line: index + 1,
            source,
        })?;
        items.push(item);
    }
    debug!("Read {} examples from {}", items.len(), path);
    Ok(items)
}

/// Run the configured handler over the configured input file
pub fn run(config: &RunnerConfig, out: &mut dyn Write) -> Result<RunSummary, RunnerError> {
    run_with(config, &FileSystems::new(), out)
}

/// [`run`] with an explicit storage registry for weights and input
pub fn run_with(
    config: &RunnerConfig,
    filesystems: &FileSystems,
    out: &mut dyn Write,
) -> Result<RunSummary, RunnerError> {
    if config.keyed {
        let rows: Vec<BTreeMap<String, Vec<f32>>> = read_lines(filesystems, &config.input_path)?;
        let examples: Vec<KeyedTensor> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|(key, values)| (key, Tensor::from(values))).collect())
            .collect();

        let mut handler = KeyedTensorModelHandler::from_config(&config.handler, LinearRegression::from_params)?
            .with_filesystems(filesystems.clone());
        run_batches(&mut handler, &examples, &config.inference_args, keyed_value, out)
    } else {
        let rows: Vec<Vec<f32>> = read_lines(filesystems, &config.input_path)?;
        let examples: Vec<Tensor> = rows.into_iter().map(Tensor::from).collect();

        let mut handler = TensorModelHandler::from_config(&config.handler, LinearRegression::from_params)?
            .with_filesystems(filesystems.clone());
        run_batches(&mut handler, &examples, &config.inference_args, tensor_value, out)
    }
}
