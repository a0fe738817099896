//! Compiled inference graphs via ONNX Runtime.

use crate::data::{Dataset, Label};
use crate::error::{AuditError, Result};
use crate::model::{ModelKind, Predictor};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use std::sync::Mutex;

/// An ONNX graph taking one `float32[N, F]` input. Integer outputs are used as
/// labels; float outputs are thresholded at 0.5 (one column) or arg-maxed.
pub struct OnnxPredictor {
    session: Mutex<Session>,
    input_name: String,
}

impl OnnxPredictor {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let session = Session::builder()
            .and_then(|builder| builder.commit_from_memory(bytes))
            .map_err(|e| AuditError::invalid_model(format!("Invalid ONNX graph: {e}")))?;
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| AuditError::invalid_model("ONNX graph declares no inputs"))?;
        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }
}

#[async_trait]
impl Predictor for OnnxPredictor {
    fn kind(&self) -> ModelKind {
        ModelKind::CompiledGraph
    }

    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    async fn predict(&self, rows: &Dataset) -> Result<Vec<Label>> {
        let (n, k) = (rows.n_rows(), rows.n_cols());
        let mut data = Vec::with_capacity(n * k);
        for i in 0..n {
            for column in rows.columns() {
                let value = column.values[i].as_f64().ok_or_else(|| {
                    AuditError::prediction(format!(
                        "Row {} has a missing or non-numeric value for '{}'",
                        i + 1,
                        column.name
                    ))
                })?;
                data.push(value as f32);
            }
        }
        let input = Tensor::from_array(([n, k], data))
            .map_err(|e| AuditError::prediction(format!("Failed to build input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AuditError::prediction("ONNX session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| AuditError::prediction(format!("ONNX inference failed: {e}")))?;
        let output = &outputs[0];

        if let Ok((_, labels)) = output.try_extract_tensor::<i64>() {
            return Ok(labels.iter().map(|&l| Label::Int(l)).collect());
        }
        let (shape, scores) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AuditError::prediction(format!("Unsupported ONNX output: {e}")))?;
        let width = if shape.len() == 2 { shape[1].max(1) as usize } else { 1 };
        if width == 1 {
            return Ok(scores
                .iter()
                .map(|&s| Label::Int(i64::from(s >= 0.5)))
                .collect());
        }
        Ok(scores
            .chunks(width)
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map_or(0, |(i, _)| i);
                Label::Int(best as i64)
            })
            .collect())
    }
}
