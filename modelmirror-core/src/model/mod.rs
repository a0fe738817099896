//! Model ingestion: every supported representation is adapted into a single
//! [`Predictor`] at load time.

pub mod estimator;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod python;

pub use estimator::{LinearEstimator, Link};
pub use python::{PythonModelSource, PythonPredictor, PythonRuntime};

use crate::config::PythonConfig;
use crate::data::{Dataset, Label};
use crate::error::{AuditError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// The representation a model was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    SerializedEstimator,
    ScriptFactory,
    CompiledGraph,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelKind::SerializedEstimator => "serialized estimator",
            ModelKind::ScriptFactory => "script factory",
            ModelKind::CompiledGraph => "compiled graph",
        };
        f.write_str(s)
    }
}

/// Maps feature rows to one predicted label per row.
#[async_trait]
pub trait Predictor: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Feature columns the model was trained on, when it declares them.
    fn feature_names(&self) -> Option<&[String]>;

    async fn predict(&self, rows: &Dataset) -> Result<Vec<Label>>;

    /// Predict several frames, one label vector per frame. Adapters with a
    /// per-call startup cost answer the whole batch in one round trip.
    async fn predict_many(&self, frames: &[Dataset]) -> Result<Vec<Vec<Label>>> {
        let mut batches = Vec::with_capacity(frames.len());
        for frame in frames {
            batches.push(self.predict(frame).await?);
        }
        Ok(batches)
    }
}

/// Encodings of a serialized estimator.
#[derive(Debug, Clone)]
pub enum EstimatorEncoding {
    /// Native JSON linear model, evaluated in-process.
    Json(LinearEstimator),
    /// Python pickle/joblib file, evaluated in a subprocess.
    Pickle(PathBuf),
}

/// A model file, classified but not yet adapted.
#[derive(Debug, Clone)]
pub enum ModelArtifact {
    SerializedEstimator(EstimatorEncoding),
    ScriptFactory { path: PathBuf },
    CompiledGraph { bytes: Vec<u8> },
}

impl ModelArtifact {
    /// Classify a model file by extension and read what is needed to adapt it.
    pub async fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(AuditError::invalid_model(format!(
                "Model file not found: {}",
                path.display()
            )));
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => {
                let bytes = tokio::fs::read(path).await?;
                Ok(Self::SerializedEstimator(EstimatorEncoding::Json(
                    LinearEstimator::from_json(&bytes)?,
                )))
            }
            Some("pkl" | "pickle" | "joblib") => Ok(Self::SerializedEstimator(
                EstimatorEncoding::Pickle(path.to_path_buf()),
            )),
            Some("py") => Ok(Self::ScriptFactory {
                path: path.to_path_buf(),
            }),
            Some("onnx") => Ok(Self::CompiledGraph {
                bytes: tokio::fs::read(path).await?,
            }),
            _ => Err(AuditError::unsupported_format(format!(
                "Unsupported model file {} (expected .json, .pkl, .joblib, .py or .onnx)",
                path.display()
            ))),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::SerializedEstimator(_) => ModelKind::SerializedEstimator,
            Self::ScriptFactory { .. } => ModelKind::ScriptFactory,
            Self::CompiledGraph { .. } => ModelKind::CompiledGraph,
        }
    }

    /// Adapt the artifact into a uniform predictor.
    pub async fn into_predictor(self, config: &PythonConfig) -> Result<Box<dyn Predictor>> {
        match self {
            Self::SerializedEstimator(EstimatorEncoding::Json(estimator)) => Ok(Box::new(estimator)),
            Self::SerializedEstimator(EstimatorEncoding::Pickle(path)) => {
                let source = PythonModelSource::Pickle { path };
                Ok(Box::new(PythonPredictor::load(source, config).await?))
            }
            Self::ScriptFactory { path } => {
                let source = PythonModelSource::Factory {
                    path,
                    factory: config.factory_name.clone(),
                };
                Ok(Box::new(PythonPredictor::load(source, config).await?))
            }
            Self::CompiledGraph { bytes } => compiled_graph(&bytes),
        }
    }
}

#[cfg(feature = "onnx")]
fn compiled_graph(bytes: &[u8]) -> Result<Box<dyn Predictor>> {
    Ok(Box::new(onnx::OnnxPredictor::from_bytes(bytes)?))
}

#[cfg(not(feature = "onnx"))]
fn compiled_graph(_bytes: &[u8]) -> Result<Box<dyn Predictor>> {
    Err(AuditError::unsupported_format(
        "Compiled inference graphs require the `onnx` feature",
    ))
}

/// Load and adapt a model file.
pub async fn load_model(path: &Path, config: &PythonConfig) -> Result<Box<dyn Predictor>> {
    let artifact = ModelArtifact::from_path(path).await?;
    let kind = artifact.kind();
    let predictor = artifact.into_predictor(config).await?;
    info!(
        path = %path.display(),
        kind = %kind,
        features = predictor.feature_names().map_or(0, <[String]>::len),
        "Loaded model"
    );
    Ok(predictor)
}

/// Columns handed to the model: its declared features when it has them,
/// otherwise every column except the target.
pub fn feature_frame(dataset: &Dataset, predictor: &dyn Predictor, target: &str) -> Result<Dataset> {
    match predictor.feature_names() {
        Some(features) => {
            let missing: Vec<&str> = features
                .iter()
                .map(String::as_str)
                .filter(|f| !dataset.has_column(f))
                .collect();
            if !missing.is_empty() {
                return Err(AuditError::column_not_found(format!(
                    "model features missing from dataset: {}",
                    missing.join(", ")
                )));
            }
            dataset.select(features)
        }
        None => Ok(dataset.without(target)),
    }
}

/// Predict and check that exactly one label came back per row.
pub async fn predict_checked(predictor: &dyn Predictor, rows: &Dataset) -> Result<Vec<Label>> {
    let predictions = predictor.predict(rows).await?;
    if predictions.len() != rows.n_rows() {
        return Err(AuditError::prediction(format!(
            "Model returned {} predictions for {} rows",
            predictions.len(),
            rows.n_rows()
        )));
    }
    Ok(predictions)
}

/// Batched [`predict_checked`]: one label vector per frame, each as long as its frame.
pub async fn predict_many_checked(
    predictor: &dyn Predictor,
    frames: &[Dataset],
) -> Result<Vec<Vec<Label>>> {
    let batches = predictor.predict_many(frames).await?;
    if batches.len() != frames.len() {
        return Err(AuditError::prediction(format!(
            "Model answered {} of {} frames",
            batches.len(),
            frames.len()
        )));
    }
    for (predictions, frame) in batches.iter().zip(frames) {
        if predictions.len() != frame.n_rows() {
            return Err(AuditError::prediction(format!(
                "Model returned {} predictions for {} rows",
                predictions.len(),
                frame.n_rows()
            )));
        }
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    /// Predicts the same label for every row; declares no features.
    struct Constant(Label);

    #[async_trait]
    impl Predictor for Constant {
        fn kind(&self) -> ModelKind {
            ModelKind::ScriptFactory
        }

        fn feature_names(&self) -> Option<&[String]> {
            None
        }

        async fn predict(&self, rows: &Dataset) -> Result<Vec<Label>> {
            Ok(vec![self.0.clone(); rows.n_rows().saturating_sub(1)])
        }
    }

    fn dataset() -> Dataset {
        Dataset::new(vec![
            Column::numeric("age", [25.0, 30.0]),
            Column::numeric("income", [50000.0, 60000.0]),
            Column::numeric("target", [0.0, 1.0]),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_json_estimator_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, r#"{"features": ["income"], "coefficients": [0.001]}"#).unwrap();

        let predictor = load_model(&path, &PythonConfig::default()).await.unwrap();
        assert_eq!(predictor.kind(), ModelKind::SerializedEstimator);
        let frame = feature_frame(&dataset(), predictor.as_ref(), "target").unwrap();
        assert_eq!(frame.column_names(), vec!["income"]);
        let preds = predict_checked(predictor.as_ref(), &frame).await.unwrap();
        assert_eq!(preds.len(), 2);
    }

    #[tokio::test]
    async fn test_classifies_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("model.py");
        std::fs::write(&script, "def build_model():\n    return None\n").unwrap();
        let artifact = ModelArtifact::from_path(&script).await.unwrap();
        assert_eq!(artifact.kind(), ModelKind::ScriptFactory);

        let pickle = dir.path().join("model.joblib");
        std::fs::write(&pickle, b"\x80\x04").unwrap();
        let artifact = ModelArtifact::from_path(&pickle).await.unwrap();
        assert_eq!(artifact.kind(), ModelKind::SerializedEstimator);

        let weird = dir.path().join("model.h5");
        std::fs::write(&weird, b"").unwrap();
        let err = ModelArtifact::from_path(&weird).await.unwrap_err();
        assert!(matches!(err, AuditError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_missing_model_file() {
        let err = ModelArtifact::from_path(Path::new("/nonexistent/model.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidModelDefinition(_)));
    }

    #[cfg(not(feature = "onnx"))]
    #[tokio::test]
    async fn test_compiled_graph_requires_feature() {
        let artifact = ModelArtifact::CompiledGraph { bytes: vec![0u8; 4] };
        let err = artifact
            .into_predictor(&PythonConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AuditError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_feature_frame_without_declared_features() {
        let model = Constant(Label::Int(1));
        let frame = feature_frame(&dataset(), &model, "target").unwrap();
        assert_eq!(frame.column_names(), vec!["age", "income"]);
    }

    #[test]
    fn test_feature_frame_reports_missing_features() {
        let model = LinearEstimator::from_json(
            br#"{"features": ["income", "zip"], "coefficients": [1.0, 1.0]}"#,
        )
        .unwrap();
        let err = feature_frame(&dataset(), &model, "target").unwrap_err();
        assert!(err.to_string().contains("zip"));
    }

    #[tokio::test]
    async fn test_predict_checked_rejects_short_output() {
        let model = Constant(Label::Int(1));
        let err = predict_checked(&model, &dataset()).await.unwrap_err();
        assert!(matches!(err, AuditError::Prediction(_)));
    }

    #[tokio::test]
    async fn test_default_predict_many_answers_each_frame() {
        let model = LinearEstimator::from_json(br#"{"features": ["income"], "coefficients": [0.001]}"#)
            .unwrap();
        let frame = dataset().select(&["income".to_string()]).unwrap();
        let frames = vec![frame.clone(), frame.take_rows(&[1])];
        let batches = predict_many_checked(&model, &frames).await.unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1], vec![batches[0][1].clone()]);
    }

    #[tokio::test]
    async fn test_predict_many_checked_rejects_short_batch() {
        let model = Constant(Label::Int(1));
        let err = predict_many_checked(&model, &[dataset()]).await.unwrap_err();
        assert!(matches!(err, AuditError::Prediction(_)));
        assert!(predict_many_checked(&model, &[]).await.unwrap().is_empty());
    }
}
