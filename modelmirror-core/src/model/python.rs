//! Python subprocess adapters for pickled estimators and script factories.
//!
//! The model never runs in-process: a small harness script is executed with
//! `python -c`, receives a JSON request on stdin and writes a JSON reply on
//! stdout.

use crate::config::PythonConfig;
use crate::data::{Dataset, Label};
use crate::error::{AuditError, Result};
use crate::model::{ModelKind, Predictor};
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const HARNESS: &str = r#"
import json, sys

def _load(spec):
    if spec["kind"] == "pickle":
        try:
            import joblib
            return joblib.load(spec["path"])
        except ImportError:
            import pickle
            with open(spec["path"], "rb") as fh:
                return pickle.load(fh)
    import importlib.util
    module_spec = importlib.util.spec_from_file_location("modelmirror_user_model", spec["path"])
    module = importlib.util.module_from_spec(module_spec)
    module_spec.loader.exec_module(module)
    factory = getattr(module, spec["factory"], None)
    if factory is None or not callable(factory):
        raise LookupError("factory '%s' not found in %s" % (spec["factory"], spec["path"]))
    return factory()

def _frame(data):
    try:
        import pandas as pd
        return pd.DataFrame(data["rows"], columns=data["columns"])
    except ImportError:
        return data["rows"]

def _plain(value):
    return value.item() if hasattr(value, "item") else value

def _predict(model, data):
    frame = _frame(data)
    if hasattr(model, "predict"):
        out = model.predict(frame)
    elif callable(model):
        out = model(frame)
    else:
        raise TypeError("model exposes neither predict() nor __call__")
    return [_plain(v) for v in list(out)]

request = json.load(sys.stdin)
model = _load(request["model"])
if request["action"] == "describe":
    names = getattr(model, "feature_names_in_", None)
    json.dump({"features": [str(n) for n in names] if names is not None else None}, sys.stdout)
elif request["action"] == "predict_many":
    json.dump({"batches": [_predict(model, data) for data in request["frames"]]}, sys.stdout)
else:
    json.dump({"predictions": _predict(model, request["data"])}, sys.stdout)
"#;

/// Managed Python subprocess runner.
#[derive(Debug, Clone)]
pub struct PythonRuntime {
    python_path: PathBuf,
    venv_path: Option<PathBuf>,
    timeout: Duration,
}

impl PythonRuntime {
    pub fn new(config: &PythonConfig) -> Self {
        Self {
            python_path: config.python_path.clone(),
            venv_path: config.venv_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Get the effective Python command (accounting for venv).
    fn python_cmd(&self) -> PathBuf {
        if let Some(venv) = &self.venv_path {
            let bin_dir = if cfg!(windows) { "Scripts" } else { "bin" };
            venv.join(bin_dir).join("python")
        } else {
            self.python_path.clone()
        }
    }

    /// Run a Python script with a JSON request on stdin and a JSON reply on stdout.
    pub async fn run_script(
        &self,
        script: &str,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let payload = serde_json::to_vec(input)?;
        debug!(script_len = script.len(), input_bytes = payload.len(), "Running Python script");

        let result = tokio::time::timeout(self.timeout, async {
            let mut child = Command::new(self.python_cmd())
                .args(["-c", script])
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| AuditError::Python(format!("Failed to spawn Python: {e}")))?;

            // A script that exits early closes the pipe; its exit status
            // and stderr carry the real error.
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(&payload).await;
                drop(stdin);
            }

            let output = child.wait_with_output().await?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(AuditError::Python(format!(
                    "Python script failed ({}): {}",
                    output.status,
                    last_line(&stderr)
                )));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            serde_json::from_str(stdout.trim())
                .map_err(|e| AuditError::Python(format!("Invalid JSON output: {e}")))
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AuditError::Timeout(format!(
                "Python script timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Python exceptions end with `Type: message` on the last stderr line.
fn last_line(stderr: &str) -> &str {
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no error output")
}

/// How the harness should materialise the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PythonModelSource {
    Pickle { path: PathBuf },
    Factory { path: PathBuf, factory: String },
}

impl PythonModelSource {
    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Pickle { path } => json!({ "kind": "pickle", "path": path }),
            Self::Factory { path, factory } => {
                json!({ "kind": "factory", "path": path, "factory": factory })
            }
        }
    }

    fn path(&self) -> &Path {
        match self {
            Self::Pickle { path } | Self::Factory { path, .. } => path,
        }
    }
}

/// A model living in a Python subprocess.
#[derive(Debug)]
pub struct PythonPredictor {
    runtime: PythonRuntime,
    source: PythonModelSource,
    features: Option<Vec<String>>,
}

impl PythonPredictor {
    /// Load the model once to check it is usable and read its feature names.
    pub async fn load(source: PythonModelSource, config: &PythonConfig) -> Result<Self> {
        let runtime = PythonRuntime::new(config);
        let request = json!({ "action": "describe", "model": source.to_json() });
        let reply = runtime.run_script(HARNESS, &request).await.map_err(|e| match e {
            AuditError::Python(msg) => AuditError::invalid_model(format!(
                "{} could not be loaded: {msg}",
                source.path().display()
            )),
            other => other,
        })?;
        let features = parse_features(&reply)?;
        debug!(path = %source.path().display(), features = ?features, "Loaded Python model");
        Ok(Self {
            runtime,
            source,
            features,
        })
    }
}

fn parse_features(reply: &serde_json::Value) -> Result<Option<Vec<String>>> {
    match reply.get("features") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Array(items)) => Ok(Some(
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect(),
        )),
        Some(other) => Err(AuditError::invalid_model(format!(
            "Unexpected feature list from model: {other}"
        ))),
    }
}

fn labels(value: &serde_json::Value) -> Option<Vec<Label>> {
    value
        .as_array()
        .map(|items| items.iter().map(Label::from_json).collect())
}

fn parse_predictions(reply: &serde_json::Value) -> Result<Vec<Label>> {
    reply
        .get("predictions")
        .and_then(labels)
        .ok_or_else(|| AuditError::prediction("Model reply has no prediction list"))
}

fn parse_batches(reply: &serde_json::Value) -> Result<Vec<Vec<Label>>> {
    let batches = reply
        .get("batches")
        .and_then(|b| b.as_array())
        .ok_or_else(|| AuditError::prediction("Model reply has no batch list"))?;
    batches
        .iter()
        .map(|batch| {
            labels(batch)
                .ok_or_else(|| AuditError::prediction(format!("Malformed prediction batch: {batch}")))
        })
        .collect()
}

fn prediction_error(err: AuditError) -> AuditError {
    match err {
        AuditError::Python(msg) => AuditError::prediction(msg),
        other => other,
    }
}

/// Row-major JSON encoding of a dataset for the harness.
fn encode_rows(rows: &Dataset) -> serde_json::Value {
    let columns = rows.column_names();
    let data: Vec<Vec<serde_json::Value>> = (0..rows.n_rows())
        .map(|i| rows.row(i).into_iter().map(|v| v.to_json()).collect())
        .collect();
    json!({ "columns": columns, "rows": data })
}

#[async_trait]
impl Predictor for PythonPredictor {
    fn kind(&self) -> ModelKind {
        match self.source {
            PythonModelSource::Pickle { .. } => ModelKind::SerializedEstimator,
            PythonModelSource::Factory { .. } => ModelKind::ScriptFactory,
        }
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.features.as_deref()
    }

    async fn predict(&self, rows: &Dataset) -> Result<Vec<Label>> {
        let request = json!({
            "action": "predict",
            "model": self.source.to_json(),
            "data": encode_rows(rows),
        });
        let reply = self
            .runtime
            .run_script(HARNESS, &request)
            .await
            .map_err(prediction_error)?;
        parse_predictions(&reply)
    }

    /// One interpreter start and one model load for the whole batch.
    async fn predict_many(&self, frames: &[Dataset]) -> Result<Vec<Vec<Label>>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }
        let request = json!({
            "action": "predict_many",
            "model": self.source.to_json(),
            "frames": frames.iter().map(encode_rows).collect::<Vec<_>>(),
        });
        debug!(frames = frames.len(), "Batched Python prediction");
        let reply = self
            .runtime
            .run_script(HARNESS, &request)
            .await
            .map_err(prediction_error)?;
        parse_batches(&reply)
    }
}
