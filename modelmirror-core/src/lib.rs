//! # modelmirror-core: model fairness and leakage auditing
//!
//! Computes per-group fairness metrics and demographic parity difference,
//! flags features whose correlation with the target suggests leakage, and
//! exports both as a paginated PDF or text report.
//!
//! Models are loaded from JSON linear estimators, pickled estimators, script
//! factories or (with the `onnx` feature) compiled graphs, and all of them are
//! exposed through the [`Predictor`] trait.

// Foundation
pub mod config;
pub mod error;

// Ingestion
pub mod data;
pub mod model;

// Analysis
pub mod explain;
pub mod fairness;
pub mod leakage;

// Output
pub mod report;

// Re-exports
pub use config::{AuditConfig, load_config};
pub use data::{Column, Dataset, Label, Value, load_dataset};
pub use error::{AuditError, Result};
pub use explain::{AttributionResult, FeatureAttribution, permutation_importance};
pub use fairness::{FairnessResult, Metric, PositiveClass, evaluate_fairness, evaluate_fairness_with};
pub use leakage::{LeakageResult, LeakageSignal, check_leakage};
pub use model::{ModelKind, Predictor, load_model};
pub use report::{ReportContent, export_report, export_report_with};
