//! Error types for the modelmirror-core crate.

use thiserror::Error;

/// Top-level error type for audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Shape mismatch: y_true has {y_true} rows, y_pred has {y_pred}, group has {group}")]
    ShapeMismatch {
        y_true: usize,
        y_pred: usize,
        group: usize,
    },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Target column '{0}' is not numeric")]
    NonNumericTarget(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid model definition: {0}")]
    InvalidModelDefinition(String),

    #[error("Report export failed: {0}")]
    ExportFailed(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Python runtime error: {0}")]
    Python(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AuditError {
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self::ColumnNotFound(name.into())
    }

    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    pub fn invalid_model(msg: impl Into<String>) -> Self {
        Self::InvalidModelDefinition(msg.into())
    }

    pub fn export_failed(msg: impl Into<String>) -> Self {
        Self::ExportFailed(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn prediction(msg: impl Into<String>) -> Self {
        Self::Prediction(msg.into())
    }

    /// Whether the error came from loading user input (dataset or model)
    /// rather than from an analytical routine. Callers at the boundary
    /// report these as recoverable and let the user retry.
    pub fn is_ingestion(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_)
                | Self::InvalidModelDefinition(_)
                | Self::Dataset(_)
                | Self::Python(_)
                | Self::Io(_)
        )
    }
}

pub type Result<T, E = AuditError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message() {
        let err = AuditError::ShapeMismatch {
            y_true: 4,
            y_pred: 3,
            group: 4,
        };
        assert_eq!(
            err.to_string(),
            "Shape mismatch: y_true has 4 rows, y_pred has 3, group has 4"
        );
    }

    #[test]
    fn test_ingestion_classification() {
        assert!(AuditError::unsupported_format("xyz").is_ingestion());
        assert!(AuditError::invalid_model("no factory").is_ingestion());
        assert!(!AuditError::column_not_found("age").is_ingestion());
        assert!(!AuditError::export_failed("disk full").is_ingestion());
    }
}
