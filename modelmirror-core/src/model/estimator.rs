//! Native linear/logistic estimator serialized as JSON.

use crate::data::{Dataset, Label};
use crate::error::{AuditError, Result};
use crate::model::{ModelKind, Predictor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Link applied to the linear score before thresholding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    #[default]
    Logistic,
    Identity,
}

/// `prediction = link(intercept + Σ coefficient_i · feature_i) >= threshold`.
///
/// ```json
/// {"features": ["age", "income"], "coefficients": [0.02, 0.0001],
///  "intercept": -3.1, "link": "logistic", "threshold": 0.5}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearEstimator {
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub link: Link,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_positive")]
    pub positive_label: Label,
    #[serde(default = "default_negative")]
    pub negative_label: Label,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_positive() -> Label {
    Label::Int(1)
}

fn default_negative() -> Label {
    Label::Int(0)
}

impl LinearEstimator {
    /// Parse and validate a JSON definition.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let estimator: Self = serde_json::from_slice(bytes)
            .map_err(|e| AuditError::invalid_model(format!("Malformed estimator JSON: {e}")))?;
        estimator.validate()?;
        Ok(estimator)
    }

    pub fn validate(&self) -> Result<()> {
        if self.features.is_empty() {
            return Err(AuditError::invalid_model("Estimator declares no features"));
        }
        if self.features.len() != self.coefficients.len() {
            return Err(AuditError::invalid_model(format!(
                "Estimator has {} features but {} coefficients",
                self.features.len(),
                self.coefficients.len()
            )));
        }
        if !self.intercept.is_finite()
            || !self.threshold.is_finite()
            || self.coefficients.iter().any(|c| !c.is_finite())
        {
            return Err(AuditError::invalid_model(
                "Estimator parameters must be finite numbers",
            ));
        }
        if self.positive_label == self.negative_label {
            return Err(AuditError::invalid_model(
                "Positive and negative labels must differ",
            ));
        }
        Ok(())
    }

    /// Linear score followed by the link function.
    pub fn decision(&self, row: &[f64]) -> f64 {
        let score = self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, x)| c * x)
                .sum::<f64>();
        match self.link {
            Link::Logistic => 1.0 / (1.0 + (-score).exp()),
            Link::Identity => score,
        }
    }
}

#[async_trait]
impl Predictor for LinearEstimator {
    fn kind(&self) -> ModelKind {
        ModelKind::SerializedEstimator
    }

    fn feature_names(&self) -> Option<&[String]> {
        Some(&self.features)
    }

    async fn predict(&self, rows: &Dataset) -> Result<Vec<Label>> {
        let columns = self
            .features
            .iter()
            .map(|f| rows.column(f).map(|c| c.numeric_values()))
            .collect::<Result<Vec<_>>>()?;

        let mut predictions = Vec::with_capacity(rows.n_rows());
        let mut row = vec![0.0; columns.len()];
        for i in 0..rows.n_rows() {
            for (j, column) in columns.iter().enumerate() {
                row[j] = column[i].ok_or_else(|| {
                    AuditError::prediction(format!(
                        "Row {} has a missing or non-numeric value for '{}'",
                        i + 1,
                        self.features[j]
                    ))
                })?;
            }
            let label = if self.decision(&row) >= self.threshold {
                &self.positive_label
            } else {
                &self.negative_label
            };
            predictions.push(label.clone());
        }
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Column, Value};

    fn income_rule() -> LinearEstimator {
        LinearEstimator::from_json(
            br#"{"features": ["income"], "coefficients": [1.0], "intercept": -55000,
                 "link": "identity", "threshold": 0.0}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_predicts_with_threshold() {
        let ds = Dataset::new(vec![
            Column::numeric("age", [25.0, 30.0]),
            Column::numeric("income", [50000.0, 60000.0]),
        ])
        .unwrap();
        let preds = income_rule().predict(&ds).await.unwrap();
        assert_eq!(preds, vec![Label::Int(0), Label::Int(1)]);
    }

    #[tokio::test]
    async fn test_missing_feature_column() {
        let ds = Dataset::new(vec![Column::numeric("age", [25.0])]).unwrap();
        let err = income_rule().predict(&ds).await.unwrap_err();
        assert!(matches!(err, AuditError::ColumnNotFound(_)));
    }

    #[tokio::test]
    async fn test_null_cell_is_prediction_error() {
        let ds = Dataset::new(vec![Column::new("income", vec![Value::Null])]).unwrap();
        let err = income_rule().predict(&ds).await.unwrap_err();
        assert!(matches!(err, AuditError::Prediction(_)));
    }

    #[test]
    fn test_logistic_decision() {
        let est = LinearEstimator::from_json(br#"{"features": ["x"], "coefficients": [2.0]}"#)
            .unwrap();
        assert_eq!(est.link, Link::Logistic);
        assert!((est.decision(&[0.0]) - 0.5).abs() < 1e-12);
        assert!(est.decision(&[3.0]) > 0.99);
    }

    #[test]
    fn test_invalid_definitions() {
        let mismatch = LinearEstimator::from_json(
            br#"{"features": ["a", "b"], "coefficients": [1.0]}"#,
        );
        assert!(matches!(mismatch, Err(AuditError::InvalidModelDefinition(_))));

        let empty = LinearEstimator::from_json(br#"{"features": [], "coefficients": []}"#);
        assert!(empty.is_err());

        let garbage = LinearEstimator::from_json(b"not json");
        assert!(matches!(garbage, Err(AuditError::InvalidModelDefinition(_))));

        let same_labels = LinearEstimator::from_json(
            br#"{"features": ["a"], "coefficients": [1.0], "positive_label": 1, "negative_label": 1}"#,
        );
        assert!(same_labels.is_err());
    }

    #[test]
    fn test_text_labels() {
        let est = LinearEstimator::from_json(
            br#"{"features": ["a"], "coefficients": [1.0],
                 "positive_label": "approved", "negative_label": "denied"}"#,
        )
        .unwrap();
        assert_eq!(est.positive_label, Label::from("approved"));
    }
}
