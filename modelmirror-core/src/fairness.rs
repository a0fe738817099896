//! Group fairness evaluation: per-group accuracy and selection rate, plus the
//! demographic parity difference across groups.

use crate::data::Label;
use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Text labels treated as the negative class when the positive class is
/// detected automatically.
const NEGATIVE_TEXT: &[&str] = &["0", "false", "no", "negative", "neg", ""];

/// Metrics computed for every group and overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    SelectionRate,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Accuracy, Metric::SelectionRate];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::SelectionRate => "selection_rate",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which predictions count as a positive selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PositiveClass {
    /// `true`, any non-zero number, or any text outside the negative vocabulary.
    #[default]
    Auto,
    /// Exactly this label.
    Exact(Label),
}

impl PositiveClass {
    pub fn from_option(label: Option<Label>) -> Self {
        label.map_or(PositiveClass::Auto, PositiveClass::Exact)
    }

    pub fn is_positive(&self, label: &Label) -> bool {
        match self {
            PositiveClass::Exact(positive) => label == positive,
            PositiveClass::Auto => match label {
                Label::Missing => false,
                Label::Bool(b) => *b,
                Label::Int(i) => *i != 0,
                Label::Float(x) => x.get() != 0.0 && !x.get().is_nan(),
                Label::Text(s) => !NEGATIVE_TEXT.contains(&s.trim().to_ascii_lowercase().as_str()),
            },
        }
    }
}

/// Options for [`evaluate_fairness_with`].
#[derive(Debug, Clone, Default)]
pub struct FairnessOptions {
    pub positive: PositiveClass,
    /// Groups reported even when no row carries them; their metrics are NaN.
    pub expected_groups: Vec<Label>,
}

/// Per-group and overall metrics for one model on one protected attribute.
#[derive(Debug, Clone, Serialize)]
pub struct FairnessResult {
    pub by_group: BTreeMap<Label, BTreeMap<Metric, f64>>,
    pub overall: BTreeMap<Metric, f64>,
    /// Max minus min selection rate over non-empty groups.
    pub demographic_parity_difference: f64,
    pub group_sizes: BTreeMap<Label, usize>,
}

impl FairnessResult {
    /// Fewer than two non-empty groups: the parity gap is trivially zero.
    pub fn is_degenerate(&self) -> bool {
        self.group_sizes.values().filter(|&&n| n > 0).count() < 2
    }

    pub fn group_metric(&self, group: &Label, metric: Metric) -> Option<f64> {
        self.by_group.get(group).and_then(|m| m.get(&metric)).copied()
    }

    /// Flattened `key -> value` view used by the report:
    /// `by_group.<group>.<metric>`, `overall.<metric>`, `demographic_parity_difference`.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut lines = Vec::new();
        for (group, metrics) in &self.by_group {
            for (metric, value) in metrics {
                lines.push((format!("by_group.{group}.{metric}"), format_score(*value)));
            }
        }
        for (metric, value) in &self.overall {
            lines.push((format!("overall.{metric}"), format_score(*value)));
        }
        lines.push((
            "demographic_parity_difference".to_string(),
            format_score(self.demographic_parity_difference),
        ));
        lines
    }
}

pub(crate) fn format_score(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{value:.4}")
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    rows: usize,
    correct: usize,
    selected: usize,
}

impl Tally {
    fn observe(&mut self, correct: bool, selected: bool) {
        self.rows += 1;
        self.correct += usize::from(correct);
        self.selected += usize::from(selected);
    }

    fn rate(&self, count: usize) -> f64 {
        if self.rows == 0 {
            f64::NAN
        } else {
            count as f64 / self.rows as f64
        }
    }

    fn metrics(&self) -> BTreeMap<Metric, f64> {
        BTreeMap::from([
            (Metric::Accuracy, self.rate(self.correct)),
            (Metric::SelectionRate, self.rate(self.selected)),
        ])
    }
}

/// Evaluate fairness with automatic positive-class detection.
pub fn evaluate_fairness(
    y_true: &[Label],
    y_pred: &[Label],
    group: &[Label],
) -> Result<FairnessResult> {
    evaluate_fairness_with(y_true, y_pred, group, &FairnessOptions::default())
}

/// Evaluate fairness with explicit options.
pub fn evaluate_fairness_with(
    y_true: &[Label],
    y_pred: &[Label],
    group: &[Label],
    options: &FairnessOptions,
) -> Result<FairnessResult> {
    let n = y_true.len();
    if n == 0 || y_pred.len() != n || group.len() != n {
        return Err(AuditError::ShapeMismatch {
            y_true: n,
            y_pred: y_pred.len(),
            group: group.len(),
        });
    }

    let mut tallies: BTreeMap<Label, Tally> = options
        .expected_groups
        .iter()
        .map(|g| (g.clone(), Tally::default()))
        .collect();
    let mut overall = Tally::default();

    for ((truth, pred), g) in y_true.iter().zip(y_pred).zip(group) {
        let correct = truth == pred;
        let selected = options.positive.is_positive(pred);
        overall.observe(correct, selected);
        tallies.entry(g.clone()).or_default().observe(correct, selected);
    }

    let rates: Vec<f64> = tallies
        .values()
        .filter(|t| t.rows > 0)
        .map(|t| t.rate(t.selected))
        .collect();
    let max = rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = rates.iter().copied().fold(f64::INFINITY, f64::min);
    let demographic_parity_difference = max - min;

    debug!(
        rows = n,
        groups = tallies.len(),
        dpd = demographic_parity_difference,
        "Evaluated fairness"
    );

    Ok(FairnessResult {
        by_group: tallies.iter().map(|(g, t)| (g.clone(), t.metrics())).collect(),
        overall: overall.metrics(),
        demographic_parity_difference,
        group_sizes: tallies.into_iter().map(|(g, t)| (g, t.rows)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ints(values: &[i64]) -> Vec<Label> {
        values.iter().map(|&v| Label::Int(v)).collect()
    }

    fn texts(values: &[&str]) -> Vec<Label> {
        values.iter().map(|&v| Label::from(v)).collect()
    }

    #[test]
    fn test_two_group_example() {
        let result = evaluate_fairness(
            &ints(&[1, 0, 1, 0]),
            &ints(&[1, 0, 0, 0]),
            &texts(&["A", "A", "B", "B"]),
        )
        .unwrap();

        let a = Label::from("A");
        let b = Label::from("B");
        assert_eq!(result.group_metric(&a, Metric::Accuracy), Some(1.0));
        assert_eq!(result.group_metric(&a, Metric::SelectionRate), Some(0.5));
        assert_eq!(result.group_metric(&b, Metric::Accuracy), Some(0.5));
        assert_eq!(result.group_metric(&b, Metric::SelectionRate), Some(0.0));
        assert_eq!(result.overall[&Metric::Accuracy], 0.75);
        assert_eq!(result.overall[&Metric::SelectionRate], 0.25);
        assert_eq!(result.demographic_parity_difference, 0.5);
        assert!(!result.is_degenerate());
    }

    #[test]
    fn test_single_group_is_degenerate() {
        let result =
            evaluate_fairness(&ints(&[1, 0, 1]), &ints(&[1, 1, 0]), &texts(&["X", "X", "X"]))
                .unwrap();
        assert_eq!(result.demographic_parity_difference, 0.0);
        assert!(result.is_degenerate());
    }

    #[test]
    fn test_shape_mismatch() {
        let err = evaluate_fairness(&ints(&[1, 0]), &ints(&[1]), &texts(&["A", "B"])).unwrap_err();
        assert!(matches!(
            err,
            AuditError::ShapeMismatch {
                y_true: 2,
                y_pred: 1,
                group: 2
            }
        ));
        assert!(evaluate_fairness(&[], &[], &[]).is_err());
    }

    #[test]
    fn test_expected_empty_group_is_nan() {
        let options = FairnessOptions {
            expected_groups: vec![Label::from("C")],
            ..FairnessOptions::default()
        };
        let result = evaluate_fairness_with(
            &ints(&[1, 0]),
            &ints(&[1, 1]),
            &texts(&["A", "B"]),
            &options,
        )
        .unwrap();
        let c = Label::from("C");
        assert!(result.group_metric(&c, Metric::Accuracy).unwrap().is_nan());
        assert!(result.group_metric(&c, Metric::SelectionRate).unwrap().is_nan());
        assert_eq!(result.group_sizes[&c], 0);
        // empty groups do not widen the parity gap
        assert_eq!(result.demographic_parity_difference, 0.0);
    }

    #[test]
    fn test_exact_positive_class() {
        let options = FairnessOptions {
            positive: PositiveClass::Exact(Label::from("approved")),
            ..FairnessOptions::default()
        };
        let preds = texts(&["approved", "denied", "denied", "denied"]);
        let result = evaluate_fairness_with(
            &preds,
            &preds,
            &texts(&["A", "A", "B", "B"]),
            &options,
        )
        .unwrap();
        assert_eq!(
            result.group_metric(&Label::from("A"), Metric::SelectionRate),
            Some(0.5)
        );
        assert_eq!(result.overall[&Metric::Accuracy], 1.0);
    }

    #[test]
    fn test_auto_positive_class() {
        let auto = PositiveClass::Auto;
        assert!(auto.is_positive(&Label::Int(1)));
        assert!(!auto.is_positive(&Label::Int(0)));
        assert!(auto.is_positive(&Label::Bool(true)));
        assert!(!auto.is_positive(&Label::from("No")));
        assert!(auto.is_positive(&Label::from("yes")));
        assert!(!auto.is_positive(&Label::Missing));
    }

    #[test]
    fn test_metric_sets_match() {
        let result =
            evaluate_fairness(&ints(&[1, 0]), &ints(&[0, 0]), &texts(&["A", "B"])).unwrap();
        for metrics in result.by_group.values() {
            let names: Vec<_> = metrics.keys().collect();
            let overall: Vec<_> = result.overall.keys().collect();
            assert_eq!(names, overall);
        }
    }

    #[test]
    fn test_flatten_keys() {
        let result = evaluate_fairness(
            &ints(&[1, 0, 1, 0]),
            &ints(&[1, 0, 0, 0]),
            &texts(&["A", "A", "B", "B"]),
        )
        .unwrap();
        let flat = result.flatten();
        assert_eq!(flat.len(), 2 * 2 + 2 + 1);
        assert_eq!(flat[0], ("by_group.A.accuracy".to_string(), "1.0000".to_string()));
        assert_eq!(
            flat.last().unwrap(),
            &("demographic_parity_difference".to_string(), "0.5000".to_string())
        );
    }

    #[test]
    fn test_serializes_nan_as_null() {
        let options = FairnessOptions {
            expected_groups: vec![Label::from("Z")],
            ..FairnessOptions::default()
        };
        let result =
            evaluate_fairness_with(&ints(&[1]), &ints(&[1]), &texts(&["A"]), &options).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["by_group"]["Z"]["accuracy"].is_null());
        assert_eq!(json["by_group"]["A"]["selection_rate"], 1.0);
    }
}
