//! Target leakage signals: numeric features ranked by absolute Pearson
//! correlation with the target column.

use crate::data::Dataset;
use crate::error::{AuditError, Result};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

/// One feature's absolute correlation with the target. `NaN` when undefined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeakageSignal {
    pub feature: String,
    pub correlation: f64,
}

/// Features ordered by descending absolute correlation; undefined ones last.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeakageResult {
    pub target: String,
    pub signals: Vec<LeakageSignal>,
}

impl LeakageResult {
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LeakageSignal> {
        self.signals.iter()
    }

    /// Features at or above `threshold`.
    pub fn suspicious(&self, threshold: f64) -> Vec<&LeakageSignal> {
        self.signals
            .iter()
            .filter(|s| s.correlation >= threshold)
            .collect()
    }
}

/// Rank every other numeric column of `dataset` by |r| with `target_column`.
pub fn check_leakage(dataset: &Dataset, target_column: &str) -> Result<LeakageResult> {
    let target = dataset.column(target_column)?;
    if !target.kind().is_numeric() {
        return Err(AuditError::NonNumericTarget(target_column.to_string()));
    }
    let target_values = target.numeric_values();

    let mut signals: Vec<LeakageSignal> = dataset
        .columns()
        .iter()
        .filter(|c| c.name != target_column && c.kind().is_numeric())
        .map(|c| LeakageSignal {
            feature: c.name.clone(),
            correlation: pearson(&target_values, &c.numeric_values()).abs(),
        })
        .collect();

    // `sort_by` is stable, so exact ties keep column order.
    signals.sort_by(|a, b| match (a.correlation.is_nan(), b.correlation.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.correlation.total_cmp(&a.correlation),
    });

    debug!(
        target = target_column,
        features = signals.len(),
        "Computed leakage signals"
    );

    Ok(LeakageResult {
        target: target_column.to_string(),
        signals,
    })
}

/// Pearson correlation over pairwise-complete observations.
///
/// Returns `NaN` with fewer than two complete pairs or when either side has
/// zero variance. The result is clamped to [-1, 1] against rounding.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((*a, *b)),
            _ => None,
        })
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
}
