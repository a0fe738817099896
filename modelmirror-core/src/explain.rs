//! Model-agnostic feature attribution by permutation importance.
//!
//! Each feature column is shuffled in turn and the drop in accuracy against
//! the true labels is recorded. Works for any [`Predictor`]; permuted frames
//! are sent through [`Predictor::predict_many`] so a model running out of
//! process answers a whole batch per round trip.

use crate::config::ExplainConfig;
use crate::data::{Dataset, Label};
use crate::error::{AuditError, Result};
use crate::model::{Predictor, predict_checked, predict_many_checked};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::debug;

/// Upper bound on cells (rows × columns summed over frames) per batched
/// prediction request.
const BATCH_CELLS: usize = 2_000_000;

/// Mean accuracy drop for one feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureAttribution {
    pub feature: String,
    pub importance: f64,
    pub std_dev: f64,
}

/// Attributions for every feature column, most important first.
#[derive(Debug, Clone, Serialize)]
pub struct AttributionResult {
    /// `"global"` or `"group=<value>"`.
    pub scope: String,
    pub rows: usize,
    pub baseline_accuracy: f64,
    pub features: Vec<FeatureAttribution>,
}

impl AttributionResult {
    pub fn top(&self, n: usize) -> &[FeatureAttribution] {
        &self.features[..n.min(self.features.len())]
    }
}

fn accuracy(y_true: &[Label], y_pred: &[Label]) -> f64 {
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Permutation importance over all rows (sampled down to `config.max_rows`).
pub async fn permutation_importance(
    predictor: &dyn Predictor,
    features: &Dataset,
    y_true: &[Label],
    config: &ExplainConfig,
) -> Result<AttributionResult> {
    attribute(predictor, features, y_true, config, "global".to_string()).await
}

/// Permutation importance restricted to rows where `group == selected`.
pub async fn group_permutation_importance(
    predictor: &dyn Predictor,
    features: &Dataset,
    y_true: &[Label],
    group: &[Label],
    selected: &Label,
    config: &ExplainConfig,
) -> Result<AttributionResult> {
    if group.len() != features.n_rows() || y_true.len() != features.n_rows() {
        return Err(AuditError::ShapeMismatch {
            y_true: y_true.len(),
            y_pred: features.n_rows(),
            group: group.len(),
        });
    }
    let indices: Vec<usize> = group
        .iter()
        .enumerate()
        .filter(|(_, g)| *g == selected)
        .map(|(i, _)| i)
        .collect();
    if indices.is_empty() {
        return Err(AuditError::dataset(format!(
            "No rows found for group '{selected}'"
        )));
    }
    let subset = features.take_rows(&indices);
    let labels: Vec<Label> = indices.iter().map(|&i| y_true[i].clone()).collect();
    attribute(predictor, &subset, &labels, config, format!("group={selected}")).await
}

async fn attribute(
    predictor: &dyn Predictor,
    features: &Dataset,
    y_true: &[Label],
    config: &ExplainConfig,
    scope: String,
) -> Result<AttributionResult> {
    if y_true.len() != features.n_rows() {
        return Err(AuditError::ShapeMismatch {
            y_true: y_true.len(),
            y_pred: features.n_rows(),
            group: features.n_rows(),
        });
    }
    if features.is_empty() {
        return Err(AuditError::dataset("No rows or features to attribute"));
    }
    if config.n_repeats == 0 {
        return Err(AuditError::Config("explain.n_repeats must be at least 1".into()));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let (frame, labels) = if features.n_rows() > config.max_rows {
        let mut sample = rand::seq::index::sample(&mut rng, features.n_rows(), config.max_rows.max(1)).into_vec();
        sample.sort_unstable();
        let labels: Vec<Label> = sample.iter().map(|&i| y_true[i].clone()).collect();
        (features.take_rows(&sample), labels)
    } else {
        (features.clone(), y_true.to_vec())
    };

    let baseline = accuracy(&labels, &predict_checked(predictor, &frame).await?);

    // (column, repeat) pairs in shuffle order; permuted frames are predicted
    // in batches bounded by BATCH_CELLS.
    let plan: Vec<usize> = (0..frame.n_cols())
        .flat_map(|j| std::iter::repeat_n(j, config.n_repeats))
        .collect();
    let frame_cells = (frame.n_rows() * frame.n_cols()).max(1);
    let batch_len = (BATCH_CELLS / frame_cells).max(1);

    let mut drops: Vec<Vec<f64>> = vec![Vec::with_capacity(config.n_repeats); frame.n_cols()];
    let mut order: Vec<usize> = (0..frame.n_rows()).collect();
    let mut batches = 0usize;

    for chunk in plan.chunks(batch_len) {
        let mut permuted = Vec::with_capacity(chunk.len());
        for &j in chunk {
            let column = &frame.columns()[j];
            order.shuffle(&mut rng);
            let shuffled = order.iter().map(|&i| column.values[i].clone()).collect();
            permuted.push(frame.with_column_replaced(&column.name, shuffled)?);
        }
        let predictions = predict_many_checked(predictor, &permuted).await?;
        for (&j, preds) in chunk.iter().zip(&predictions) {
            drops[j].push(baseline - accuracy(&labels, preds));
        }
        batches += 1;
    }

    let mut attributions: Vec<FeatureAttribution> = frame
        .columns()
        .iter()
        .zip(&drops)
        .map(|(column, drops)| {
            let mean = drops.iter().sum::<f64>() / drops.len() as f64;
            let variance = drops.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / drops.len() as f64;
            FeatureAttribution {
                feature: column.name.clone(),
                importance: mean,
                std_dev: variance.sqrt(),
            }
        })
        .collect();

    attributions.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    debug!(
        scope = %scope,
        rows = frame.n_rows(),
        features = attributions.len(),
        batches,
        baseline,
        "Computed permutation importance"
    );

    Ok(AttributionResult {
        scope,
        rows: frame.n_rows(),
        baseline_accuracy: baseline,
        features: attributions,
    })
}
