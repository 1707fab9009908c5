//! Predictor — read-only evaluation against the live model
//!
//! Scores a batch of rows against whatever the model is right now; there
//! is no cached state anywhere, so evaluation always reflects prior
//! unlearning.

use crate::error::EnclaveError;
use crate::train::RidgeModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metrics and outputs for one evaluation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionReport {
    pub rows: usize,
    /// Fraction of rows whose decided label matches the supplied one.
    pub accuracy: f64,
    /// Mean squared error of the raw scores against the supplied labels.
    pub mse: f64,
    /// Raw scores, row-major, `rows * label_dim` values.
    pub predictions: Vec<f32>,
    /// Decided labels: 0/1 threshold for single-output models, one-hot
    /// argmax otherwise. Same layout as `predictions`.
    pub predicted_labels: Vec<f32>,
    pub evaluated_at: DateTime<Utc>,
}

/// Evaluate a batch of rows. Shapes must match the model's dimensions;
/// the model and resident dataset are not modified.
pub fn evaluate(
    model: &RidgeModel,
    features: &[f32],
    labels: &[f32],
    rows: usize,
) -> Result<PredictionReport, EnclaveError> {
    if rows == 0 {
        return Err(EnclaveError::InvalidInput("cannot evaluate zero rows".into()));
    }
    let c = model.feature_dim();
    let k = model.label_dim();
    if features.len() != rows * c {
        return Err(EnclaveError::ShapeMismatch(format!(
            "feature buffer holds {} values, expected {} ({}x{})",
            features.len(),
            rows * c,
            rows,
            c
        )));
    }
    if labels.len() != rows * k {
        return Err(EnclaveError::ShapeMismatch(format!(
            "label buffer holds {} values, expected {} ({}x{})",
            labels.len(),
            rows * k,
            rows,
            k
        )));
    }

    let mut predictions = Vec::with_capacity(rows * k);
    let mut predicted_labels = Vec::with_capacity(rows * k);
    let mut correct = 0usize;
    let mut sq_err = 0.0f64;

    for row in 0..rows {
        let x = &features[row * c..(row + 1) * c];
        let y = &labels[row * k..(row + 1) * k];
        let score = model.score_row(x)?;

        for j in 0..k {
            let diff = score[j] - y[j] as f64;
            sq_err += diff * diff;
            predictions.push(score[j] as f32);
        }

        if k == 1 {
            let decided = if score[0] > 0.5 { 1.0f32 } else { 0.0 };
            predicted_labels.push(decided);
            if decided == if y[0] > 0.5 { 1.0 } else { 0.0 } {
                correct += 1;
            }
        } else {
            let argmax = |v: &[f64]| -> usize {
                v.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            };
            let scores: Vec<f64> = (0..k).map(|j| score[j]).collect();
            let truth: Vec<f64> = y.iter().map(|&v| v as f64).collect();
            let decided = argmax(&scores);
            for j in 0..k {
                predicted_labels.push(if j == decided { 1.0 } else { 0.0 });
            }
            if decided == argmax(&truth) {
                correct += 1;
            }
        }
    }

    Ok(PredictionReport {
        rows,
        accuracy: correct as f64 / rows as f64,
        mse: sq_err / (rows * k) as f64,
        predictions,
        predicted_labels,
        evaluated_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SampleStore;
    use crate::train::{fit, TrainConfig};

    fn binary_model() -> (RidgeModel, Vec<f32>, Vec<f32>) {
        // Separable one-dimensional problem: label 1 iff x > 0.
        let features: Vec<f32> = vec![-2.0, -1.5, -1.0, -0.5, 0.5, 1.0, 1.5, 2.0];
        let labels: Vec<f32> = features.iter().map(|&x| if x > 0.0 { 1.0 } else { 0.0 }).collect();
        let mut store = SampleStore::new();
        store.load(&features, &labels, 8, 1).unwrap();
        let (model, _) = fit(&store, &TrainConfig { lambda: 1e-4, fit_intercept: true }).unwrap();
        (model, features, labels)
    }

    #[test]
    fn test_binary_accuracy_on_training_rows() {
        let (model, features, labels) = binary_model();
        let report = evaluate(&model, &features, &labels, 8).unwrap();
        assert_eq!(report.rows, 8);
        assert_eq!(report.predictions.len(), 8);
        assert_eq!(report.predicted_labels.len(), 8);
        assert!(report.accuracy > 0.99, "accuracy {}", report.accuracy);
    }

    #[test]
    fn test_shape_mismatch() {
        let (model, features, labels) = binary_model();
        assert!(matches!(
            evaluate(&model, &features[..5], &labels, 8),
            Err(EnclaveError::ShapeMismatch(_))
        ));
        assert!(matches!(
            evaluate(&model, &features, &labels[..3], 8),
            Err(EnclaveError::ShapeMismatch(_))
        ));
        assert!(matches!(
            evaluate(&model, &features, &labels, 0),
            Err(EnclaveError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_multi_output_argmax() {
        // Two-output one-hot problem: class 0 iff x < 0.
        let features: Vec<f32> = vec![-2.0, -1.0, 1.0, 2.0];
        let labels: Vec<f32> = vec![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0];
        let mut store = SampleStore::new();
        store.load(&features, &labels, 4, 1).unwrap();
        let (model, _) = fit(&store, &TrainConfig { lambda: 1e-4, fit_intercept: true }).unwrap();

        let report = evaluate(&model, &features, &labels, 4).unwrap();
        assert_eq!(report.predicted_labels.len(), 8);
        assert!(report.accuracy > 0.99, "accuracy {}", report.accuracy);
        // Decided labels are one-hot rows.
        for row in 0..4 {
            let sum: f32 = report.predicted_labels[row * 2..(row + 1) * 2].iter().sum();
            assert_eq!(sum, 1.0);
        }
    }

    #[test]
    fn test_mse_against_own_scores_is_negligible() {
        // Feeding the model's own scores back as labels leaves only the
        // f64 -> f32 rounding of the prediction buffer.
        let (model, features, _) = binary_model();
        let report_a = evaluate(&model, &features, &vec![0.0; 8], 8).unwrap();
        let report_b = evaluate(&model, &features, &report_a.predictions, 8).unwrap();
        assert!(report_b.mse < 1e-10, "mse {}", report_b.mse);
    }
}
