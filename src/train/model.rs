//! Ridge model over additive sufficient statistics
//!
//! The trained state is not an opaque parameter blob: it is the pair of
//! sums `gram = λI + Σ aᵢaᵢᵀ` and `moment = Σ aᵢyᵢᵀ` over all training
//! rows (aᵢ optionally intercept-augmented), plus the weights solved from
//! them. Every sample's contribution is a pair of rank-1 terms that can be
//! recomputed from the stored sample alone, which is what makes exact
//! removal of one sample an O(d²) downdate and an O(d³) re-solve,
//! independent of how many rows were ever trained on.

use crate::error::EnclaveError;
use nalgebra::{Cholesky, DMatrix, DVector};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Public shape of a resident model, safe to report across the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub feature_dim: usize,
    pub label_dim: usize,
    pub sample_count: usize,
    pub lambda: f64,
    pub fit_intercept: bool,
}

/// Multi-output ridge regression with per-sample decomposable state.
#[derive(Debug, Clone)]
pub struct RidgeModel {
    /// λI + Σ aaᵀ, d×d where d = feature_dim (+1 with intercept).
    gram: DMatrix<f64>,
    /// Σ ayᵀ, d×k.
    moment: DMatrix<f64>,
    /// Solved parameters, d×k.
    weights: DMatrix<f64>,
    feature_dim: usize,
    label_dim: usize,
    sample_count: usize,
    lambda: f64,
    fit_intercept: bool,
}

impl RidgeModel {
    /// Empty model: statistics at their λI / zero baseline.
    ///
    /// `lambda` must be strictly positive; it is what keeps the Gram
    /// matrix positive definite under any sequence of exact downdates.
    pub fn new(
        feature_dim: usize,
        label_dim: usize,
        lambda: f64,
        fit_intercept: bool,
    ) -> Result<Self, EnclaveError> {
        if feature_dim == 0 || label_dim == 0 {
            return Err(EnclaveError::InvalidInput(format!(
                "model needs positive dimensions, got {feature_dim}x{label_dim}"
            )));
        }
        if !(lambda > 0.0) {
            return Err(EnclaveError::InvalidInput(format!(
                "ridge lambda must be positive, got {lambda}"
            )));
        }
        let d = feature_dim + usize::from(fit_intercept);
        Ok(Self {
            gram: DMatrix::identity(d, d) * lambda,
            moment: DMatrix::zeros(d, label_dim),
            weights: DMatrix::zeros(d, label_dim),
            feature_dim,
            label_dim,
            sample_count: 0,
            lambda,
            fit_intercept,
        })
    }

    fn design_row(&self, features: &[f32]) -> Result<DVector<f64>, EnclaveError> {
        if features.len() != self.feature_dim {
            return Err(EnclaveError::ShapeMismatch(format!(
                "row has {} features, model expects {}",
                features.len(),
                self.feature_dim
            )));
        }
        let d = self.gram.nrows();
        let mut a = DVector::zeros(d);
        for (i, &v) in features.iter().enumerate() {
            a[i] = v as f64;
        }
        if self.fit_intercept {
            a[d - 1] = 1.0;
        }
        Ok(a)
    }

    /// Fold one sample's rank-1 contribution into the statistics.
    /// Does not re-solve; call `refit` once accumulation is done.
    pub fn accumulate(&mut self, features: &[f32], label: &[f32]) -> Result<(), EnclaveError> {
        if label.len() != self.label_dim {
            return Err(EnclaveError::ShapeMismatch(format!(
                "row has {} label values, model expects {}",
                label.len(),
                self.label_dim
            )));
        }
        let a = self.design_row(features)?;
        self.gram.ger(1.0, &a, &a, 1.0);
        for (j, &y) in label.iter().enumerate() {
            self.moment.column_mut(j).axpy(y as f64, &a, 1.0);
        }
        self.sample_count += 1;
        Ok(())
    }

    /// Solve the current statistics into weights.
    pub fn refit(&mut self) -> Result<(), EnclaveError> {
        let weights = Self::solve(&self.gram, &self.moment).ok_or_else(|| {
            EnclaveError::InvalidInput("gram matrix is not positive definite".into())
        })?;
        self.weights = weights;
        Ok(())
    }

    fn solve(gram: &DMatrix<f64>, moment: &DMatrix<f64>) -> Option<DMatrix<f64>> {
        let chol = Cholesky::new(gram.clone())?;
        Some(chol.solve(moment))
    }

    /// Downdated copy of this model with the given sample's contribution
    /// subtracted and the weights re-solved. The live model is untouched;
    /// callers commit by replacing it with the returned value.
    pub fn without_sample(
        &self,
        features: &[f32],
        label: &[f32],
    ) -> Result<RidgeModel, EnclaveError> {
        if self.sample_count == 0 {
            return Err(EnclaveError::UnlearnFailed(
                "model has no accumulated samples".into(),
            ));
        }
        if label.len() != self.label_dim {
            return Err(EnclaveError::ShapeMismatch(format!(
                "row has {} label values, model expects {}",
                label.len(),
                self.label_dim
            )));
        }
        let a = self.design_row(features)?;

        let mut gram = self.gram.clone();
        gram.ger(-1.0, &a, &a, 1.0);
        let mut moment = self.moment.clone();
        for (j, &y) in label.iter().enumerate() {
            moment.column_mut(j).axpy(-(y as f64), &a, 1.0);
        }

        let weights = Self::solve(&gram, &moment).ok_or_else(|| {
            EnclaveError::UnlearnFailed(
                "downdated gram matrix lost positive definiteness".into(),
            )
        })?;

        Ok(RidgeModel {
            gram,
            moment,
            weights,
            feature_dim: self.feature_dim,
            label_dim: self.label_dim,
            sample_count: self.sample_count - 1,
            lambda: self.lambda,
            fit_intercept: self.fit_intercept,
        })
    }

    /// Raw scores for one feature row, length `label_dim`.
    pub fn score_row(&self, features: &[f32]) -> Result<DVector<f64>, EnclaveError> {
        let a = self.design_row(features)?;
        Ok(self.weights.transpose() * a)
    }

    /// Frobenius distance between this model's weights and another's.
    pub fn weight_distance(&self, other: &RidgeModel) -> f64 {
        (&self.weights - &other.weights).norm()
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn label_dim(&self) -> usize {
        self.label_dim
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            feature_dim: self.feature_dim,
            label_dim: self.label_dim,
            sample_count: self.sample_count,
            lambda: self.lambda,
            fit_intercept: self.fit_intercept,
        }
    }

    /// Zero every parameter and statistic buffer in place.
    pub fn wipe(&mut self) {
        self.gram.as_mut_slice().zeroize();
        self.moment.as_mut_slice().zeroize();
        self.weights.as_mut_slice().zeroize();
        self.sample_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted(rows: &[(&[f32], &[f32])], lambda: f64, intercept: bool) -> RidgeModel {
        let c = rows[0].0.len();
        let k = rows[0].1.len();
        let mut model = RidgeModel::new(c, k, lambda, intercept).unwrap();
        for (x, y) in rows {
            model.accumulate(x, y).unwrap();
        }
        model.refit().unwrap();
        model
    }

    #[test]
    fn test_recovers_linear_relationship() {
        // y = 2*x0 - x1, tiny ridge so the fit is near-exact.
        let rows: Vec<(Vec<f32>, Vec<f32>)> = (0..20)
            .map(|i| {
                let x0 = (i as f32) * 0.3 - 2.0;
                let x1 = ((i * 7) % 11) as f32 * 0.25;
                (vec![x0, x1], vec![2.0 * x0 - x1])
            })
            .collect();
        let borrowed: Vec<(&[f32], &[f32])> =
            rows.iter().map(|(x, y)| (x.as_slice(), y.as_slice())).collect();
        let model = fitted(&borrowed, 1e-6, false);

        let score = model.score_row(&[1.0, 1.0]).unwrap();
        assert!((score[0] - 1.0).abs() < 1e-3, "got {}", score[0]);
    }

    #[test]
    fn test_intercept_captures_offset() {
        // y = x + 5: hopeless without an intercept term.
        let rows: Vec<(Vec<f32>, Vec<f32>)> =
            (0..10).map(|i| (vec![i as f32], vec![i as f32 + 5.0])).collect();
        let borrowed: Vec<(&[f32], &[f32])> =
            rows.iter().map(|(x, y)| (x.as_slice(), y.as_slice())).collect();
        let model = fitted(&borrowed, 1e-6, true);

        let score = model.score_row(&[3.0]).unwrap();
        assert!((score[0] - 8.0).abs() < 1e-2, "got {}", score[0]);
    }

    #[test]
    fn test_downdate_matches_fresh_fit() {
        // Removing sample j from the statistics must land on the same
        // weights as never having accumulated it.
        let rows: Vec<(Vec<f32>, Vec<f32>)> = (0..12)
            .map(|i| {
                let x = vec![(i as f32).sin(), (i as f32).cos(), i as f32 * 0.1];
                let y = vec![x[0] - 0.5 * x[2]];
                (x, y)
            })
            .collect();
        let borrowed: Vec<(&[f32], &[f32])> =
            rows.iter().map(|(x, y)| (x.as_slice(), y.as_slice())).collect();

        let full = fitted(&borrowed, 1e-3, true);
        let removed = full.without_sample(&rows[4].0, &rows[4].1).unwrap();

        let mut without: Vec<(&[f32], &[f32])> = borrowed.clone();
        without.remove(4);
        let fresh = fitted(&without, 1e-3, true);

        assert_eq!(removed.sample_count(), 11);
        assert!(
            removed.weight_distance(&fresh) < 1e-9,
            "distance {}",
            removed.weight_distance(&fresh)
        );
    }

    #[test]
    fn test_shape_checks() {
        let mut model = RidgeModel::new(3, 1, 1e-3, true).unwrap();
        assert!(matches!(
            model.accumulate(&[1.0, 2.0], &[0.0]),
            Err(EnclaveError::ShapeMismatch(_))
        ));
        assert!(matches!(
            model.accumulate(&[1.0, 2.0, 3.0], &[0.0, 1.0]),
            Err(EnclaveError::ShapeMismatch(_))
        ));
        assert!(matches!(
            model.score_row(&[1.0]),
            Err(EnclaveError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_rejects_degenerate_construction() {
        assert!(RidgeModel::new(0, 1, 1e-3, true).is_err());
        assert!(RidgeModel::new(3, 1, 0.0, true).is_err());
        assert!(RidgeModel::new(3, 1, -1.0, true).is_err());
    }

    #[test]
    fn test_without_sample_on_empty_model_fails() {
        let model = RidgeModel::new(2, 1, 1e-3, false).unwrap();
        assert!(matches!(
            model.without_sample(&[1.0, 2.0], &[0.0]),
            Err(EnclaveError::UnlearnFailed(_))
        ));
    }

    #[test]
    fn test_wipe_zeroes_parameters() {
        let mut model = fitted(&[(&[1.0, 2.0], &[1.0]), (&[0.5, -1.0], &[0.0])], 1e-3, false);
        model.wipe();
        assert_eq!(model.sample_count(), 0);
        let score = model.score_row(&[1.0, 1.0]).unwrap();
        assert_eq!(score[0], 0.0);
    }
}
