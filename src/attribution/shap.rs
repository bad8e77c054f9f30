//! Per-sample Shapley-style additive attribution (spec §4.5): for each
//! model family, contributions sum with the model's base value to the
//! prediction itself, `|sum(shap) + base_value - predicted| <= 1e-4`.

use super::gbt::{self, GbtModel};
use super::logistic::LogisticModel;

/// Exact Tree-SHAP (path-dependent, Lundberg & Lee), tractable at the
/// depth/round counts spec §4.5 pins: sum each tree's per-feature
/// contribution vector, scaled by the shared learning rate.
pub(crate) fn gbt_shap(model: &GbtModel, row: &[f64]) -> Vec<f64> {
    let n_features = row.len();
    let mut phi = vec![0.0; n_features];
    for tree in model.trees() {
        let tree_phi = gbt::tree_shap_contributions(tree, row, n_features);
        for (total, contribution) in phi.iter_mut().zip(tree_phi) {
            *total += model.learning_rate() * contribution;
        }
    }
    phi
}

/// Closed-form SHAP for a linear/logistic model: `w_i * x_i`. `LogisticModel`
/// stores its bias already shifted back from standardized space (`bias =
/// bias_std - sum(w_i * mean_i)`, spec §4.5's fitting step), so the
/// training-set mean is already folded into `base_value()` and the
/// per-feature baseline here is zero — `base_value() + sum(shap) ==
/// bias + sum(w_i * x_i) == predict_logit(row)` exactly.
pub(crate) fn logistic_shap(model: &LogisticModel, row: &[f64]) -> Vec<f64> {
    model.weights.iter().zip(row).map(|(w, x)| w * x).collect()
}

#[cfg(test)]
mod tests {
    use super::super::logistic::LogisticModel;
    use super::*;

    #[test]
    fn logistic_shap_sums_to_logit_minus_base() {
        let model = LogisticModel {
            weights: vec![0.5, -0.25],
            bias: 0.1,
            std_dev: vec![1.0, 1.0],
            lambda: 0.01,
        };
        let row = [0.8, 0.2];
        let shap = logistic_shap(&model, &row);
        let logit = model.predict_logit(&row);
        let reconstructed: f64 = shap.iter().sum::<f64>() + model.base_value();
        assert!((reconstructed - logit).abs() < 1e-9);
    }
}
