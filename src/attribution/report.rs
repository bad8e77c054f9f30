//! Top-level `attribute` entry point (spec §4.5, §6): generates the
//! perturbation dataset, fits the configured model family, and extracts
//! ranked importances, marginal impacts, and Shapley-style per-feature
//! contributions.

use super::{gbt, logistic, FittedModel};
use crate::config::{AttributeConfig, ModelFamily};
use crate::error::{Result, SimError};
use crate::model::{
    AttributionReport, ConditionalModel, FeatureCategory, FeatureImportance, ModelMetrics, ShapValue,
};
use crate::perturbation::{generate_dataset, Dataset};
use crate::stats::{TeamStats, TEAM_FEATURES};

/// Above this positive-rate (or below its complement), the outcome label
/// is near-constant and the engine reports `DegenerateOutcome` (spec §4.5,
/// §7) rather than fitting a model that has nothing to discriminate.
const DEGENERATE_THRESHOLD: f64 = 0.98;
const MAX_SHAP_REFERENCE_SAMPLES: usize = 200;

pub fn attribute(
    team_a: &TeamStats,
    team_b: &TeamStats,
    model: &ConditionalModel,
    config: &AttributeConfig,
) -> Result<AttributionReport> {
    team_a.validate()?;
    team_b.validate()?;
    model.validate()?;

    let dataset = generate_dataset(team_a, team_b, model, config)?;
    let positive_rate = dataset.positive_rate();
    let degenerate = positive_rate > DEGENERATE_THRESHOLD || positive_rate < 1.0 - DEGENERATE_THRESHOLD;

    let (train_idx, holdout_idx) = stratified_split(&dataset.y, config.holdout_fraction, config.master_seed);
    let fitted = fit_model(&dataset, &train_idx, &holdout_idx, config)?;

    let n_features = dataset.features;
    let gains = fitted.feature_gain(n_features);
    let importances = rank_importances(&dataset, &fitted, &gains, &holdout_idx, config);
    let model_metrics = holdout_metrics(&dataset, &fitted, &holdout_idx);

    if degenerate {
        log::warn!(
            "attribute: positive rate {positive_rate:.4} is near-constant, returning DegenerateOutcome"
        );
        let report = AttributionReport {
            importances,
            shap: Vec::new(),
            model_metrics,
            n_samples: dataset.rows,
        };
        return Err(SimError::DegenerateOutcome {
            report: Box::new(report),
        });
    }

    let shap = shap_values(&dataset, &fitted, &holdout_idx);

    Ok(AttributionReport {
        importances,
        shap,
        model_metrics,
        n_samples: dataset.rows,
    })
}

fn fit_model(
    dataset: &Dataset,
    train_idx: &[usize],
    holdout_idx: &[usize],
    config: &AttributeConfig,
) -> Result<FittedModel> {
    match &config.model {
        ModelFamily::Gbt(gbt_config) => {
            let model = gbt::fit(&dataset.x, dataset.features, &dataset.y, train_idx, holdout_idx, gbt_config)?;
            Ok(FittedModel::Gbt(model))
        }
        ModelFamily::Logistic(logistic_config) => {
            let (x_train, y_train) = select_rows(dataset, train_idx);
            let model = logistic::fit(
                &x_train,
                train_idx.len(),
                dataset.features,
                &y_train,
                logistic_config,
                config.master_seed,
            )?;
            Ok(FittedModel::Logistic(model))
        }
    }
}

fn select_rows(dataset: &Dataset, indices: &[usize]) -> (Vec<f64>, Vec<u8>) {
    let mut x = Vec::with_capacity(indices.len() * dataset.features);
    let mut y = Vec::with_capacity(indices.len());
    for &i in indices {
        x.extend_from_slice(dataset.row(i));
        y.push(dataset.y[i]);
    }
    (x, y)
}

/// Deterministic 80/20 (by default) stratified split: shuffle each class's
/// row indices independently (seeded) and peel off `holdout_fraction` of
/// each into the holdout set, so both splits carry the dataset's base
/// rate (spec §4.5: "80/20 train/holdout, stratified on y, deterministic
/// by seed").
fn stratified_split(y: &[u8], holdout_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed ^ 0xA11C_E5DD);
    let mut train = Vec::new();
    let mut holdout = Vec::new();
    for class in [0u8, 1u8] {
        let mut idx: Vec<usize> = y
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == class)
            .map(|(i, _)| i)
            .collect();
        idx.shuffle(&mut rng);
        let cut = ((idx.len() as f64) * holdout_fraction).round() as usize;
        holdout.extend_from_slice(&idx[..cut]);
        train.extend_from_slice(&idx[cut..]);
    }
    train.sort_unstable();
    holdout.sort_unstable();
    (train, holdout)
}

fn category_for(qualified_name: &str) -> FeatureCategory {
    let base = qualified_name
        .strip_prefix("a_")
        .or_else(|| qualified_name.strip_prefix("b_"))
        .unwrap_or(qualified_name);
    TEAM_FEATURES
        .iter()
        .find(|spec| spec.name == base)
        .map(|spec| spec.category)
        .unwrap_or(FeatureCategory::Derived)
}

/// Recompute mean predicted `P(A wins)` over the holdout with feature `f`
/// shifted by `+delta`, one feature at a time, holding every other column
/// at its observed value (spec §4.5's marginal-impact rule).
fn marginal_impact(dataset: &Dataset, fitted: &FittedModel, holdout_idx: &[usize], feature: usize, delta: f64) -> f32 {
    if holdout_idx.is_empty() {
        return 0.0;
    }
    let mut baseline_sum = 0.0;
    let mut shifted_sum = 0.0;
    for &i in holdout_idx {
        let row = dataset.row(i);
        baseline_sum += fitted.predict_proba(row);

        let mut shifted = row.to_vec();
        shifted[feature] = (shifted[feature] + delta).clamp(0.0, 1.0);
        shifted_sum += fitted.predict_proba(&shifted);
    }
    let n = holdout_idx.len() as f64;
    (((shifted_sum - baseline_sum) / n) / delta) as f32
}

fn rank_importances(
    dataset: &Dataset,
    fitted: &FittedModel,
    gains: &[f64],
    holdout_idx: &[usize],
    config: &AttributeConfig,
) -> Vec<FeatureImportance> {
    let mut rows: Vec<FeatureImportance> = dataset
        .feature_names
        .iter()
        .enumerate()
        .map(|(i, name)| FeatureImportance {
            feature: name.clone(),
            score: gains[i] as f32,
            marginal_impact_per_unit: marginal_impact(dataset, fitted, holdout_idx, i, config.feature_shift_delta),
            rank: 0,
            category: category_for(name),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    for (rank, row) in rows.iter_mut().enumerate() {
        row.rank = rank as u16;
    }
    rows
}

fn holdout_metrics(dataset: &Dataset, fitted: &FittedModel, holdout_idx: &[usize]) -> ModelMetrics {
    if holdout_idx.is_empty() {
        return ModelMetrics { accuracy: 0.0, auc: 0.5 };
    }
    let mut correct = 0usize;
    let mut scores = Vec::with_capacity(holdout_idx.len());
    let mut labels = Vec::with_capacity(holdout_idx.len());
    for &i in holdout_idx {
        let p = fitted.predict_proba(dataset.row(i));
        let predicted_label = u8::from(p >= 0.5);
        if predicted_label == dataset.y[i] {
            correct += 1;
        }
        scores.push(p);
        labels.push(dataset.y[i]);
    }
    let accuracy = correct as f32 / holdout_idx.len() as f32;
    ModelMetrics {
        accuracy,
        auc: auc(&scores, &labels),
    }
}

/// Mann-Whitney U / rank-sum AUC: the probability a random positive is
/// scored above a random negative, computed via midrank ties handling.
fn auc(scores: &[f64], labels: &[u8]) -> f32 {
    let n_pos = labels.iter().filter(|&&l| l == 1).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap());

    let mut ranks = vec![0.0f64; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let average_rank = ((i + 1) + (j + 1)) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = average_rank;
        }
        i = j + 1;
    }

    let rank_sum_pos: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(&l, _)| l == 1)
        .map(|(_, &r)| r)
        .sum();
    let u = rank_sum_pos - (n_pos as f64 * (n_pos as f64 + 1.0)) / 2.0;
    (u / (n_pos as f64 * n_neg as f64)) as f32
}

/// Per-sample SHAP values for up to `K=200` reference samples drawn from
/// the holdout set (spec §4.5), ordered by descending mean `|SHAP|` per
/// feature (ties broken lexicographically by feature name), then by
/// ascending sample index within each feature group.
fn shap_values(dataset: &Dataset, fitted: &FittedModel, holdout_idx: &[usize]) -> Vec<ShapValue> {
    let reference: Vec<usize> = holdout_idx.iter().take(MAX_SHAP_REFERENCE_SAMPLES).copied().collect();
    if reference.is_empty() {
        return Vec::new();
    }

    let per_sample: Vec<Vec<f64>> = reference.iter().map(|&i| fitted.shap_row(dataset.row(i))).collect();

    let n_features = dataset.features;
    let mut mean_abs = vec![0.0; n_features];
    for row in &per_sample {
        for (f, value) in row.iter().enumerate() {
            mean_abs[f] += value.abs();
        }
    }
    for value in &mut mean_abs {
        *value /= reference.len() as f64;
    }

    let mut feature_order: Vec<usize> = (0..n_features).collect();
    feature_order.sort_by(|&a, &b| {
        mean_abs[b]
            .partial_cmp(&mean_abs[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| dataset.feature_names[a].cmp(&dataset.feature_names[b]))
    });

    let mut out = Vec::with_capacity(reference.len() * n_features);
    for &f in &feature_order {
        for (sample_index, &global_row) in reference.iter().enumerate() {
            out.push(ShapValue {
                feature: dataset.feature_names[f].clone(),
                sample_index: global_row,
                value: per_sample[sample_index][f] as f32,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttributeConfig, GbtConfig, LogisticConfig, ModelFamily};

    #[test]
    fn stratified_split_covers_every_row_once() {
        let y = vec![0u8, 1, 0, 1, 0, 1, 0, 1, 0, 1];
        let (train, holdout) = stratified_split(&y, 0.2, 5);
        let mut all: Vec<usize> = train.iter().chain(holdout.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..y.len()).collect::<Vec<_>>());
    }

    #[test]
    fn attribution_shape_with_logistic_family() {
        let a = TeamStats::default();
        let b = TeamStats::default();
        let model = ConditionalModel::default();
        let config = AttributeConfig {
            r_design_points: 200,
            m_rallies_per_point: 1,
            master_seed: 7,
            model: ModelFamily::Logistic(LogisticConfig {
                l2_grid: vec![0.01, 0.1],
                cv_folds: 3,
                max_iterations: 50,
                learning_rate: 0.1,
            }),
            ..Default::default()
        };
        let report = attribute(&a, &b, &model, &config).unwrap();
        assert!(report.importances.len() >= 20);
        assert!(!report.shap.is_empty());
        for window in report.importances.windows(2) {
            assert!(window[0].rank < window[1].rank);
        }
    }

    #[test]
    fn degenerate_team_returns_partial_report() {
        let mut a = TeamStats::default();
        a.serve_ace = 0.99;
        a.serve_error = 0.0;
        let b = TeamStats::default();
        let model = ConditionalModel::default();
        let config = AttributeConfig {
            r_design_points: 150,
            master_seed: 3,
            model: ModelFamily::Gbt(GbtConfig {
                rounds: 20,
                ..Default::default()
            }),
            ..Default::default()
        };
        match attribute(&a, &b, &model, &config) {
            Err(SimError::DegenerateOutcome { report }) => {
                assert!(!report.importances.is_empty());
                assert!(report.shap.is_empty());
            }
            other => panic!("expected DegenerateOutcome, got {other:?}"),
        }
    }

    #[test]
    fn shap_reconstructs_prediction_within_tolerance() {
        let a = TeamStats::default();
        let b = TeamStats::default();
        let model = ConditionalModel::default();
        let config = AttributeConfig {
            r_design_points: 200,
            master_seed: 11,
            model: ModelFamily::Logistic(LogisticConfig {
                l2_grid: vec![0.1],
                cv_folds: 3,
                max_iterations: 50,
                learning_rate: 0.1,
            }),
            ..Default::default()
        };
        let dataset = generate_dataset(&a, &b, &model, &config).unwrap();
        let (train_idx, holdout_idx) = stratified_split(&dataset.y, config.holdout_fraction, config.master_seed);
        let fitted = fit_model(&dataset, &train_idx, &holdout_idx, &config).unwrap();
        for &i in holdout_idx.iter().take(20) {
            let row = dataset.row(i);
            let predicted = fitted.predict_logit(row);
            let shap = fitted.shap_row(row);
            let reconstructed: f64 = shap.iter().sum::<f64>() + fitted.base_value();
            assert!((reconstructed - predicted).abs() <= 1e-4);
        }
    }

    #[test]
    fn gbt_shap_reconstructs_prediction_within_tolerance() {
        let a = TeamStats::default();
        let b = TeamStats::default();
        let model = ConditionalModel::default();
        let config = AttributeConfig {
            r_design_points: 200,
            master_seed: 11,
            model: ModelFamily::Gbt(GbtConfig {
                rounds: 40,
                ..Default::default()
            }),
            ..Default::default()
        };
        let dataset = generate_dataset(&a, &b, &model, &config).unwrap();
        let (train_idx, holdout_idx) = stratified_split(&dataset.y, config.holdout_fraction, config.master_seed);
        let fitted = fit_model(&dataset, &train_idx, &holdout_idx, &config).unwrap();
        for &i in holdout_idx.iter().take(20) {
            let row = dataset.row(i);
            let predicted = fitted.predict_logit(row);
            let shap = fitted.shap_row(row);
            let reconstructed: f64 = shap.iter().sum::<f64>() + fitted.base_value();
            assert!((reconstructed - predicted).abs() <= 1e-4, "row {i}: {reconstructed} vs {predicted}");
        }
    }
}
