//! L2-regularized logistic regression, fit by batch gradient descent on
//! standardized features. `nalgebra` backs the dense vector/matrix work
//! (the pack's closest same-domain sibling, `of_core`, reaches for it for
//! exactly this kind of small linear algebra rather than hand-rolling it).

use crate::config::LogisticConfig;
use crate::error::{Result, SimError};
use nalgebra::{DMatrix, DVector};

/// A fitted logistic regression model. Coefficients are stored in the
/// *original* feature scale so `predict_logit` needs no per-call
/// standardization: `logit(x) = bias + sum(weights[i] * x[i])`.
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    /// Per-feature standard deviation used during fitting, kept so
    /// `feature_gain` can report the *standardized* coefficient magnitude
    /// spec §4.5 calls for, without re-deriving it from scratch.
    pub(crate) std_dev: Vec<f64>,
    pub lambda: f64,
}

impl LogisticModel {
    pub fn predict_logit(&self, row: &[f64]) -> f64 {
        self.bias
            + self
                .weights
                .iter()
                .zip(row)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    /// Absolute standardized coefficients (spec §4.5's logistic importance
    /// rule), not normalized to sum to 1 — the GBT family's gain *is*
    /// normalized, but this is a different quantity on a different scale.
    pub fn feature_gain(&self) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.std_dev)
            .map(|(w, s)| (w * s).abs())
            .collect()
    }

    pub fn base_value(&self) -> f64 {
        self.bias
    }
}

struct Standardizer {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl Standardizer {
    fn fit(x: &DMatrix<f64>) -> Self {
        let rows = x.nrows() as f64;
        let mean: Vec<f64> = x.column_iter().map(|c| c.sum() / rows).collect();
        let std: Vec<f64> = x
            .column_iter()
            .zip(&mean)
            .map(|(c, &m)| {
                let variance = c.iter().map(|v| (v - m).powi(2)).sum::<f64>() / rows;
                variance.sqrt().max(1e-9)
            })
            .collect();
        Self { mean, std }
    }

    fn transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = x.clone();
        for (mut col, (&m, &s)) in out.column_iter_mut().zip(self.mean.iter().zip(&self.std)) {
            col.apply(|v| *v = (*v - m) / s);
        }
        out
    }
}

/// One pass of L2-penalized batch gradient descent on standardized
/// features. Returns `(weights, bias)` in standardized space.
fn fit_standardized(
    x_std: &DMatrix<f64>,
    y: &[u8],
    lambda: f64,
    learning_rate: f64,
    max_iterations: u32,
) -> Result<(DVector<f64>, f64)> {
    let rows = x_std.nrows();
    let features = x_std.ncols();
    let mut weights = DVector::<f64>::zeros(features);
    let mut bias = 0.0_f64;
    let y_vec: DVector<f64> = DVector::from_iterator(rows, y.iter().map(|&v| v as f64));

    for _ in 0..max_iterations {
        let logits = x_std * &weights + DVector::from_element(rows, bias);
        let preds: DVector<f64> = logits.map(super::sigmoid);
        let residual = &preds - &y_vec;

        let grad_w = (x_std.transpose() * &residual) / rows as f64 + lambda * &weights;
        let grad_b = residual.sum() / rows as f64;

        weights -= learning_rate * &grad_w;
        bias -= learning_rate * grad_b;

        if !weights.iter().all(|v| v.is_finite()) || !bias.is_finite() {
            return Err(SimError::ModelFitFailure {
                message: "logistic regression diverged to non-finite weights".into(),
            });
        }
    }

    Ok((weights, bias))
}

fn logloss(x_std: &DMatrix<f64>, y: &[u8], weights: &DVector<f64>, bias: f64) -> f64 {
    let rows = x_std.nrows();
    let logits = x_std * weights + DVector::from_element(rows, bias);
    let mut total = 0.0;
    for (logit, &label) in logits.iter().zip(y) {
        let p = super::sigmoid(*logit).clamp(1e-9, 1.0 - 1e-9);
        total -= if label == 1 { p.ln() } else { (1.0 - p).ln() };
    }
    total / rows as f64
}

/// Stratified k-fold assignment: shuffle row indices within each class
/// separately (seeded by the caller) then deal them round-robin into
/// `folds` buckets, so every fold sees roughly the dataset's base rate.
fn stratified_folds(y: &[u8], folds: u8, seed: u64) -> Vec<Vec<usize>> {
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); folds as usize];
    for class in [0u8, 1u8] {
        let mut idx: Vec<usize> = y
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == class)
            .map(|(i, _)| i)
            .collect();
        idx.shuffle(&mut rng);
        for (i, row) in idx.into_iter().enumerate() {
            buckets[i % folds as usize].push(row);
        }
    }
    buckets
}

/// Fit with L2 penalty selected by 5-fold CV over `config.l2_grid`
/// (spec §4.5), then refit on the full training set at the winning
/// lambda.
pub fn fit(
    x: &[f64],
    rows: usize,
    features: usize,
    y: &[u8],
    config: &LogisticConfig,
    seed: u64,
) -> Result<LogisticModel> {
    let x_mat = DMatrix::from_row_slice(rows, features, x);
    let scaler = Standardizer::fit(&x_mat);
    let x_std = scaler.transform(&x_mat);

    let folds = stratified_folds(y, config.cv_folds, seed);
    let mut best_lambda = config.l2_grid.first().copied().unwrap_or(0.01);
    let mut best_loss = f64::INFINITY;

    for &lambda in &config.l2_grid {
        let mut cv_loss = 0.0;
        for (k, held_out) in folds.iter().enumerate() {
            let train_idx: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != k)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            if held_out.is_empty() || train_idx.is_empty() {
                continue;
            }
            let x_train = x_std.select_rows(&train_idx);
            let y_train: Vec<u8> = train_idx.iter().map(|&i| y[i]).collect();
            let (w, b) = fit_standardized(&x_train, &y_train, lambda, config.learning_rate, config.max_iterations)?;
            let x_held = x_std.select_rows(held_out);
            let y_held: Vec<u8> = held_out.iter().map(|&i| y[i]).collect();
            cv_loss += logloss(&x_held, &y_held, &w, b);
        }
        let mean_loss = cv_loss / config.cv_folds as f64;
        if mean_loss < best_loss {
            best_loss = mean_loss;
            best_lambda = lambda;
        }
    }

    let (weights_std, bias_std) =
        fit_standardized(&x_std, y, best_lambda, config.learning_rate, config.max_iterations)?;

    // Convert back to original feature scale: w_orig_i = w_std_i / std_i,
    // bias_orig = bias_std - sum(w_orig_i * mean_i), so that
    // `bias_orig + sum(w_orig_i * x_i) == bias_std + sum(w_std_i * x_std_i)`.
    let weights: Vec<f64> = weights_std
        .iter()
        .zip(&scaler.std)
        .map(|(w, s)| w / s)
        .collect();
    let bias = bias_std
        - weights
            .iter()
            .zip(&scaler.mean)
            .map(|(w, m)| w * m)
            .sum::<f64>();

    Ok(LogisticModel {
        weights,
        bias,
        std_dev: scaler.std,
        lambda: best_lambda,
    })
}
