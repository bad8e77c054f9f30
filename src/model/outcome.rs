use crate::model::state::{RallyState, TeamId};
use serde::{Deserialize, Serialize};

/// Result of stepping a single rally to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RallyOutcome {
    pub winner: TeamId,
    pub serving: TeamId,
    pub contacts: u16,
    /// Recorded only when the driver is asked to retain traces; `None` in
    /// throughput-oriented batch runs.
    pub trajectory: Option<Vec<RallyState>>,
}

/// Aggregated outcome of a Monte Carlo batch of independent rallies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub n: u64,
    pub wins_a: u64,
    pub wins_b: u64,
    pub p_a_win: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub seed: u64,
    pub elapsed: std::time::Duration,
}

/// Which part of `TeamStats` a feature belongs to. Drives grouping in
/// reports; `Derived` marks computed (non-perturbable) features such as
/// `hitting_efficiency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureCategory {
    Serve,
    Reception,
    Setting,
    Attack,
    Defense,
    Derived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub score: f32,
    pub marginal_impact_per_unit: f32,
    pub rank: u16,
    pub category: FeatureCategory,
}

/// A single per-sample, per-feature additive SHAP contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapValue {
    pub feature: String,
    pub sample_index: usize,
    pub value: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f32,
    pub auc: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionReport {
    pub importances: Vec<FeatureImportance>,
    pub shap: Vec<ShapValue>,
    pub model_metrics: ModelMetrics,
    pub n_samples: usize,
}
