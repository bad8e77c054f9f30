//! Probabilistic beach-volleyball point simulator and statistic
//! attribution engine.
//!
//! Three entry points make up the crate's external interface: [`simulate`]
//! (Monte Carlo batches of independent rallies), [`attribute`] (perturbed
//! dataset generation plus a fitted classifier's feature importances and
//! SHAP values), and [`single_rally`] (one traced rally, for tests and
//! debugging). Everything else — transport, persistence, UI, config
//! files, auth — is a thin external wrapper, not part of this crate.

pub mod attribution;
pub mod ci;
pub mod config;
pub mod driver;
pub mod error;
pub mod kernel;
pub mod model;
pub mod perturbation;
pub mod rally;
pub mod stats;

pub use config::{AttributeConfig, GbtConfig, LogisticConfig, ModelFamily, MomentumConfig, ServingSchedule, SimulateOptions};
pub use driver::CancelToken;
pub use error::{Result, SimError};
pub use model::{
    AttributionReport, ConditionalModel, FeatureCategory, FeatureImportance, ModelMetrics, RallyContext,
    RallyOutcome, RallyState, ShapValue, SimulationResult, TeamId,
};
pub use rally::RallyOptions;
pub use stats::{FeatureSpec, TeamStats, TEAM_FEATURES};

use std::time::Instant;

/// Run `n` independent rallies between `team_a` and `team_b` and return the
/// aggregated win-probability estimate (spec §4.3, §6).
///
/// `model` supplies the conditional set-quality/attack-outcome tables and
/// the block/dig blend weights; pass [`ConditionalModel::default`] for the
/// canonical values spec.md pins. `cancel`/`deadline` are optional
/// cooperative stop signals checked at shard boundaries.
pub fn simulate(
    team_a: &TeamStats,
    team_b: &TeamStats,
    n: u64,
    master_seed: u64,
    model: &ConditionalModel,
    options: &SimulateOptions,
    cancel: Option<&CancelToken>,
    deadline: Option<Instant>,
) -> Result<SimulationResult> {
    driver::simulate(team_a, team_b, n, master_seed, model, options, cancel, deadline)
}

/// Generate a perturbed training dataset and fit the configured model
/// family, returning ranked feature importances, marginal impacts, and
/// Shapley-style per-feature contributions (spec §4.4, §4.5, §6).
pub fn attribute(
    team_a: &TeamStats,
    team_b: &TeamStats,
    model: &ConditionalModel,
    config: &AttributeConfig,
) -> Result<AttributionReport> {
    attribution::attribute(team_a, team_b, model, config)
}

/// Run a single rally to completion, always retaining its full trajectory
/// (spec §6): the debugging/test entry point, not part of a batch.
pub fn single_rally(
    team_a: &TeamStats,
    team_b: &TeamStats,
    serving: TeamId,
    seed: u64,
    model: &ConditionalModel,
) -> Result<RallyOutcome> {
    rally::simulate_rally(team_a, team_b, serving, seed, model)
}
