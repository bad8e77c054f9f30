//! The Perturbation Data Generator: wraps the Monte Carlo Driver to build
//! a labeled tabular dataset for the Attribution Engine (spec §4.4).

use crate::config::{AttributeConfig, ServingSchedule, SimulateOptions};
use crate::error::Result;
use crate::model::{ConditionalModel, TeamId};
use crate::rally::{step_rally, RallyOptions};
use crate::stats::{TeamStats, TEAM_FEATURES};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A labeled, row-major dataset: `x[row * features + col]`, `y[row] in
/// {0, 1}` marking a Team A win. Column order matches `Dataset::feature_names`.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub x: Vec<f64>,
    pub y: Vec<u8>,
    pub rows: usize,
    pub features: usize,
}

impl Dataset {
    pub fn row(&self, i: usize) -> &[f64] {
        &self.x[i * self.features..(i + 1) * self.features]
    }

    pub fn positive_rate(&self) -> f64 {
        if self.rows == 0 {
            return 0.0;
        }
        self.y.iter().map(|&v| v as f64).sum::<f64>() / self.rows as f64
    }
}

/// The model-facing feature set is the *perturbable* raw stats only
/// (spec §4.4's "all scalar fields of TeamStats"); derived features like
/// `hitting_efficiency` are linear functions of other columns already in
/// the matrix, so including them too would just make the model collinear
/// without adding information.
fn feature_names() -> Vec<String> {
    let perturbable = TEAM_FEATURES.iter().filter(|spec| spec.perturbable);
    let mut names: Vec<String> = perturbable.clone().map(|spec| format!("a_{}", spec.name)).collect();
    names.extend(perturbable.map(|spec| format!("b_{}", spec.name)));
    names
}

fn row_features(a: &TeamStats, b: &TeamStats) -> Vec<f64> {
    let perturbable = TEAM_FEATURES.iter().filter(|spec| spec.perturbable);
    let mut row: Vec<f64> = perturbable
        .clone()
        .map(|spec| a.get(spec.name).unwrap_or(0.0))
        .collect();
    row.extend(perturbable.map(|spec| b.get(spec.name).unwrap_or(0.0)));
    row
}

fn perturb_team(stats: &TeamStats, rng: &mut ChaCha8Rng, delta: f64) -> TeamStats {
    let deltas: Vec<(&str, f64)> = TEAM_FEATURES
        .iter()
        .filter(|spec| spec.perturbable)
        .map(|spec| (spec.name, rng.gen_range(-delta..=delta)))
        .collect();
    stats.perturb(&deltas)
}

/// Build a dataset of `r_design_points * m_rallies_per_point` rows by
/// perturbing the baseline stats at each design point and running rallies
/// through the Rally State Machine directly (the same primitive the
/// driver uses, but here we need per-rally outcomes, not an aggregate).
pub fn generate_dataset(
    baseline_a: &TeamStats,
    baseline_b: &TeamStats,
    model: &ConditionalModel,
    config: &AttributeConfig,
) -> Result<Dataset> {
    baseline_a.validate()?;
    baseline_b.validate()?;
    model.validate()?;

    let names = feature_names();
    let features = names.len();
    let rows = config.r_design_points * config.m_rallies_per_point;
    let mut x = Vec::with_capacity(rows * features);
    let mut y = Vec::with_capacity(rows);

    let mut rng = ChaCha8Rng::seed_from_u64(config.master_seed);
    let rally_options = RallyOptions {
        fuel: 256,
        retain_trajectory: false,
    };

    for _design_point in 0..config.r_design_points {
        let perturbed_a = perturb_team(baseline_a, &mut rng, config.delta);
        let perturbed_b = perturb_team(baseline_b, &mut rng, config.delta);
        let row = row_features(&perturbed_a, &perturbed_b);

        for _ in 0..config.m_rallies_per_point {
            let outcome = step_rally(
                &perturbed_a,
                &perturbed_b,
                TeamId::TeamA,
                model,
                &mut rng,
                &rally_options,
            )?;
            x.extend_from_slice(&row);
            y.push(u8::from(outcome.winner == TeamId::TeamA));
        }
    }

    log::info!(
        "generate_dataset: {} rows, {} features, positive rate computed post-hoc",
        rows,
        features
    );

    Ok(Dataset {
        feature_names: names,
        x,
        y,
        rows,
        features,
    })
}

/// Used only for tests and the CLI's `sweep` subcommand: the `ServingSchedule`
/// a fixed-server simulate() call should use to avoid coupling points, as
/// the attribution engine itself always does by construction (each dataset
/// row is one independent rally, not a batch).
pub fn fixed_server_options() -> SimulateOptions {
    SimulateOptions {
        schedule: ServingSchedule::Fixed(TeamId::TeamA),
        ..Default::default()
    }
}
