//! In-process, strongly-typed option structs for the three entry points.
//! No config *files* — this mirrors the teacher's `config.rs` preference
//! structs: plain Rust values with `Default` impls holding every numeric
//! knob spec.md pins.

use serde::{Deserialize, Serialize};

/// Which team serves the next rally in a batch (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServingSchedule {
    /// Every rally is served by the same team. Used by the attribution
    /// engine to avoid coupling points.
    Fixed(crate::model::TeamId),
    /// The loser of the previous rally serves next (the default).
    LoserServes,
}

/// Optional momentum extension (spec §4.3): a small additive boost to the
/// serving team's ace probability after consecutive serve-points. Disabled
/// by default, and always disabled for attribution runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MomentumConfig {
    pub enabled: bool,
    /// Indexed by (consecutive serve-points - 1), for k = 1, 2, 3.
    pub boost: [f64; 3],
    pub bootstrap_samples: usize,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            boost: [0.01, 0.03, 0.05],
            bootstrap_samples: 200,
        }
    }
}

/// Options for `simulate` (spec §4.3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulateOptions {
    pub schedule: ServingSchedule,
    pub fuel: u16,
    pub retain_trajectories: bool,
    pub momentum: MomentumConfig,
    /// Number of worker shards; `None` uses `min(available_parallelism,
    /// ceil(n / 1024))` per spec §4.3.
    pub workers: Option<usize>,
}

impl Default for SimulateOptions {
    fn default() -> Self {
        Self {
            schedule: ServingSchedule::LoserServes,
            fuel: 256,
            retain_trajectories: false,
            momentum: MomentumConfig::default(),
            workers: None,
        }
    }
}

/// The two supported model families for the Attribution Engine (spec
/// §4.5). A closed tagged set, per spec §9's explicit redesign away from
/// inheritance-style polymorphism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelFamily {
    Gbt(GbtConfig),
    Logistic(LogisticConfig),
}

impl Default for ModelFamily {
    fn default() -> Self {
        ModelFamily::Gbt(GbtConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GbtConfig {
    pub max_depth: u8,
    pub rounds: u32,
    pub learning_rate: f64,
    pub early_stop_rounds: u32,
}

impl Default for GbtConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            rounds: 200,
            learning_rate: 0.05,
            early_stop_rounds: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticConfig {
    /// Geometric grid of L2 penalties searched by 5-fold CV.
    pub l2_grid: Vec<f64>,
    pub cv_folds: u8,
    pub max_iterations: u32,
    pub learning_rate: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            l2_grid: vec![0.001, 0.003, 0.01, 0.03, 0.1, 0.3, 1.0, 3.0, 10.0],
            cv_folds: 5,
            max_iterations: 500,
            learning_rate: 0.1,
        }
    }
}

/// Configuration for `attribute` (spec §4.4, §4.5, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub r_design_points: usize,
    pub m_rallies_per_point: usize,
    pub delta: f64,
    pub model: ModelFamily,
    pub holdout_fraction: f64,
    pub master_seed: u64,
    pub feature_shift_delta: f64,
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            r_design_points: 300,
            m_rallies_per_point: 1,
            delta: 0.05,
            model: ModelFamily::default(),
            holdout_fraction: 0.2,
            master_seed: 0,
            feature_shift_delta: 0.05,
        }
    }
}
