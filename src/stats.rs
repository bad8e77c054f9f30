//! `TeamStats` and its validation. Small pure-function checks, grounded in
//! the teacher's `validation.rs` style, replace any reflective/attribute
//! driven validation the source system might have used.

use crate::error::{Result, SimError};
use crate::model::FeatureCategory;
use serde::{Deserialize, Serialize};

const RECEPTION_SUM_TOLERANCE: f64 = 0.005;

/// Immutable record of a team's rates, all expressed as fractions in
/// `[0, 1]`. Constructed once per simulation request and treated as
/// read-only for the rest of the call — safe to alias across shards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    // Serve
    pub serve_ace: f64,
    pub serve_error: f64,

    // Reception distribution — sums to 1.
    pub reception_perfect: f64,
    pub reception_good: f64,
    pub reception_poor: f64,
    pub reception_error: f64,

    // Setting
    pub ball_handling_error: f64,

    // Attack
    pub attack_kill: f64,
    pub attack_error: f64,

    // Defense
    pub dig: f64,
    pub block_kill: f64,
    pub controlled_block: f64,
    pub block_error: f64,
}

impl TeamStats {
    /// `in_play = 1 - ace - error`. Derived, never stored or re-read.
    pub fn serve_in_play(&self) -> f64 {
        1.0 - self.serve_ace - self.serve_error
    }

    /// `kill - error`. Derived, never stored or re-read.
    pub fn hitting_efficiency(&self) -> f64 {
        self.attack_kill - self.attack_error
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in self.scalar_fields() {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimError::invalid_stats(
                    name,
                    value,
                    "rate must lie in [0, 1]",
                ));
            }
        }

        if self.serve_ace + self.serve_error > 1.0 {
            return Err(SimError::invalid_stats(
                "serve_ace+serve_error",
                self.serve_ace + self.serve_error,
                "ace + error must not exceed 1",
            ));
        }

        let reception_sum =
            self.reception_perfect + self.reception_good + self.reception_poor + self.reception_error;
        if (reception_sum - 1.0).abs() > RECEPTION_SUM_TOLERANCE {
            return Err(SimError::invalid_stats(
                "reception_distribution",
                reception_sum,
                "perfect+good+poor+error must sum to 1 within tolerance",
            ));
        }

        if self.attack_kill + self.attack_error > 1.0 {
            return Err(SimError::invalid_stats(
                "attack_kill+attack_error",
                self.attack_kill + self.attack_error,
                "kill + error must not exceed 1",
            ));
        }

        Ok(())
    }

    /// Clamp every scalar field back into `[0, 1]`. Used by the
    /// perturbation generator after applying additive noise.
    pub fn clamped(mut self) -> Self {
        for (_, value) in self.scalar_fields_mut() {
            *value = value.clamp(0.0, 1.0);
        }
        self.renormalize_reception();
        self
    }

    /// Rescale the reception row back to summing to 1, preserving relative
    /// proportions. A no-op if all four entries are zero (left at zero).
    fn renormalize_reception(&mut self) {
        let sum = self.reception_perfect + self.reception_good + self.reception_poor + self.reception_error;
        if sum > 0.0 {
            self.reception_perfect /= sum;
            self.reception_good /= sum;
            self.reception_poor /= sum;
            self.reception_error /= sum;
        }
    }

    fn scalar_fields(&self) -> [(&'static str, f64); 13] {
        [
            ("serve_ace", self.serve_ace),
            ("serve_error", self.serve_error),
            ("reception_perfect", self.reception_perfect),
            ("reception_good", self.reception_good),
            ("reception_poor", self.reception_poor),
            ("reception_error", self.reception_error),
            ("ball_handling_error", self.ball_handling_error),
            ("attack_kill", self.attack_kill),
            ("attack_error", self.attack_error),
            ("dig", self.dig),
            ("block_kill", self.block_kill),
            ("controlled_block", self.controlled_block),
            ("block_error", self.block_error),
        ]
    }

    fn scalar_fields_mut(&mut self) -> [(&'static str, &mut f64); 13] {
        [
            ("serve_ace", &mut self.serve_ace),
            ("serve_error", &mut self.serve_error),
            ("reception_perfect", &mut self.reception_perfect),
            ("reception_good", &mut self.reception_good),
            ("reception_poor", &mut self.reception_poor),
            ("reception_error", &mut self.reception_error),
            ("ball_handling_error", &mut self.ball_handling_error),
            ("attack_kill", &mut self.attack_kill),
            ("attack_error", &mut self.attack_error),
            ("dig", &mut self.dig),
            ("block_kill", &mut self.block_kill),
            ("controlled_block", &mut self.controlled_block),
            ("block_error", &mut self.block_error),
        ]
    }

    /// Raw field accessor by name, used by the feature table and the
    /// perturbation generator. Returns `None` for unknown names rather than
    /// panicking — callers iterate `FeatureTable`, never user-supplied
    /// strings.
    pub fn get(&self, field: &str) -> Option<f64> {
        match field {
            "serve_ace" => Some(self.serve_ace),
            "serve_error" => Some(self.serve_error),
            "reception_perfect" => Some(self.reception_perfect),
            "reception_good" => Some(self.reception_good),
            "reception_poor" => Some(self.reception_poor),
            "reception_error" => Some(self.reception_error),
            "ball_handling_error" => Some(self.ball_handling_error),
            "attack_kill" => Some(self.attack_kill),
            "attack_error" => Some(self.attack_error),
            "dig" => Some(self.dig),
            "block_kill" => Some(self.block_kill),
            "controlled_block" => Some(self.controlled_block),
            "block_error" => Some(self.block_error),
            "hitting_efficiency" => Some(self.hitting_efficiency()),
            "serve_in_play" => Some(self.serve_in_play()),
            _ => None,
        }
    }

    /// Return a copy with `field` shifted by `delta` and re-clamped /
    /// re-normalized. Unknown or derived field names are a no-op, since
    /// derived features are "not re-read" per spec.
    pub fn with_shift(&self, field: &str, delta: f64) -> TeamStats {
        self.perturb(&[(field, delta)])
    }

    /// Apply several additive deltas at once, then clamp and renormalize
    /// exactly once. Used by the perturbation data generator so that
    /// independent per-feature noise draws don't get partially cancelled
    /// by intermediate renormalization passes.
    pub fn perturb(&self, deltas: &[(&str, f64)]) -> TeamStats {
        let mut shifted = *self;
        for &(field, delta) in deltas {
            match field {
                "serve_ace" => shifted.serve_ace += delta,
                "serve_error" => shifted.serve_error += delta,
                "reception_perfect" => shifted.reception_perfect += delta,
                "reception_good" => shifted.reception_good += delta,
                "reception_poor" => shifted.reception_poor += delta,
                "reception_error" => shifted.reception_error += delta,
                "ball_handling_error" => shifted.ball_handling_error += delta,
                "attack_kill" => shifted.attack_kill += delta,
                "attack_error" => shifted.attack_error += delta,
                "dig" => shifted.dig += delta,
                "block_kill" => shifted.block_kill += delta,
                "controlled_block" => shifted.controlled_block += delta,
                "block_error" => shifted.block_error += delta,
                _ => {}
            }
        }
        shifted.clamped()
    }
}

impl Default for TeamStats {
    /// The scenario-1 "equal teams" defaults from spec §8.
    fn default() -> Self {
        Self {
            serve_ace: 0.10,
            serve_error: 0.05,
            reception_perfect: 0.30,
            reception_good: 0.50,
            reception_poor: 0.15,
            reception_error: 0.05,
            ball_handling_error: 0.02,
            attack_kill: 0.45,
            attack_error: 0.10,
            dig: 0.60,
            block_kill: 0.15,
            controlled_block: 0.25,
            block_error: 0.05,
        }
    }
}

/// One entry of the ordered feature table spec §9 calls for in place of
/// reflective field access: perturbation, feature importance, and SHAP all
/// iterate this list rather than introspecting `TeamStats` by string key
/// in a hot path.
#[derive(Debug, Clone, Copy)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub category: FeatureCategory,
    pub range: (f64, f64),
    /// Whether the perturbation generator is allowed to vary this feature.
    /// `false` for derived/computed features (`hitting_efficiency`), which
    /// the spec says are "derived, not re-read".
    pub perturbable: bool,
}

pub const TEAM_FEATURES: &[FeatureSpec] = &[
    FeatureSpec {
        name: "serve_ace",
        category: FeatureCategory::Serve,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "serve_error",
        category: FeatureCategory::Serve,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "reception_perfect",
        category: FeatureCategory::Reception,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "reception_good",
        category: FeatureCategory::Reception,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "reception_poor",
        category: FeatureCategory::Reception,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "reception_error",
        category: FeatureCategory::Reception,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "ball_handling_error",
        category: FeatureCategory::Setting,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "attack_kill",
        category: FeatureCategory::Attack,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "attack_error",
        category: FeatureCategory::Attack,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "dig",
        category: FeatureCategory::Defense,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "block_kill",
        category: FeatureCategory::Defense,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "controlled_block",
        category: FeatureCategory::Defense,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "block_error",
        category: FeatureCategory::Defense,
        range: (0.0, 1.0),
        perturbable: true,
    },
    FeatureSpec {
        name: "hitting_efficiency",
        category: FeatureCategory::Derived,
        range: (-1.0, 1.0),
        perturbable: false,
    },
    FeatureSpec {
        name: "serve_in_play",
        category: FeatureCategory::Derived,
        range: (0.0, 1.0),
        perturbable: false,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        TeamStats::default().validate().unwrap();
    }

    #[test]
    fn serve_sum_violation_rejected() {
        let mut s = TeamStats::default();
        s.serve_ace = 0.9;
        s.serve_error = 0.3;
        assert!(s.validate().is_err());
    }

    #[test]
    fn reception_sum_violation_rejected() {
        let mut s = TeamStats::default();
        s.reception_perfect = 0.9;
        assert!(s.validate().is_err());
    }

    #[test]
    fn with_shift_renormalizes_reception() {
        let s = TeamStats::default();
        let shifted = s.with_shift("reception_perfect", 0.5);
        let sum = shifted.reception_perfect
            + shifted.reception_good
            + shifted.reception_poor
            + shifted.reception_error;
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(shifted.reception_perfect > s.reception_perfect / sum.max(1.0));
    }
}
