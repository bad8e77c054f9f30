use crate::error::{Result, SimError};
use crate::model::state::Quality3;
use serde::{Deserialize, Serialize};

const SUM_TOLERANCE: f64 = 0.005;

/// One row of `P(set-quality | reception-quality)`. Sums to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetQualityRow {
    pub perfect: f64,
    pub good: f64,
    pub poor: f64,
}

impl SetQualityRow {
    fn sum(&self) -> f64 {
        self.perfect + self.good + self.poor
    }

    fn validate(&self, row_name: &str) -> Result<()> {
        let sum = self.sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(SimError::invalid_stats(
                format!("conditional_model.set_quality_given_reception.{row_name}"),
                sum,
                "row must sum to 1 within tolerance",
            ));
        }
        Ok(())
    }
}

/// One row of `P(kill, error | set-quality)`. `kill + error <= 1`; the
/// remainder is `AttackDefended` mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackOutcomeRow {
    pub kill: f64,
    pub error: f64,
}

impl AttackOutcomeRow {
    fn validate(&self, row_name: &str) -> Result<()> {
        let sum = self.kill + self.error;
        if sum > 1.0 + SUM_TOLERANCE {
            return Err(SimError::invalid_stats(
                format!("conditional_model.attack_outcome_given_set.{row_name}"),
                sum,
                "kill + error must not exceed 1",
            ));
        }
        Ok(())
    }
}

/// Fixed probability tables giving `P(next-action outcome | preceding
/// action quality)`, plus the block/dig blend weights for `AttackDefended`.
/// Callers may override any of these; the kernel re-validates regardless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalModel {
    pub set_quality_given_reception: [SetQualityRow; 3],
    pub attack_outcome_given_set: [AttackOutcomeRow; 3],
    /// Weight of the block branch in `AttackDefended`. Fixed within a run.
    pub w_block: f64,
    /// Weight of the dig branch in `AttackDefended`. Fixed within a run.
    pub w_dig: f64,
}

impl ConditionalModel {
    pub fn set_quality_row(&self, reception: Quality3) -> &SetQualityRow {
        &self.set_quality_given_reception[reception.index()]
    }

    pub fn attack_outcome_row(&self, set: Quality3) -> &AttackOutcomeRow {
        &self.attack_outcome_given_set[set.index()]
    }

    pub fn validate(&self) -> Result<()> {
        for (row, name) in self
            .set_quality_given_reception
            .iter()
            .zip(["perfect", "good", "poor"])
        {
            row.validate(name)?;
        }
        for (row, name) in self
            .attack_outcome_given_set
            .iter()
            .zip(["perfect", "good", "poor"])
        {
            row.validate(name)?;
        }
        if self.w_block < 0.0 || self.w_dig < 0.0 {
            return Err(SimError::invalid_stats(
                "conditional_model.w_block/w_dig",
                self.w_block + self.w_dig,
                "branch weights must be non-negative",
            ));
        }
        if self.w_block + self.w_dig <= 0.0 {
            return Err(SimError::invalid_stats(
                "conditional_model.w_block/w_dig",
                self.w_block + self.w_dig,
                "branch weights must not both be zero",
            ));
        }
        Ok(())
    }
}

impl Default for ConditionalModel {
    fn default() -> Self {
        Self {
            set_quality_given_reception: [
                SetQualityRow {
                    perfect: 0.90,
                    good: 0.08,
                    poor: 0.02,
                },
                SetQualityRow {
                    perfect: 0.60,
                    good: 0.35,
                    poor: 0.05,
                },
                SetQualityRow {
                    perfect: 0.20,
                    good: 0.60,
                    poor: 0.20,
                },
            ],
            attack_outcome_given_set: [
                AttackOutcomeRow {
                    kill: 0.60,
                    error: 0.15,
                },
                AttackOutcomeRow {
                    kill: 0.40,
                    error: 0.20,
                },
                AttackOutcomeRow {
                    kill: 0.20,
                    error: 0.35,
                },
            ],
            w_block: 0.4,
            w_dig: 0.6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_validates() {
        ConditionalModel::default().validate().unwrap();
    }

    #[test]
    fn bad_reception_row_rejected() {
        let mut model = ConditionalModel::default();
        model.set_quality_given_reception[0].perfect = 0.5;
        assert!(model.validate().is_err());
    }
}
