//! The Rally State Machine: steps one rally from serve to a terminal
//! `PointFor`, querying the kernel at each step and sampling the next
//! state with the caller-supplied RNG.

use crate::error::{Result, SimError};
use crate::kernel;
use crate::model::{ConditionalModel, RallyContext, RallyOutcome, RallyState, TeamId};
use crate::stats::TeamStats;
use rand::Rng;
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Options controlling a single rally's step budget and trace retention.
/// Distinct from `SimulateOptions` (spec §2): the latter configures a
/// whole batch, this configures one rally.
#[derive(Debug, Clone, Copy)]
pub struct RallyOptions {
    pub fuel: u16,
    pub retain_trajectory: bool,
}

impl Default for RallyOptions {
    fn default() -> Self {
        Self {
            fuel: 256,
            retain_trajectory: false,
        }
    }
}

/// Step one rally to completion using an externally owned RNG. Shared by
/// the single-rally debugging entry point and the Monte Carlo driver (which
/// keeps one RNG per shard alive across many rallies rather than reseeding
/// per rally).
pub fn step_rally(
    stats_a: &TeamStats,
    stats_b: &TeamStats,
    serving: TeamId,
    model: &ConditionalModel,
    rng: &mut impl RngCore,
    options: &RallyOptions,
) -> Result<RallyOutcome> {
    let mut ctx = RallyContext::new(serving);
    let mut state = RallyState::ServeAttempt;
    let mut trajectory = options.retain_trajectory.then(|| vec![state]);

    for _ in 0..options.fuel {
        let (own, opp) = match ctx.possession {
            TeamId::TeamA => (stats_a, stats_b),
            TeamId::TeamB => (stats_b, stats_a),
        };
        let dist = kernel::transitions(state, ctx.possession, own, opp, model)?;
        let next = sample(&dist, rng)?;
        ctx.advance(next);
        state = next;
        if let Some(trace) = trajectory.as_mut() {
            trace.push(state);
        }
        if let RallyState::PointFor(winner) = state {
            return Ok(RallyOutcome {
                winner,
                serving,
                contacts: ctx.contact_count,
                trajectory,
            });
        }
    }

    Err(SimError::BudgetExceeded { fuel: options.fuel })
}

fn sample(dist: &[(RallyState, f64)], rng: &mut impl RngCore) -> Result<RallyState> {
    let draw: f64 = rng.gen_range(0.0..1.0);
    let mut cumulative = 0.0;
    for (state, p) in dist {
        cumulative += p;
        if draw < cumulative {
            return Ok(*state);
        }
    }
    // Floating point rounding can leave `draw` a hair past the last
    // cumulative boundary; fall back to the last entry rather than error.
    dist.last()
        .map(|(state, _)| *state)
        .ok_or_else(|| SimError::internal("kernel returned an empty transition distribution"))
}

/// Public entry point for test/debugging use (spec §6): runs one rally,
/// always retaining the full trajectory, seeded directly (no shard
/// derivation — this is a standalone call, not part of a batch).
pub fn simulate_rally(
    stats_a: &TeamStats,
    stats_b: &TeamStats,
    serving: TeamId,
    seed: u64,
    model: &ConditionalModel,
) -> Result<RallyOutcome> {
    stats_a.validate()?;
    stats_b.validate()?;
    model.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let options = RallyOptions {
        fuel: 256,
        retain_trajectory: true,
    };
    step_rally(stats_a, stats_b, serving, model, &mut rng, &options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rally_terminates_with_defaults() {
        let a = TeamStats::default();
        let b = TeamStats::default();
        let model = ConditionalModel::default();
        let outcome = simulate_rally(&a, &b, TeamId::TeamA, 42, &model).unwrap();
        assert!(outcome.contacts > 0);
        assert!(outcome.trajectory.unwrap().last().unwrap().is_terminal());
    }

    #[test]
    fn extreme_ace_team_still_terminates() {
        let mut a = TeamStats::default();
        a.serve_ace = 0.99;
        a.serve_error = 0.0;
        let b = TeamStats::default();
        let model = ConditionalModel::default();
        for seed in 0..50 {
            simulate_rally(&a, &b, TeamId::TeamA, seed, &model).unwrap();
        }
    }

    #[test]
    fn low_terminal_mass_hits_budget_exceeded() {
        // Constructing genuinely zero-terminal-mass inputs isn't possible
        // with valid TeamStats (ace/error/kill/error/dig/block are all
        // bounded away from consuming all mass simultaneously in practice),
        // so this exercises the fuel path directly via a tiny budget
        // instead of contrived stats.
        let a = TeamStats::default();
        let b = TeamStats::default();
        let model = ConditionalModel::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let options = RallyOptions {
            fuel: 1,
            retain_trajectory: false,
        };
        // Fuel of 1 step practically never reaches PointFor from
        // ServeAttempt->ServeInPlay alone unless serve ends the rally
        // outright; assert the call at least doesn't panic and returns a
        // typed result either way.
        let result = step_rally(&a, &b, TeamId::TeamA, &model, &mut rng, &options);
        assert!(result.is_ok() || matches!(result, Err(SimError::BudgetExceeded { .. })));
    }
}
