//! The Probability Kernel: a pure, side-effect-free function from
//! `(state, possession, own stats, opponent stats, conditional model)` to a
//! distribution over next states. No RNG, no I/O, no shared state — every
//! call is independently reproducible and safe to alias across shards.

use crate::error::{Result, SimError};
use crate::model::{ConditionalModel, Quality3, RallyState, TeamId};
use crate::stats::TeamStats;

const MASS_TOLERANCE: f64 = 1e-6;

/// Compute the outgoing transition distribution for `state`.
///
/// `own` is always the stats of the team currently named `possession`;
/// `opp` is the other team. Every `PointFor(..)` emitted here is phrased as
/// "possession" or "opponent of possession" by the caller's bookkeeping —
/// `RallyContext::advance` flips `possession` at exactly the two points
/// spec §4.2 pins (serve reception, post-attack dig/block), so by the time
/// this function runs, `own`/`opp` already name the correct teams for every
/// state below.
pub fn transitions(
    state: RallyState,
    possession: TeamId,
    own: &TeamStats,
    opp: &TeamStats,
    model: &ConditionalModel,
) -> Result<Vec<(RallyState, f64)>> {
    let opponent = possession.other();
    let raw = match state {
        RallyState::ServeAttempt => vec![
            (RallyState::PointFor(possession), own.serve_ace),
            (RallyState::PointFor(opponent), own.serve_error),
            (RallyState::ServeInPlay, own.serve_in_play()),
        ],
        RallyState::ServeInPlay => vec![
            (RallyState::PointFor(opponent), own.reception_error),
            (RallyState::ReceptionPerfect, own.reception_perfect),
            (RallyState::ReceptionGood, own.reception_good),
            (RallyState::ReceptionPoor, own.reception_poor),
        ],
        RallyState::ReceptionPerfect | RallyState::ReceptionGood | RallyState::ReceptionPoor => {
            reception_transitions(state, possession, opponent, own, model)
        }
        RallyState::SetPerfect | RallyState::SetGood | RallyState::SetPoor => {
            set_transitions(state, possession, opponent, own, model)?
        }
        RallyState::AttackDefended => attack_defended_transitions(possession, opponent, own, model)?,
        RallyState::PointFor(_) => {
            return Err(SimError::internal(
                "kernel queried for transitions out of a terminal state",
            ))
        }
    };
    finalize(raw)
}

fn reception_transitions(
    state: RallyState,
    _possession: TeamId,
    opponent: TeamId,
    own: &TeamStats,
    model: &ConditionalModel,
) -> Vec<(RallyState, f64)> {
    let quality = state.quality().expect("reception state carries a quality");
    let remaining = 1.0 - own.ball_handling_error;
    let row = model.set_quality_row(quality);
    vec![
        (RallyState::PointFor(opponent), own.ball_handling_error),
        (RallyState::set(Quality3::Perfect), remaining * row.perfect),
        (RallyState::set(Quality3::Good), remaining * row.good),
        (RallyState::set(Quality3::Poor), remaining * row.poor),
    ]
}

/// Scales the conditional model's per-set-quality kill/error shape by the
/// possessing team's own overall `attack_kill`/`attack_error` rates, using
/// the model's `Good` row as the reference point (ratio 1.0). This is the
/// documented resolution (DESIGN.md) of spec §3's otherwise-unused
/// team-level attack rates: without it, `a.kill` could never move
/// `p_a_win`, which spec §8's monotonicity property requires.
fn set_transitions(
    state: RallyState,
    possession: TeamId,
    opponent: TeamId,
    own: &TeamStats,
    model: &ConditionalModel,
) -> Result<Vec<(RallyState, f64)>> {
    let quality = state.quality().expect("set state carries a quality");
    let row = model.attack_outcome_row(quality);
    let baseline = model.attack_outcome_row(Quality3::Good);
    if baseline.kill <= 0.0 || baseline.error <= 0.0 {
        return Err(SimError::internal(
            "conditional model's Good row must have positive kill/error to serve as a baseline",
        ));
    }
    let kill_shift = row.kill / baseline.kill;
    let error_shift = row.error / baseline.error;
    let mut kill = (own.attack_kill * kill_shift).clamp(0.0, 1.0);
    let mut error = (own.attack_error * error_shift).clamp(0.0, 1.0);
    if kill + error > 1.0 {
        let scale = 1.0 / (kill + error);
        kill *= scale;
        error *= scale;
    }
    let defended = (1.0 - kill - error).max(0.0);
    Ok(vec![
        (RallyState::PointFor(possession), kill),
        (RallyState::PointFor(opponent), error),
        (RallyState::AttackDefended, defended),
    ])
}

/// Blends the block and dig branches (spec §4.1). `own` here is the
/// *defender's* stats, since `possession` has already flipped to the
/// defender before this state is queried.
fn attack_defended_transitions(
    possession: TeamId,
    opponent: TeamId,
    own: &TeamStats,
    model: &ConditionalModel,
) -> Result<Vec<(RallyState, f64)>> {
    let block_total = own.block_kill + own.controlled_block + own.block_error;
    let (p_block_kill, p_ctrl, p_block_err) = if block_total > 0.0 {
        (
            own.block_kill / block_total,
            own.controlled_block / block_total,
            own.block_error / block_total,
        )
    } else {
        (0.0, 1.0, 0.0)
    };

    let w_sum = model.w_block + model.w_dig;
    let w_block = model.w_block / w_sum;
    let w_dig = model.w_dig / w_sum;

    // Fixed-order accumulation (not a HashMap): iteration order must be
    // deterministic across process runs, since `rally::sample` walks this
    // Vec in order summing cumulative probability to pick the next state.
    let point_for_possession = w_block * p_block_kill;
    let reception_good = w_block * p_ctrl + w_dig * own.dig;
    let point_for_opponent = w_block * p_block_err + w_dig * (1.0 - own.dig);

    Ok(vec![
        (RallyState::PointFor(possession), point_for_possession),
        (RallyState::ReceptionGood, reception_good),
        (RallyState::PointFor(opponent), point_for_opponent),
    ])
}

fn finalize(raw: Vec<(RallyState, f64)>) -> Result<Vec<(RallyState, f64)>> {
    let sum: f64 = raw.iter().map(|(_, p)| p).sum();
    if !sum.is_finite() || sum <= 0.0 {
        return Err(SimError::invalid_stats(
            "kernel_transition_mass",
            sum,
            "transition mass must be positive and finite",
        ));
    }
    if !(1.0 - MASS_TOLERANCE..=1.0 + MASS_TOLERANCE).contains(&sum) {
        return Err(SimError::invalid_stats(
            "kernel_transition_mass",
            sum,
            "transition mass must be within 1e-6 of 1 before normalization",
        ));
    }
    Ok(raw.into_iter().map(|(s, p)| (s, p / sum)).collect())
}
