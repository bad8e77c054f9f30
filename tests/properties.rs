//! Property-based tests for the quantified invariants in spec §8: mass
//! conservation through the kernel, rally termination within the fuel
//! budget, and monotonicity of `p_a_win` under a one-sided skill increase.

use proptest::prelude::*;
use volley_sim::model::{ConditionalModel, Quality3, RallyState, TeamId};
use volley_sim::{kernel, rally, ServingSchedule, SimulateOptions, TeamStats};

fn arb_rate() -> impl Strategy<Value = f64> {
    0.0f64..1.0
}

/// A `TeamStats` whose invariants (serve sum, reception sum, attack sum)
/// all hold, generated by drawing independent rates and renormalizing the
/// reception row — mirrors `TeamStats::clamped`'s own renormalization.
fn arb_team_stats() -> impl Strategy<Value = TeamStats> {
    (
        arb_rate(),
        arb_rate(),
        (arb_rate(), arb_rate(), arb_rate(), arb_rate()),
        arb_rate(),
        arb_rate(),
        arb_rate(),
        arb_rate(),
        arb_rate(),
        arb_rate(),
        arb_rate(),
    )
        .prop_map(
            |(serve_ace, serve_error, reception, bhe, attack_kill, attack_error, dig, block_kill, controlled_block, block_error)| {
                let serve_sum = serve_ace + serve_error;
                let (serve_ace, serve_error) = if serve_sum > 1.0 {
                    (serve_ace / serve_sum, serve_error / serve_sum)
                } else {
                    (serve_ace, serve_error)
                };
                let attack_sum = attack_kill + attack_error;
                let (attack_kill, attack_error) = if attack_sum > 1.0 {
                    (attack_kill / attack_sum, attack_error / attack_sum)
                } else {
                    (attack_kill, attack_error)
                };
                let (rp, rg, rpoor, re) = reception;
                let r_sum = (rp + rg + rpoor + re).max(1e-9);
                TeamStats {
                    serve_ace,
                    serve_error,
                    reception_perfect: rp / r_sum,
                    reception_good: rg / r_sum,
                    reception_poor: rpoor / r_sum,
                    reception_error: re / r_sum,
                    ball_handling_error: bhe,
                    attack_kill,
                    attack_error,
                    dig,
                    block_kill,
                    controlled_block,
                    block_error,
                }
            },
        )
}

proptest! {
    /// Every non-terminal state's outgoing transition distribution sums
    /// to 1 within the 1e-9 tolerance spec §8 requires, after the
    /// kernel's own renormalization.
    #[test]
    fn kernel_transitions_conserve_mass(a in arb_team_stats(), b in arb_team_stats()) {
        let model = ConditionalModel::default();
        let states = [
            RallyState::ServeAttempt,
            RallyState::ServeInPlay,
            RallyState::reception(Quality3::Perfect),
            RallyState::reception(Quality3::Good),
            RallyState::reception(Quality3::Poor),
            RallyState::set(Quality3::Perfect),
            RallyState::set(Quality3::Good),
            RallyState::set(Quality3::Poor),
            RallyState::AttackDefended,
        ];
        for state in states {
            if let Ok(dist) = kernel::transitions(state, TeamId::TeamA, &a, &b, &model) {
                let sum: f64 = dist.iter().map(|(_, p)| p).sum();
                prop_assert!((sum - 1.0).abs() < 1e-9, "state {:?} summed to {}", state, sum);
            }
        }
    }

    /// Rallies between two valid teams terminate well within the default
    /// fuel budget: realistic inputs leave at least 1% terminal mass at
    /// every serve/attack step, so spec §8's "no BudgetExceeded" claim
    /// holds for any seed.
    #[test]
    fn rallies_terminate_within_fuel_budget(a in arb_team_stats(), b in arb_team_stats(), seed in any::<u64>()) {
        if a.validate().is_err() || b.validate().is_err() {
            return Ok(());
        }
        let model = ConditionalModel::default();
        let result = rally::simulate_rally(&a, &b, TeamId::TeamA, seed, &model);
        prop_assert!(result.is_ok());
    }
}

/// Monotonicity (spec §8): holding `stats_b` fixed, increasing `a.ace`
/// must not decrease `p_a_win`, within a tolerance of 3x the binomial
/// standard error at N=20000.
#[test]
fn increasing_serve_ace_does_not_decrease_win_probability() {
    let b = TeamStats::default();
    let model = ConditionalModel::default();
    let options = SimulateOptions {
        schedule: ServingSchedule::Fixed(TeamId::TeamA),
        ..Default::default()
    };
    let n = 20_000;

    let mut low = TeamStats::default();
    low.serve_ace = 0.08;
    let mut high = TeamStats::default();
    high.serve_ace = 0.20;

    let low_result = volley_sim::simulate(&low, &b, n, 42, &model, &options, None, None).unwrap();
    let high_result = volley_sim::simulate(&high, &b, n, 42, &model, &options, None, None).unwrap();

    let se = (low_result.p_a_win * (1.0 - low_result.p_a_win) / n as f64).sqrt();
    assert!(
        high_result.p_a_win >= low_result.p_a_win - 3.0 * se,
        "low={} high={} se={}",
        low_result.p_a_win,
        high_result.p_a_win,
        se
    );
}

/// Determinism (spec §8): the same `(master_seed, n, stats, schedule)`
/// yields bit-identical win counts regardless of worker count.
#[test]
fn simulate_is_deterministic_across_worker_counts() {
    let a = TeamStats::default();
    let b = TeamStats::default();
    let model = ConditionalModel::default();
    let base_options = SimulateOptions {
        schedule: ServingSchedule::Fixed(TeamId::TeamA),
        ..Default::default()
    };

    let mut results = Vec::new();
    for workers in [1usize, 2, 4, 8] {
        let options = SimulateOptions {
            workers: Some(workers),
            ..base_options.clone()
        };
        results.push(volley_sim::simulate(&a, &b, 20_000, 123, &model, &options, None, None).unwrap());
    }
    for pair in results.windows(2) {
        assert_eq!(pair[0].wins_a, pair[1].wins_a);
        assert_eq!(pair[0].wins_b, pair[1].wins_b);
    }
}
