//! The Monte Carlo Driver: parallel, seedable batches of independent
//! rallies, aggregated by commutative integer addition so the result is
//! bit-identical for a given `(master_seed, n, stats, schedule)`
//! regardless of worker count (spec §4.3, §5).

use crate::ci::{bootstrap_interval, wilson_interval};
use crate::config::{ServingSchedule, SimulateOptions};
use crate::error::{Result, SimError};
use crate::model::{ConditionalModel, SimulationResult, TeamId};
use crate::rally::{step_rally, RallyOptions};
use crate::stats::TeamStats;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation signal, checked at shard boundaries (every
/// <=1024 rallies per spec §5). Grounded in the teacher's
/// `background_simulation::cancellation_requested` flag, simplified to a
/// lock-free `AtomicBool` since shards only ever read it.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

const CHECK_INTERVAL: u64 = 1024;

/// Per-rally seed derivation (SplitMix64 finalizer over `master_seed` mixed
/// with the rally's *global* index). Seeding per rally rather than once per
/// shard is what actually gives spec §4.3's "identical results regardless of
/// W": a shard only decides which indices it computes, never what
/// randomness a given index consumes, so re-partitioning N rallies across a
/// different shard count can't change any individual rally's outcome.
fn rally_seed(master_seed: u64, global_index: u64) -> u64 {
    let mut z = master_seed.wrapping_add(global_index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// `W = min(available workers, ceil(n / 1024))` per spec §4.3.
fn shard_count(n: u64, workers: Option<usize>) -> usize {
    let available = workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|v| v.get())
            .unwrap_or(1)
    });
    let by_work = (n as f64 / 1024.0).ceil().max(1.0) as usize;
    available.min(by_work).max(1)
}

struct ShardOutcome {
    wins_a: u64,
    wins_b: u64,
    completed: u64,
    wins_trace: Option<Vec<bool>>,
    cancelled: bool,
}

fn run_shard(
    stats_a: &TeamStats,
    stats_b: &TeamStats,
    count: u64,
    shard_offset: u64,
    master_seed: u64,
    model: &ConditionalModel,
    options: &SimulateOptions,
    cancel: Option<&CancelToken>,
    deadline: Option<Instant>,
) -> Result<ShardOutcome> {
    let rally_options = RallyOptions {
        fuel: options.fuel,
        retain_trajectory: false,
    };

    let mut wins_a = 0u64;
    let mut wins_b = 0u64;
    let mut wins_trace = options.momentum.enabled.then(Vec::new);

    let mut current_server = match options.schedule {
        ServingSchedule::Fixed(team) => team,
        ServingSchedule::LoserServes => TeamId::TeamA,
    };
    let mut consecutive_serve_wins: u8 = 0;

    for i in 0..count {
        if i % CHECK_INTERVAL == 0 {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Ok(ShardOutcome {
                    wins_a,
                    wins_b,
                    completed: i,
                    wins_trace,
                    cancelled: true,
                });
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(ShardOutcome {
                    wins_a,
                    wins_b,
                    completed: i,
                    wins_trace,
                    cancelled: true,
                });
            }
        }

        let (server_stats_a, server_stats_b) = if options.momentum.enabled && consecutive_serve_wins > 0 {
            apply_momentum(stats_a, stats_b, current_server, consecutive_serve_wins, &options.momentum.boost)
        } else {
            (*stats_a, *stats_b)
        };

        let mut rng = ChaCha8Rng::seed_from_u64(rally_seed(master_seed, shard_offset + i));
        let outcome = step_rally(
            &server_stats_a,
            &server_stats_b,
            current_server,
            model,
            &mut rng,
            &rally_options,
        )?;

        match outcome.winner {
            TeamId::TeamA => wins_a += 1,
            TeamId::TeamB => wins_b += 1,
        }
        if let Some(trace) = wins_trace.as_mut() {
            trace.push(outcome.winner == TeamId::TeamA);
        }

        if outcome.winner == current_server {
            consecutive_serve_wins = (consecutive_serve_wins + 1).min(3);
        } else {
            consecutive_serve_wins = 0;
        }
        let next_server = match options.schedule {
            ServingSchedule::Fixed(team) => team,
            ServingSchedule::LoserServes => outcome.winner.other(),
        };
        if next_server != current_server {
            consecutive_serve_wins = 0;
        }
        current_server = next_server;
    }

    Ok(ShardOutcome {
        wins_a,
        wins_b,
        completed: count,
        wins_trace,
        cancelled: false,
    })
}

fn apply_momentum(
    stats_a: &TeamStats,
    stats_b: &TeamStats,
    server: TeamId,
    consecutive_wins: u8,
    boost: &[f64; 3],
) -> (TeamStats, TeamStats) {
    let boost_amount = boost[(consecutive_wins.saturating_sub(1)).min(2) as usize];
    match server {
        TeamId::TeamA => {
            let mut a = *stats_a;
            a.serve_ace = (a.serve_ace + boost_amount).min(1.0 - a.serve_error);
            (a, *stats_b)
        }
        TeamId::TeamB => {
            let mut b = *stats_b;
            b.serve_ace = (b.serve_ace + boost_amount).min(1.0 - b.serve_error);
            (*stats_a, b)
        }
    }
}

/// Run `n` independent rallies split across shards and aggregate the
/// result. A first-observed error (from any shard) is surfaced and the
/// rest of the work discarded, per spec §7's "aggregates a single
/// first-observed error across shards" propagation policy.
pub fn simulate(
    stats_a: &TeamStats,
    stats_b: &TeamStats,
    n: u64,
    master_seed: u64,
    model: &ConditionalModel,
    options: &SimulateOptions,
    cancel: Option<&CancelToken>,
    deadline: Option<Instant>,
) -> Result<SimulationResult> {
    stats_a.validate()?;
    stats_b.validate()?;
    model.validate()?;

    let start = Instant::now();
    let shards = shard_count(n, options.workers);
    let base = n / shards as u64;
    let remainder = n % shards as u64;
    let shard_sizes: Vec<u64> = (0..shards)
        .map(|i| base + u64::from((i as u64) < remainder))
        .collect();
    let shard_offsets: Vec<u64> = shard_sizes
        .iter()
        .scan(0u64, |acc, &size| {
            let offset = *acc;
            *acc += size;
            Some(offset)
        })
        .collect();

    log::info!("simulate: n={n} shards={shards} master_seed={master_seed}");

    let shard_results: Vec<Result<ShardOutcome>> = shard_sizes
        .par_iter()
        .zip(shard_offsets.par_iter())
        .map(|(&count, &offset)| {
            run_shard(
                stats_a,
                stats_b,
                count,
                offset,
                master_seed,
                model,
                options,
                cancel,
                deadline,
            )
        })
        .collect();

    let mut wins_a = 0u64;
    let mut wins_b = 0u64;
    let mut completed = 0u64;
    let mut was_cancelled = false;
    let mut wins_trace: Vec<bool> = Vec::new();
    let mut first_error: Option<SimError> = None;

    for result in shard_results {
        match result {
            Ok(shard) => {
                wins_a += shard.wins_a;
                wins_b += shard.wins_b;
                completed += shard.completed;
                was_cancelled |= shard.cancelled;
                if let Some(trace) = shard.wins_trace {
                    wins_trace.extend(trace);
                }
            }
            Err(e) => {
                log::error!("shard failed: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    if was_cancelled {
        log::warn!("simulate: cancelled after {completed} rallies");
        return Err(SimError::Cancelled { completed });
    }

    let total = wins_a + wins_b;
    let p_a_win = if total > 0 {
        wins_a as f64 / total as f64
    } else {
        0.0
    };
    let (ci_low, ci_high) = if options.momentum.enabled {
        let mut rng = ChaCha8Rng::seed_from_u64(master_seed.wrapping_add(0x5151_5151));
        bootstrap_interval(&wins_trace, options.momentum.bootstrap_samples, &mut rng)
    } else {
        wilson_interval(wins_a, total)
    };

    Ok(SimulationResult {
        n: total,
        wins_a,
        wins_b,
        p_a_win,
        ci_low,
        ci_high,
        seed: master_seed,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_teams_is_close_to_half() {
        let a = TeamStats::default();
        let b = TeamStats::default();
        let model = ConditionalModel::default();
        let options = SimulateOptions {
            schedule: ServingSchedule::Fixed(TeamId::TeamA),
            ..Default::default()
        };
        let result = simulate(&a, &b, 20_000, 42, &model, &options, None, None).unwrap();
        assert!(result.p_a_win > 0.49 && result.p_a_win < 0.51, "{}", result.p_a_win);
    }

    #[test]
    fn deterministic_regardless_of_worker_count() {
        let a = TeamStats::default();
        let b = TeamStats::default();
        let model = ConditionalModel::default();
        let mut one_worker = SimulateOptions {
            schedule: ServingSchedule::Fixed(TeamId::TeamA),
            workers: Some(1),
            ..Default::default()
        };
        let mut many_workers = one_worker.clone();
        many_workers.workers = Some(8);
        let r1 = simulate(&a, &b, 20_000, 7, &model, &one_worker, None, None).unwrap();
        let r2 = simulate(&a, &b, 20_000, 7, &model, &many_workers, None, None).unwrap();
        assert_eq!(r1.wins_a, r2.wins_a);
        assert_eq!(r1.wins_b, r2.wins_b);
        one_worker.workers = Some(1);
        let r3 = simulate(&a, &b, 20_000, 7, &model, &one_worker, None, None).unwrap();
        assert_eq!(r1.wins_a, r3.wins_a);
    }

    #[test]
    fn cancellation_stops_early() {
        let a = TeamStats::default();
        let b = TeamStats::default();
        let model = ConditionalModel::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let options = SimulateOptions::default();
        let result = simulate(&a, &b, 100_000, 1, &model, &options, Some(&cancel), None);
        assert!(matches!(result, Err(SimError::Cancelled { .. })));
    }

    #[test]
    fn dominant_serve_favors_team_a() {
        let mut a = TeamStats::default();
        a.serve_ace = 0.25;
        let b = TeamStats::default();
        let model = ConditionalModel::default();
        let options = SimulateOptions {
            schedule: ServingSchedule::Fixed(TeamId::TeamA),
            ..Default::default()
        };
        let result = simulate(&a, &b, 20_000, 42, &model, &options, None, None).unwrap();
        assert!(result.p_a_win >= 0.58, "{}", result.p_a_win);
    }
}
