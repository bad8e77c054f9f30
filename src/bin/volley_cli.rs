//! Thin CLI wrapper over the three library entry points (spec §2, §6): no
//! core logic lives here, only argument parsing, JSON I/O, and formatting.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use volley_sim::{
    attribute, simulate, single_rally, AttributeConfig, ConditionalModel, ModelFamily, ServingSchedule,
    SimulateOptions, TeamId, TeamStats,
};

#[derive(Parser)]
#[command(name = "volley_cli")]
#[command(about = "CLI tools for beach-volleyball point simulation and attribution")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run N independent rallies and report the aggregated win probability.
    Simulate {
        /// Path to team A's stats JSON file.
        team_a: PathBuf,
        /// Path to team B's stats JSON file.
        team_b: PathBuf,
        /// Number of rallies to simulate.
        #[arg(short, long, default_value_t = 20_000)]
        n: u64,
        /// Master seed for the run.
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
        /// Serving schedule: "fixed-a", "fixed-b", or "loser-serves".
        #[arg(long, default_value = "loser-serves")]
        schedule: String,
        /// Number of worker shards (defaults to available parallelism).
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Generate a perturbed dataset, fit a classifier, and report ranked
    /// feature importances and SHAP values.
    Attribute {
        team_a: PathBuf,
        team_b: PathBuf,
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
        /// Number of perturbed design points.
        #[arg(short, long, default_value_t = 300)]
        r: usize,
        /// Model family: "gbt" or "logistic".
        #[arg(short, long, default_value = "gbt")]
        model: String,
    },
    /// Run a single traced rally and print its full state trajectory.
    Rally {
        team_a: PathBuf,
        team_b: PathBuf,
        /// Which team serves: "a" or "b".
        #[arg(long, default_value = "a")]
        serving: String,
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
    },
    /// Sensitivity sweep: vary one feature across a range and plot win rates.
    Sweep {
        team_a: PathBuf,
        team_b: PathBuf,
        /// Feature name to vary, e.g. "serve_ace".
        #[arg(short, long)]
        feature: String,
        /// Range in "start..end" format (e.g. "0.0..0.3").
        #[arg(short, long)]
        range: String,
        /// Number of steps across the range.
        #[arg(long, default_value_t = 10)]
        steps: usize,
        /// Rallies simulated per step.
        #[arg(short, long, default_value_t = 20_000)]
        n: u64,
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
    },
}

fn load_stats(path: &PathBuf) -> TeamStats {
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| panic!("reading {path:?}: {e}"));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("parsing {path:?}: {e}"))
}

fn parse_schedule(schedule: &str) -> ServingSchedule {
    match schedule {
        "fixed-a" => ServingSchedule::Fixed(TeamId::TeamA),
        "fixed-b" => ServingSchedule::Fixed(TeamId::TeamB),
        "loser-serves" => ServingSchedule::LoserServes,
        other => panic!("unknown schedule {other:?}; expected fixed-a, fixed-b, or loser-serves"),
    }
}

fn parse_team(serving: &str) -> TeamId {
    match serving {
        "a" => TeamId::TeamA,
        "b" => TeamId::TeamB,
        other => panic!("unknown team {other:?}; expected a or b"),
    }
}

fn parse_range(range: &str) -> (f64, f64) {
    let (start, end) = range
        .split_once("..")
        .unwrap_or_else(|| panic!("range {range:?} must be in \"start..end\" format"));
    (
        start.trim().parse().expect("range start must be a number"),
        end.trim().parse().expect("range end must be a number"),
    )
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            team_a,
            team_b,
            n,
            seed,
            schedule,
            workers,
        } => run_simulate(&team_a, &team_b, n, seed, &schedule, workers),
        Commands::Attribute {
            team_a,
            team_b,
            seed,
            r,
            model,
        } => run_attribute(&team_a, &team_b, seed, r, &model),
        Commands::Rally {
            team_a,
            team_b,
            serving,
            seed,
        } => run_rally(&team_a, &team_b, &serving, seed),
        Commands::Sweep {
            team_a,
            team_b,
            feature,
            range,
            steps,
            n,
            seed,
        } => run_sweep(&team_a, &team_b, &feature, &range, steps, n, seed),
    }
}

fn run_simulate(team_a: &PathBuf, team_b: &PathBuf, n: u64, seed: u64, schedule: &str, workers: Option<usize>) {
    let a = load_stats(team_a);
    let b = load_stats(team_b);
    let model = ConditionalModel::default();
    let options = SimulateOptions {
        schedule: parse_schedule(schedule),
        workers,
        ..Default::default()
    };
    match simulate(&a, &b, n, seed, &model, &options, None, None) {
        Ok(result) => println!("{}", serde_json::to_string_pretty(&result).unwrap()),
        Err(e) => eprintln!("simulate failed: {e}"),
    }
}

fn run_attribute(team_a: &PathBuf, team_b: &PathBuf, seed: u64, r: usize, model_family: &str) {
    let a = load_stats(team_a);
    let b = load_stats(team_b);
    let model = ConditionalModel::default();
    let chosen_model = match model_family {
        "gbt" => ModelFamily::Gbt(Default::default()),
        "logistic" => ModelFamily::Logistic(Default::default()),
        other => {
            eprintln!("unknown model family {other:?}; expected gbt or logistic");
            return;
        }
    };
    let config = AttributeConfig {
        r_design_points: r,
        master_seed: seed,
        model: chosen_model,
        ..Default::default()
    };
    match attribute(&a, &b, &model, &config) {
        Ok(report) => println!("{}", serde_json::to_string_pretty(&report).unwrap()),
        Err(e) => eprintln!("attribute failed: {e}"),
    }
}

fn run_rally(team_a: &PathBuf, team_b: &PathBuf, serving: &str, seed: u64) {
    let a = load_stats(team_a);
    let b = load_stats(team_b);
    let model = ConditionalModel::default();
    match single_rally(&a, &b, parse_team(serving), seed, &model) {
        Ok(outcome) => println!("{}", serde_json::to_string_pretty(&outcome).unwrap()),
        Err(e) => eprintln!("rally failed: {e}"),
    }
}

/// Vary one feature of team A linearly across `range` and report team A's
/// win probability at each step — the direct analogue of marginal-impact
/// analysis for a single feature, run at full Monte Carlo precision rather
/// than the attribution engine's holdout-based estimate.
fn run_sweep(team_a: &PathBuf, team_b: &PathBuf, feature: &str, range: &str, steps: usize, n: u64, seed: u64) {
    let a = load_stats(team_a);
    let b = load_stats(team_b);
    let model = ConditionalModel::default();
    let (start, end) = parse_range(range);
    let options = SimulateOptions {
        schedule: ServingSchedule::Fixed(TeamId::TeamA),
        ..Default::default()
    };

    println!("{feature},p_a_win");
    for step in 0..=steps {
        let value = start + (end - start) * (step as f64) / (steps.max(1) as f64);
        let baseline = a.get(feature).unwrap_or(0.0);
        let perturbed = a.with_shift(feature, value - baseline);
        match simulate(&perturbed, &b, n, seed, &model, &options, None, None) {
            Ok(result) => println!("{value:.4},{:.4}", result.p_a_win),
            Err(e) => eprintln!("sweep step {feature}={value:.4} failed: {e}"),
        }
    }
}
