//! Snapshot tests for regression detection on the core's stable,
//! non-stochastic surfaces: error message formatting and the feature
//! table's shape. Grounded on the teacher's `tests/snapshot_tests.rs`
//! (`insta` snapshotting a small summary rather than a raw result), adapted
//! to inline snapshots here since these values are pinned by source, not by
//! a Monte Carlo run that would need a recorded baseline to compare against.

use volley_sim::model::ConditionalModel;
use volley_sim::{SimError, TEAM_FEATURES};

/// Pins `SimError`'s `Display` wording for the two most commonly
/// surfaced variants. A wording change here is user-visible (spec §7: "a
/// human-readable message including the offending feature name and value
/// where applicable") and should be a deliberate edit, not a typo.
#[test]
fn budget_exceeded_message_is_stable() {
    let err = SimError::BudgetExceeded { fuel: 256 };
    insta::assert_snapshot!(err.to_string(), @"rally exceeded fuel budget of 256 steps");
}

#[test]
fn invalid_stats_message_is_stable() {
    let err = SimError::invalid_stats("serve_ace", 1.5, "rate must lie in [0, 1]");
    insta::assert_snapshot!(err.to_string(), @"invalid stats: serve_ace=1.5: rate must lie in [0, 1]");
}

/// Pins the ordered feature table spec §9 calls for in place of reflective
/// field access: the perturbation generator, feature importances, and SHAP
/// all walk this list, so a silent reorder or category change would shift
/// meaning across all three without changing any type signature.
#[test]
fn feature_table_shape_is_stable() {
    let summary = TEAM_FEATURES
        .iter()
        .map(|f| format!("{}:{:?}:{}", f.name, f.category, f.perturbable))
        .collect::<Vec<_>>()
        .join(", ");
    insta::assert_snapshot!(summary, @"serve_ace:Serve:true, serve_error:Serve:true, reception_perfect:Reception:true, reception_good:Reception:true, reception_poor:Reception:true, reception_error:Reception:true, ball_handling_error:Setting:true, attack_kill:Attack:true, attack_error:Attack:true, dig:Defense:true, block_kill:Defense:true, controlled_block:Defense:true, block_error:Defense:true, hitting_efficiency:Derived:false, serve_in_play:Derived:false");
}

/// Pins the canonical conditional-model defaults spec §4.1 enumerates, so
/// an accidental edit to the kernel's default tables is caught here rather
/// than only showing up as a shifted win probability downstream.
#[test]
fn default_conditional_model_values_are_stable() {
    let model = ConditionalModel::default();
    let summary = format!(
        "set|P={:.2}/{:.2}/{:.2} G={:.2}/{:.2}/{:.2} Pr={:.2}/{:.2}/{:.2}; atk|P={:.2}/{:.2} G={:.2}/{:.2} Pr={:.2}/{:.2}; w_block={:.1} w_dig={:.1}",
        model.set_quality_given_reception[0].perfect,
        model.set_quality_given_reception[0].good,
        model.set_quality_given_reception[0].poor,
        model.set_quality_given_reception[1].perfect,
        model.set_quality_given_reception[1].good,
        model.set_quality_given_reception[1].poor,
        model.set_quality_given_reception[2].perfect,
        model.set_quality_given_reception[2].good,
        model.set_quality_given_reception[2].poor,
        model.attack_outcome_given_set[0].kill,
        model.attack_outcome_given_set[0].error,
        model.attack_outcome_given_set[1].kill,
        model.attack_outcome_given_set[1].error,
        model.attack_outcome_given_set[2].kill,
        model.attack_outcome_given_set[2].error,
        model.w_block,
        model.w_dig,
    );
    insta::assert_snapshot!(summary, @"set|P=0.90/0.08/0.02 G=0.60/0.35/0.05 Pr=0.20/0.60/0.20; atk|P=0.60/0.15 G=0.40/0.20 Pr=0.20/0.35; w_block=0.4 w_dig=0.6");
}
