//! Crate-wide error taxonomy, following the shape of a hand-rolled
//! `SimulationError` enum: tagged variants carrying a human-readable
//! message, `Display` and `std::error::Error` implemented by hand.

use crate::model::AttributionReport;
use serde::{Deserialize, Serialize};

/// The exhaustive error taxonomy for the simulation core (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SimError {
    /// A field was out of range, a distribution failed to sum to 1 within
    /// tolerance, or a conditional model row was malformed.
    InvalidStats {
        field: String,
        value: f64,
        message: String,
    },
    /// A rally exceeded its step fuel before reaching a terminal state.
    BudgetExceeded { fuel: u16 },
    /// A cooperative cancel or deadline fired partway through a batch.
    Cancelled { completed: u64 },
    /// The classifier produced non-finite values or failed to converge.
    ModelFitFailure { message: String },
    /// The outcome class was near-constant; holds the partial report
    /// (importances populated, no SHAP) rather than discarding it.
    DegenerateOutcome { report: Box<AttributionReport> },
    /// Any unexpected invariant violation. Bug-class; must be reproducible
    /// from the seed that triggered it.
    InternalError { message: String },
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::InvalidStats {
                field,
                value,
                message,
            } => write!(f, "invalid stats: {field}={value}: {message}"),
            SimError::BudgetExceeded { fuel } => {
                write!(f, "rally exceeded fuel budget of {fuel} steps")
            }
            SimError::Cancelled { completed } => {
                write!(f, "cancelled after {completed} completed rallies")
            }
            SimError::ModelFitFailure { message } => write!(f, "model fit failure: {message}"),
            SimError::DegenerateOutcome { .. } => {
                write!(f, "degenerate outcome: label distribution is near-constant")
            }
            SimError::InternalError { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for SimError {}

impl SimError {
    pub fn invalid_stats(field: impl Into<String>, value: f64, message: impl Into<String>) -> Self {
        SimError::InvalidStats {
            field: field.into(),
            value,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SimError::InternalError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
