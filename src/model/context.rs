use crate::model::state::{Quality3, RallyState, TeamId};
use serde::{Deserialize, Serialize};

/// Mutable bookkeeping for a single rally, discarded once the rally
/// terminates. `TeamStats`/`ConditionalModel` are read-only and live
/// outside this struct; it only tracks whose ball it is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RallyContext {
    pub serving: TeamId,
    pub possession: TeamId,
    pub rally_quality_carry: Option<Quality3>,
    pub contact_count: u16,
    pub prev_state: RallyState,
}

impl RallyContext {
    pub fn new(serving: TeamId) -> Self {
        Self {
            serving,
            possession: serving,
            rally_quality_carry: None,
            contact_count: 0,
            prev_state: RallyState::ServeAttempt,
        }
    }

    /// Advance bookkeeping after sampling `next`. Possession switches are
    /// pinned to exactly two points in the state machine (spec §4.2):
    /// receiving the serve, and the defender taking over after an attack.
    /// `contact_count` increments on every step, since every transition in
    /// the chain represents a contact (serve, reception, set, attack, dig,
    /// or block).
    pub fn advance(&mut self, next: RallyState) {
        match (self.prev_state, next) {
            (RallyState::ServeAttempt, RallyState::ServeInPlay) => {
                self.possession = self.possession.other();
            }
            (RallyState::SetPerfect | RallyState::SetGood | RallyState::SetPoor, RallyState::AttackDefended) => {
                self.possession = self.possession.other();
            }
            _ => {}
        }
        if let Some(quality) = next.quality() {
            self.rally_quality_carry = Some(quality);
        }
        self.contact_count = self.contact_count.saturating_add(1);
        self.prev_state = next;
    }
}
