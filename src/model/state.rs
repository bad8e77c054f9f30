use serde::{Deserialize, Serialize};

/// Identifies one of the two teams in a point. Beach volleyball is 2-a-side,
/// but the simulator only ever needs to know "which side", not roster detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamId {
    TeamA,
    TeamB,
}

impl TeamId {
    /// The other team. There are only two, so this is total and infallible.
    pub fn other(self) -> TeamId {
        match self {
            TeamId::TeamA => TeamId::TeamB,
            TeamId::TeamB => TeamId::TeamA,
        }
    }
}

/// Ordinal quality tag shared by reception and set outcomes. Used as the
/// lookup key into `ConditionalModel`'s tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality3 {
    Perfect,
    Good,
    Poor,
}

impl Quality3 {
    pub const ALL: [Quality3; 3] = [Quality3::Perfect, Quality3::Good, Quality3::Poor];

    pub fn index(self) -> usize {
        match self {
            Quality3::Perfect => 0,
            Quality3::Good => 1,
            Quality3::Poor => 2,
        }
    }
}

/// A single state in the rally Markov chain. Non-terminal states are the
/// contact/quality tags; `PointFor` is the only terminal variant — serve
/// aces, kills, digs-gone-wrong, etc. all collapse directly into it rather
/// than getting their own terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RallyState {
    ServeAttempt,
    ServeInPlay,
    ReceptionPerfect,
    ReceptionGood,
    ReceptionPoor,
    SetPerfect,
    SetGood,
    SetPoor,
    AttackDefended,
    PointFor(TeamId),
}

impl RallyState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RallyState::PointFor(_))
    }

    pub fn reception(quality: Quality3) -> RallyState {
        match quality {
            Quality3::Perfect => RallyState::ReceptionPerfect,
            Quality3::Good => RallyState::ReceptionGood,
            Quality3::Poor => RallyState::ReceptionPoor,
        }
    }

    pub fn set(quality: Quality3) -> RallyState {
        match quality {
            Quality3::Perfect => RallyState::SetPerfect,
            Quality3::Good => RallyState::SetGood,
            Quality3::Poor => RallyState::SetPoor,
        }
    }

    /// The reception/set quality this state carries, if any. `None` for
    /// serve and terminal states.
    pub fn quality(self) -> Option<Quality3> {
        match self {
            RallyState::ReceptionPerfect | RallyState::SetPerfect => Some(Quality3::Perfect),
            RallyState::ReceptionGood | RallyState::SetGood => Some(Quality3::Good),
            RallyState::ReceptionPoor | RallyState::SetPoor => Some(Quality3::Poor),
            _ => None,
        }
    }
}
