use serde::{Deserialize, Serialize};

/// Arena round phases
///
/// Rounds cycle `selecting -> countdown -> fighting -> settlement -> waiting`
/// and back to `selecting`. `idle` is only seen before the first round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Selecting,
    Countdown,
    Fighting,
    Settlement,
    Waiting,
}

impl Phase {
    /// Phase that normally follows this one
    pub fn next(self) -> Phase {
        match self {
            Phase::Idle => Phase::Selecting,
            Phase::Selecting => Phase::Countdown,
            Phase::Countdown => Phase::Fighting,
            Phase::Fighting => Phase::Settlement,
            Phase::Settlement => Phase::Waiting,
            Phase::Waiting => Phase::Selecting,
        }
    }

    /// True while a round is mid-flight
    pub fn is_active(self) -> bool {
        !matches!(self, Phase::Idle | Phase::Waiting)
    }

    /// Whether a new round may be started from this phase
    pub fn can_start_round(self) -> bool {
        matches!(self, Phase::Idle | Phase::Waiting)
    }
}
