//! Arena round cycle: phases, the step-wise scheduler and its async driver

pub mod phase;
pub mod runtime;
pub mod scheduler;

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::battle::TopEntry;
use crate::core::types::RoundNumber;
use crate::log::LogEntry;

pub use phase::Phase;
pub use runtime::{ArenaRuntime, SharedGame};
pub use scheduler::{sample_participants, RoundContext, RoundScheduler};

/// Read-only view of the arena for observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaSnapshot {
    pub phase: Phase,
    pub round_number: RoundNumber,
    /// Agent snapshots in slot order
    pub participants: Vec<Agent>,
    pub selected_slots: Vec<usize>,
    pub countdown: u32,
    pub top3: Vec<TopEntry>,
    /// Arena stream, newest first
    pub battle_logs: Vec<LogEntry>,
    pub initialized: bool,
}

impl ArenaSnapshot {
    /// Participants whose slot has been revealed so far
    pub fn revealed(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.selected_slots
            .iter()
            .filter_map(move |&slot| self.participants.get(slot))
    }
}
