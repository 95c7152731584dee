//! Battle resolution - turns a finalized participant set into results

pub mod policy;
pub mod resolver;

pub use policy::{OutcomePolicy, TieBreak};
pub use resolver::{BattleResolver, ParticipantOutcome, RoundOutcome, TopEntry, ARENA_OPPONENT};
