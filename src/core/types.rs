//! Core type definitions used throughout the codebase

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whole currency units. Signed so deltas and PnL share one type.
pub type Amount = i64;

/// Wall-clock timestamp attached to records, log entries and transactions
pub type Timestamp = DateTime<Utc>;

/// Round counter (monotonic, starts at 0 before the first round)
pub type RoundNumber = u64;

/// Unique identifier for agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who owns an agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    /// A connected user, identified by wallet address
    User(String),
    /// Arena house agents; they have no wallet behind them
    System,
}

impl Owner {
    pub fn is_system(&self) -> bool {
        matches!(self, Owner::System)
    }
}

/// Login provider used to connect a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Twitter,
    Google,
    Wallet,
}
