//! Per-agent battle history records

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::types::{Amount, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleResult {
    Win,
    Loss,
}

/// One settled round from a single agent's point of view. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub id: Uuid,
    pub opponent: String,
    pub result: BattleResult,
    pub earnings: Amount,
    pub timestamp: Timestamp,
    pub is_tournament: bool,
    /// 1-based placement, only set for top-3 finishers
    pub rank: Option<u32>,
}

impl BattleRecord {
    pub fn new(opponent: impl Into<String>, result: BattleResult, earnings: Amount) -> Self {
        Self {
            id: Uuid::new_v4(),
            opponent: opponent.into(),
            result,
            earnings,
            timestamp: Utc::now(),
            is_tournament: false,
            rank: None,
        }
    }

    pub fn tournament(mut self, rank: Option<u32>) -> Self {
        self.is_tournament = true;
        self.rank = rank;
        self
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_win(&self) -> bool {
        self.result == BattleResult::Win
    }
}
