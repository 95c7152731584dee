//! Agents - the combatants that fight in the arena
//!
//! An agent carries a rolled stat block, its own balance, and an append-only
//! battle history. Derived fields (`total_stats`, `win_rate`) are recomputed
//! from their sources and have no setters.

pub mod rarity;
pub mod record;

pub use rarity::{Rarity, Stats};
pub use record::{BattleRecord, BattleResult};

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::types::{AgentId, Amount, Owner, Timestamp};

/// Leverage multipliers an agent may be configured with
pub const ALLOWED_LEVERAGE: [u32; 7] = [1, 2, 5, 10, 20, 50, 100];

/// Lifecycle status
///
/// ```text
/// idle --join--> in_arena --selected--> fighting --survived--> in_arena
///   ^               |                      |
///   +-----leave-----+                      +--eliminated--> liquidated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    InArena,
    Fighting,
    Liquidated,
}

impl AgentStatus {
    /// Sort key used by the squad listing
    pub fn order(self) -> u8 {
        match self {
            AgentStatus::Idle => 0,
            AgentStatus::InArena => 1,
            AgentStatus::Fighting => 2,
            AgentStatus::Liquidated => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Long,
    Short,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub owner: Owner,
    pub name: String,
    pub rarity: Rarity,
    stats: Stats,
    total_stats: u32,
    pub balance: Amount,
    pub initial_balance: Amount,
    pub net_profit: Amount,
    pub leverage: u32,
    pub position: Position,
    pub status: AgentStatus,
    pub hp: u32,
    pub max_hp: u32,
    pub total_battles: u32,
    pub tournament_wins: u32,
    pub tournament_top3: u32,
    pub kills: u32,
    win_rate: u32,
    battle_history: Vec<BattleRecord>,
    pub created_at: Timestamp,
}

impl Agent {
    pub fn new(owner: Owner, name: String, rarity: Rarity, stats: Stats, position: Position) -> Self {
        let max_hp = rarity.base_hp() + stats.defense;
        Self {
            id: AgentId::new(),
            owner,
            name,
            rarity,
            stats,
            total_stats: stats.total(),
            balance: 0,
            initial_balance: 0,
            net_profit: 0,
            leverage: 1,
            position,
            status: AgentStatus::Idle,
            hp: max_hp,
            max_hp,
            total_battles: 0,
            tournament_wins: 0,
            tournament_top3: 0,
            kills: 0,
            win_rate: 0,
            battle_history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Roll a fresh idle agent of the given rarity
    pub fn roll<R: Rng + ?Sized>(owner: Owner, rarity: Rarity, rng: &mut R) -> Self {
        let stats = Stats::roll(rarity, rng);
        let position = if rng.gen_bool(0.5) { Position::Long } else { Position::Short };
        let name = generate_agent_name(rng);
        Self::new(owner, name, rarity, stats, position)
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Sum of the five stats; always in sync with `stats()`
    pub fn total_stats(&self) -> u32 {
        self.total_stats
    }

    /// Win percentage (0-100) over the full battle history
    pub fn win_rate(&self) -> u32 {
        self.win_rate
    }

    /// Battle history, newest first
    pub fn battle_history(&self) -> &[BattleRecord] {
        &self.battle_history
    }

    /// Percent change of the balance against the first funded balance
    pub fn pnl_percent(&self) -> f64 {
        if self.initial_balance > 0 {
            (self.balance - self.initial_balance) as f64 / self.initial_balance as f64 * 100.0
        } else {
            0.0
        }
    }

    pub(crate) fn push_record(&mut self, record: BattleRecord) {
        self.battle_history.insert(0, record);
        self.win_rate = compute_win_rate(&self.battle_history);
    }
}

fn compute_win_rate(history: &[BattleRecord]) -> u32 {
    if history.is_empty() {
        return 0;
    }
    let wins = history.iter().filter(|r| r.is_win()).count() as f64;
    (wins * 100.0 / history.len() as f64).round() as u32
}

fn generate_agent_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let prefixes = ["Neon", "Iron", "Void", "Flux", "Nova", "Rogue", "Apex", "Echo", "Hex", "Zero"];
    let suffixes = ["Fang", "Pulse", "Warden", "Shade", "Striker", "Vector", "Bull", "Bear", "Cipher", "Drift"];

    let prefix = prefixes[rng.gen_range(0..prefixes.len())];
    let suffix = suffixes[rng.gen_range(0..suffixes.len())];

    format!("{}{} #{:03}", prefix, suffix, rng.gen_range(0..1000))
}
