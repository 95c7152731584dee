//! Arena configuration with documented constants
//!
//! All pacing and economy numbers are collected here. Every section has a
//! `Default` matching the live arena, and the whole config can be loaded
//! from TOML with any subset of keys present.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::battle::OutcomePolicy;
use crate::core::error::{ArenaError, Result};
use crate::core::types::Amount;

/// Top-level configuration for a game instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Seed for the game RNG (agent rolls, selection, outcomes)
    pub seed: u64,

    /// Maximum number of participants drawn into one round
    pub participant_cap: usize,

    /// Entries kept per log stream before the oldest are dropped
    pub log_retention: usize,

    /// Entries kept in the wallet transaction journal
    pub journal_retention: usize,

    pub timing: TimingConfig,
    pub economy: EconomyConfig,
    pub outcome: OutcomePolicy,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            seed: 0x00A1_2E4A,
            participant_cap: 10,
            log_retention: 100,
            journal_retention: 200,
            timing: TimingConfig::default(),
            economy: EconomyConfig::default(),
            outcome: OutcomePolicy::default(),
        }
    }
}

/// Phase durations of the round cycle
///
/// A full round with N participants takes roughly
/// `N * slot_reveal + (countdown_ticks + fighting_ticks) * tick + settlement_hold + waiting`.
/// With the defaults and a full arena that is 3s + 3s + 10s + 5s = 21s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between arena initialization and the first round
    pub start_delay_ms: u64,

    /// Spacing between slot reveals during selection
    pub slot_reveal_ms: u64,

    /// Length of one countdown / fighting tick
    pub tick_ms: u64,

    /// Number of pre-battle countdown ticks
    pub countdown_ticks: u32,

    /// Number of fighting ticks
    pub fighting_ticks: u32,

    /// How long settlement stays observable before waiting begins
    pub settlement_hold_ms: u64,

    /// Pause between the end of one round and the next selection
    pub waiting_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            start_delay_ms: 2_000,
            slot_reveal_ms: 300,
            tick_ms: 1_000,
            countdown_ticks: 3,
            fighting_ticks: 10,
            settlement_hold_ms: 0,
            waiting_ms: 5_000,
        }
    }
}

impl TimingConfig {
    /// Same cycle shape with every duration divided by `factor`
    ///
    /// Used by the headless runner to replay many rounds quickly.
    pub fn scaled_down(&self, factor: u64) -> Self {
        let factor = factor.max(1);
        Self {
            start_delay_ms: self.start_delay_ms / factor,
            slot_reveal_ms: self.slot_reveal_ms / factor,
            tick_ms: self.tick_ms / factor,
            countdown_ticks: self.countdown_ticks,
            fighting_ticks: self.fighting_ticks,
            settlement_hold_ms: self.settlement_hold_ms / factor,
            waiting_ms: self.waiting_ms / factor,
        }
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn slot_reveal(&self) -> Duration {
        Duration::from_millis(self.slot_reveal_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn settlement_hold(&self) -> Duration {
        Duration::from_millis(self.settlement_hold_ms)
    }

    pub fn waiting(&self) -> Duration {
        Duration::from_millis(self.waiting_ms)
    }
}

/// Wallet and agent economy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Wallet debit for minting one agent
    pub mint_cost: Amount,

    /// Balance credited when a wallet connects
    pub starting_balance: Amount,

    /// System agents seeded on arena initialization
    pub system_agent_count: usize,

    /// Lower bound of a seeded system agent's balance
    pub system_balance_min: Amount,

    /// Upper bound (inclusive) of a seeded system agent's balance
    pub system_balance_max: Amount,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            mint_cost: 100,
            starting_balance: 1_000,
            system_agent_count: 20,
            system_balance_min: 100,
            system_balance_max: 1_000,
        }
    }
}

impl ArenaConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML; missing keys fall back to defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ArenaConfig =
            toml::from_str(content).map_err(|e| ArenaError::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.participant_cap == 0 {
            return Err(ArenaError::Config("participant_cap must be at least 1".into()));
        }
        if self.log_retention == 0 || self.journal_retention == 0 {
            return Err(ArenaError::Config("retention caps must be positive".into()));
        }
        if self.timing.countdown_ticks == 0 || self.timing.fighting_ticks == 0 {
            return Err(ArenaError::Config("countdown_ticks and fighting_ticks must be positive".into()));
        }
        if self.economy.mint_cost <= 0 {
            return Err(ArenaError::Config(format!(
                "mint_cost ({}) must be positive",
                self.economy.mint_cost
            )));
        }
        if self.economy.starting_balance < 0 {
            return Err(ArenaError::Config("starting_balance must not be negative".into()));
        }
        if self.economy.system_balance_min <= 0
            || self.economy.system_balance_min > self.economy.system_balance_max
        {
            return Err(ArenaError::Config(format!(
                "system balance range {}..={} is invalid",
                self.economy.system_balance_min, self.economy.system_balance_max
            )));
        }
        self.outcome.validate().map_err(ArenaError::Config)?;
        Ok(())
    }
}
