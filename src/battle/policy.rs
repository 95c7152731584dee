//! Outcome policy - the tunable odds and payouts of a round

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, Stats};
use crate::core::types::Amount;

/// How survivors with equal profit are ordered in the top 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Higher total stats first, then earlier selection slot
    #[default]
    StatsThenSlot,
    /// Earlier selection slot first
    Slot,
    /// Uniformly random among the tied
    Random,
}

/// Survival odds and profit/loss bounds
///
/// Survival chance is additive, never multiplicative:
/// `base_survival + stat_weight * total_stats / max_total - leverage_penalty * ln(leverage)`,
/// clamped to `[min_survival, max_survival]`. With the defaults a 1x common
/// agent survives about 72% of rounds and a 100x one about 49%.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomePolicy {
    pub base_survival: f64,
    pub stat_weight: f64,
    pub leverage_penalty: f64,
    pub min_survival: f64,
    pub max_survival: f64,

    /// Survivor profit is drawn from `0..max_profit`
    pub max_profit: Amount,

    /// Non-survivor loss is drawn from `0..max_loss`, capped at the balance
    pub max_loss: Amount,

    /// Multiply drawn profit and loss by the agent's leverage
    pub scale_by_leverage: bool,

    pub tie_break: TieBreak,
}

impl Default for OutcomePolicy {
    fn default() -> Self {
        Self {
            base_survival: 0.7,
            stat_weight: 0.2,
            leverage_penalty: 0.05,
            min_survival: 0.05,
            max_survival: 0.95,
            max_profit: 100,
            max_loss: 50,
            scale_by_leverage: true,
            tie_break: TieBreak::default(),
        }
    }
}

impl OutcomePolicy {
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            ("base_survival", self.base_survival),
            ("stat_weight", self.stat_weight),
            ("leverage_penalty", self.leverage_penalty),
            ("min_survival", self.min_survival),
            ("max_survival", self.max_survival),
        ];
        if let Some((name, value)) = weights.iter().find(|(_, value)| !value.is_finite()) {
            return Err(format!("{} must be a finite number, got {}", name, value));
        }
        if !(0.0..=1.0).contains(&self.min_survival)
            || !(0.0..=1.0).contains(&self.max_survival)
            || self.min_survival > self.max_survival
        {
            return Err(format!(
                "survival bounds [{}, {}] must be ordered within [0, 1]",
                self.min_survival, self.max_survival
            ));
        }
        if self.max_profit <= 0 || self.max_loss <= 0 {
            return Err("max_profit and max_loss must be positive".into());
        }
        if self.stat_weight < 0.0 || self.leverage_penalty < 0.0 {
            return Err("stat_weight and leverage_penalty must not be negative".into());
        }
        Ok(())
    }

    pub fn survival_chance(&self, agent: &Agent) -> f64 {
        let stat_bonus = self.stat_weight * agent.total_stats() as f64 / Stats::max_total() as f64;
        let leverage_cost = self.leverage_penalty * (agent.leverage.max(1) as f64).ln();
        (self.base_survival + stat_bonus - leverage_cost).clamp(self.min_survival, self.max_survival)
    }

    pub(crate) fn leverage_factor(&self, agent: &Agent) -> Amount {
        if self.scale_by_leverage {
            agent.leverage.max(1) as Amount
        } else {
            1
        }
    }
}
