//! Agent registry - the only owner of agent records
//!
//! Everything that changes an agent goes through a method here. The scheduler
//! and the game facade hold ids and snapshots, never `&mut Agent` across calls.

use ahash::AHashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentStatus, BattleRecord, Position, Rarity, ALLOWED_LEVERAGE};
use crate::core::error::{ArenaError, Result};
use crate::core::types::{AgentId, Amount, Owner};

/// Sort order for agent listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSort {
    /// Highest balance first
    Balance,
    /// Highest net profit first
    Profit,
    /// Highest leverage first
    Leverage,
    /// idle, in_arena, fighting, liquidated
    Status,
}

/// Aggregate view over one owner's agents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SquadSummary {
    pub agent_count: usize,
    pub total_balance: Amount,
    pub total_profit: Amount,
    /// Mean leverage rounded to one decimal
    pub avg_leverage: f64,
    pub long_count: usize,
    pub short_count: usize,
    pub idle_count: usize,
    pub in_arena_count: usize,
}

#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: AHashMap<AgentId, Agent>,
    /// Insertion order, so listings are stable
    order: Vec<AgentId>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roll a new idle agent and register it
    pub fn create_agent<R: Rng + ?Sized>(&mut self, owner: Owner, rarity: Rarity, rng: &mut R) -> Agent {
        let agent = Agent::roll(owner, rarity, rng);
        self.insert(agent.clone());
        agent
    }

    fn insert(&mut self, agent: Agent) -> AgentId {
        let id = agent.id;
        if self.agents.insert(id, agent).is_none() {
            self.order.push(id);
        }
        id
    }

    pub fn get(&self, id: AgentId) -> Result<&Agent> {
        self.agents.get(&id).ok_or(ArenaError::AgentNotFound(id))
    }

    fn get_mut(&mut self, id: AgentId) -> Result<&mut Agent> {
        self.agents.get_mut(&id).ok_or(ArenaError::AgentNotFound(id))
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn set_status(&mut self, id: AgentId, status: AgentStatus) -> Result<()> {
        self.get_mut(id)?.status = status;
        Ok(())
    }

    /// Apply a signed balance change, returning the new balance
    ///
    /// Fails without touching the agent if the balance would go negative or
    /// overflow, or if funds would be added to a liquidated agent.
    pub fn update_balance(&mut self, id: AgentId, delta: Amount) -> Result<Amount> {
        let agent = self.get_mut(id)?;
        let next = agent
            .balance
            .checked_add(delta)
            .ok_or_else(|| ArenaError::InvalidAmount(delta.to_string()))?;
        if next < 0 {
            return Err(ArenaError::InsufficientAgentBalance {
                requested: -delta,
                available: agent.balance,
            });
        }
        if delta > 0 && agent.status == AgentStatus::Liquidated {
            return Err(ArenaError::AgentBusy { id, status: agent.status });
        }
        if agent.balance == 0 && delta > 0 && agent.initial_balance == 0 {
            agent.initial_balance = delta;
        }
        agent.balance = next;
        Ok(next)
    }

    /// Prepend a battle record and refresh the counters derived from it
    pub fn record_battle_outcome(&mut self, id: AgentId, record: BattleRecord) -> Result<()> {
        let agent = self.get_mut(id)?;
        agent.net_profit += record.earnings;
        agent.total_battles += 1;
        if record.is_tournament {
            match record.rank {
                Some(1) => {
                    agent.tournament_wins += 1;
                    agent.tournament_top3 += 1;
                }
                Some(2) | Some(3) => agent.tournament_top3 += 1,
                _ => {}
            }
        }
        agent.push_record(record);
        Ok(())
    }

    pub fn add_kills(&mut self, id: AgentId, kills: u32) -> Result<()> {
        self.get_mut(id)?.kills += kills;
        Ok(())
    }

    /// Reset combat HP to max, marking the start of a fight
    pub fn restore_hp(&mut self, id: AgentId) -> Result<()> {
        let agent = self.get_mut(id)?;
        agent.hp = agent.max_hp;
        Ok(())
    }

    pub fn set_leverage(&mut self, id: AgentId, leverage: u32) -> Result<()> {
        if !ALLOWED_LEVERAGE.contains(&leverage) {
            return Err(ArenaError::InvalidLeverage(leverage));
        }
        self.get_mut(id)?.leverage = leverage;
        Ok(())
    }

    /// Zero a liquidated agent's balance, returning what was left on it
    pub fn liquidate(&mut self, id: AgentId) -> Result<Amount> {
        let agent = self.get_mut(id)?;
        let residual = agent.balance;
        agent.balance = 0;
        agent.hp = 0;
        agent.status = AgentStatus::Liquidated;
        Ok(residual)
    }

    pub fn remove(&mut self, id: AgentId) -> Result<Agent> {
        let agent = self.agents.remove(&id).ok_or(ArenaError::AgentNotFound(id))?;
        self.order.retain(|other| *other != id);
        Ok(agent)
    }

    /// All agents in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.order.iter().filter_map(move |id| self.agents.get(id))
    }

    pub fn owned_by<'a>(&'a self, owner: &'a Owner) -> impl Iterator<Item = &'a Agent> + 'a {
        self.iter().filter(move |a| &a.owner == owner)
    }

    pub fn system_agents(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.iter().filter(|a| a.owner.is_system())
    }

    /// Ids of agents that may be drawn into the next round
    pub fn eligible_for_round(&self) -> Vec<AgentId> {
        self.iter()
            .filter(|a| a.status == AgentStatus::InArena && a.balance > 0)
            .map(|a| a.id)
            .collect()
    }

    /// Sum of balances held by one owner's agents
    pub fn balance_of(&self, owner: &Owner) -> Amount {
        self.owned_by(owner).map(|a| a.balance).sum()
    }

    /// Filtered and sorted listing of one owner's agents
    pub fn list(&self, owner: &Owner, status: Option<AgentStatus>, sort: AgentSort) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self
            .owned_by(owner)
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();

        match sort {
            AgentSort::Balance => agents.sort_by(|a, b| b.balance.cmp(&a.balance)),
            AgentSort::Profit => agents.sort_by(|a, b| b.net_profit.cmp(&a.net_profit)),
            AgentSort::Leverage => agents.sort_by(|a, b| b.leverage.cmp(&a.leverage)),
            AgentSort::Status => agents.sort_by_key(|a| a.status.order()),
        }
        agents
    }

    pub fn summary(&self, owner: &Owner) -> SquadSummary {
        let mut summary = SquadSummary::default();
        let mut leverage_sum = 0u64;

        for agent in self.owned_by(owner) {
            summary.agent_count += 1;
            summary.total_balance += agent.balance;
            summary.total_profit += agent.net_profit;
            leverage_sum += agent.leverage as u64;
            match agent.position {
                Position::Long => summary.long_count += 1,
                Position::Short => summary.short_count += 1,
            }
            match agent.status {
                AgentStatus::Idle => summary.idle_count += 1,
                AgentStatus::InArena => summary.in_arena_count += 1,
                _ => {}
            }
        }

        if summary.agent_count > 0 {
            let avg = leverage_sum as f64 / summary.agent_count as f64;
            summary.avg_leverage = (avg * 10.0).round() / 10.0;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::BattleResult;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn registry_with_agent() -> (AgentRegistry, AgentId) {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut registry = AgentRegistry::new();
        let agent = registry.create_agent(Owner::User("0xme".into()), Rarity::Common, &mut rng);
        (registry, agent.id)
    }

    #[test]
    fn test_create_agent_registers_idle_agent() {
        let (registry, id) = registry_with_agent();
        let agent = registry.get(id).unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.balance, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_balance_rejects_overdraft() {
        let (mut registry, id) = registry_with_agent();
        assert_eq!(registry.update_balance(id, 100).unwrap(), 100);
        let err = registry.update_balance(id, -150).unwrap_err();
        assert!(matches!(
            err,
            ArenaError::InsufficientAgentBalance { requested: 150, available: 100 }
        ));
        assert_eq!(registry.get(id).unwrap().balance, 100);
    }

    #[test]
    fn test_update_balance_rejects_overflow() {
        let (mut registry, id) = registry_with_agent();
        registry.update_balance(id, 500).unwrap();
        assert!(matches!(
            registry.update_balance(id, Amount::MAX),
            Err(ArenaError::InvalidAmount(_))
        ));
        assert_eq!(registry.get(id).unwrap().balance, 500);
    }

    #[test]
    fn test_first_funding_sets_initial_balance() {
        let (mut registry, id) = registry_with_agent();
        registry.update_balance(id, 200).unwrap();
        registry.update_balance(id, 50).unwrap();
        assert_eq!(registry.get(id).unwrap().initial_balance, 200);
    }

    #[test]
    fn test_liquidated_agent_cannot_be_funded() {
        let (mut registry, id) = registry_with_agent();
        registry.update_balance(id, 80).unwrap();
        assert_eq!(registry.liquidate(id).unwrap(), 80);
        assert!(registry.update_balance(id, 10).is_err());
        assert_eq!(registry.get(id).unwrap().balance, 0);
    }

    #[test]
    fn test_record_battle_outcome_updates_counters() {
        let (mut registry, id) = registry_with_agent();
        registry
            .record_battle_outcome(id, BattleRecord::new("x", BattleResult::Win, 40).tournament(Some(1)))
            .unwrap();
        registry
            .record_battle_outcome(id, BattleRecord::new("y", BattleResult::Win, 10).tournament(Some(3)))
            .unwrap();
        registry
            .record_battle_outcome(id, BattleRecord::new("z", BattleResult::Loss, -20).tournament(None))
            .unwrap();

        let agent = registry.get(id).unwrap();
        assert_eq!(agent.total_battles, 3);
        assert_eq!(agent.tournament_wins, 1);
        assert_eq!(agent.tournament_top3, 2);
        assert_eq!(agent.net_profit, 30);
        assert_eq!(agent.win_rate(), 67);
        assert_eq!(agent.battle_history().len(), 3);
    }

    #[test]
    fn test_leverage_must_be_allowed() {
        let (mut registry, id) = registry_with_agent();
        registry.set_leverage(id, 20).unwrap();
        assert!(matches!(registry.set_leverage(id, 3), Err(ArenaError::InvalidLeverage(3))));
        assert_eq!(registry.get(id).unwrap().leverage, 20);
    }

    #[test]
    fn test_unknown_agent() {
        let mut registry = AgentRegistry::new();
        let id = AgentId::new();
        assert!(matches!(registry.set_status(id, AgentStatus::Idle), Err(ArenaError::AgentNotFound(_))));
    }

    #[test]
    fn test_list_and_summary() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let owner = Owner::User("0xme".into());
        let mut registry = AgentRegistry::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(registry.create_agent(owner.clone(), Rarity::Common, &mut rng).id);
        }
        registry.create_agent(Owner::System, Rarity::Rare, &mut rng);

        registry.update_balance(ids[0], 50).unwrap();
        registry.update_balance(ids[1], 300).unwrap();
        registry.set_status(ids[1], AgentStatus::InArena).unwrap();
        registry.set_leverage(ids[2], 10).unwrap();

        let by_balance = registry.list(&owner, None, AgentSort::Balance);
        assert_eq!(by_balance.len(), 3);
        assert_eq!(by_balance[0].id, ids[1]);

        let idle = registry.list(&owner, Some(AgentStatus::Idle), AgentSort::Status);
        assert_eq!(idle.len(), 2);

        let summary = registry.summary(&owner);
        assert_eq!(summary.agent_count, 3);
        assert_eq!(summary.total_balance, 350);
        assert_eq!(summary.long_count + summary.short_count, 3);
        assert_eq!(summary.in_arena_count, 1);
        assert_eq!(summary.avg_leverage, 4.0);

        assert_eq!(registry.system_agents().count(), 1);
        assert_eq!(registry.eligible_for_round(), vec![ids[1]]);
    }
}
