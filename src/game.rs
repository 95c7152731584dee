//! Game facade - the only path that mutates arena state
//!
//! `Game` owns the registry, ledger, log sink, scheduler and RNG. Every user
//! command validates first and mutates only after all checks pass, so a
//! failed command leaves the game untouched. Scheduler steps go through
//! [`Game::step`] with the epoch they were scheduled under; a step from an
//! older epoch is ignored.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::agent::{Agent, AgentStatus, Rarity};
use crate::arena::scheduler::{RoundContext, RoundScheduler};
use crate::arena::{ArenaSnapshot, Phase};
use crate::battle::BattleResolver;
use crate::core::config::ArenaConfig;
use crate::core::error::{ArenaError, Result};
use crate::core::types::{AgentId, Amount, Owner, ProviderKind};
use crate::ledger::{Ledger, LedgerTotals, Transaction, WalletView};
use crate::log::{LogEntry, LogKind, LogSink, LogStream, NewEntry};
use crate::registry::{AgentRegistry, AgentSort, SquadSummary};

/// A scheduled scheduler step: run `Game::step(epoch)` after `delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation {
    pub epoch: u64,
    pub delay: Duration,
}

#[derive(Debug)]
pub struct Game {
    config: ArenaConfig,
    registry: AgentRegistry,
    ledger: Ledger,
    logs: LogSink,
    scheduler: RoundScheduler,
    rng: ChaCha8Rng,
    epoch: u64,
    initialized: bool,
}

impl Game {
    pub fn new(config: ArenaConfig) -> Result<Self> {
        config.validate()?;
        let scheduler = RoundScheduler::new(
            BattleResolver::new(config.outcome.clone()),
            config.timing.clone(),
            config.participant_cap,
        );
        Ok(Self {
            registry: AgentRegistry::new(),
            ledger: Ledger::new(config.journal_retention),
            logs: LogSink::new(config.log_retention),
            scheduler,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            epoch: 0,
            initialized: false,
            config,
        })
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn wallet(&self) -> WalletView {
        self.ledger.view(&self.registry)
    }

    /// The connected user's agents in creation order; empty when disconnected
    pub fn my_agents(&self) -> Vec<Agent> {
        match self.ledger.owner() {
            Ok(owner) => self.registry.owned_by(&owner).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Filtered and sorted view of the user's squad
    pub fn my_agents_sorted(&self, status: Option<AgentStatus>, sort: AgentSort) -> Result<Vec<Agent>> {
        let owner = self.ledger.owner()?;
        Ok(self.registry.list(&owner, status, sort))
    }

    pub fn system_agents(&self) -> Vec<Agent> {
        self.registry.system_agents().cloned().collect()
    }

    pub fn agent(&self, id: AgentId) -> Result<Agent> {
        self.registry.get(id).cloned()
    }

    pub fn arena(&self) -> ArenaSnapshot {
        ArenaSnapshot {
            phase: self.scheduler.phase(),
            round_number: self.scheduler.round_number(),
            participants: self.scheduler.participants().to_vec(),
            selected_slots: self.scheduler.selected_slots().to_vec(),
            countdown: self.scheduler.countdown(),
            top3: self.scheduler.top3().to_vec(),
            battle_logs: self.arena_logs(),
            initialized: self.initialized,
        }
    }

    /// Arena stream, newest first
    pub fn arena_logs(&self) -> Vec<LogEntry> {
        self.logs.entries(LogStream::Arena).cloned().collect()
    }

    /// User stream, newest first
    pub fn my_logs(&self) -> Vec<LogEntry> {
        self.logs.entries(LogStream::User).cloned().collect()
    }

    /// Wallet journal, newest first
    pub fn transactions(&self) -> Vec<Transaction> {
        self.ledger.transactions().cloned().collect()
    }

    pub fn squad_summary(&self) -> Result<SquadSummary> {
        let owner = self.ledger.owner()?;
        Ok(self.registry.summary(&owner))
    }

    pub fn mint_cost(&self) -> Amount {
        self.config.economy.mint_cost
    }

    pub fn ledger_totals(&self) -> LedgerTotals {
        self.ledger.totals()
    }

    /// Wallet plus agent balances equals the external flows booked so far
    pub fn is_balanced(&self) -> bool {
        self.ledger.is_balanced(&self.registry)
    }

    // ------------------------------------------------------------------
    // Wallet commands
    // ------------------------------------------------------------------

    pub fn connect_wallet(&mut self, nickname: &str, provider: ProviderKind) -> WalletView {
        let starting = self.config.economy.starting_balance;
        let address = self.ledger.connect(nickname, provider, starting).address.clone();
        tracing::info!("Wallet {} connected as {} via {:?}", address, nickname, provider);
        self.wallet()
    }

    pub fn deposit(&mut self, amount: Amount) -> Result<Amount> {
        let balance = self.ledger.deposit(amount)?;
        tracing::debug!("Deposited {}, wallet now {}", amount, balance);
        Ok(balance)
    }

    pub fn withdraw(&mut self, amount: Amount) -> Result<Amount> {
        let balance = self.ledger.withdraw(amount)?;
        tracing::debug!("Withdrew {}, wallet now {}", amount, balance);
        Ok(balance)
    }

    /// Mint one agent, paying the mint cost from the wallet
    pub fn mint_agent(&mut self) -> Result<Agent> {
        let owner = self.ledger.owner()?;
        self.ledger.ensure_wallet_covers(self.mint_cost())?;
        self.mint_unchecked(owner)
    }

    /// Mint `count` agents; the wallet must cover all of them up front
    pub fn mint_agents(&mut self, count: usize) -> Result<Vec<Agent>> {
        let owner = self.ledger.owner()?;
        let total = Amount::try_from(count)
            .ok()
            .filter(|&n| n > 0)
            .and_then(|n| self.mint_cost().checked_mul(n))
            .ok_or_else(|| ArenaError::InvalidAmount(count.to_string()))?;
        self.ledger.ensure_wallet_covers(total)?;
        (0..count).map(|_| self.mint_unchecked(owner.clone())).collect()
    }

    fn mint_unchecked(&mut self, owner: Owner) -> Result<Agent> {
        let rarity = Rarity::roll(&mut self.rng);
        let agent = self.registry.create_agent(owner, rarity, &mut self.rng);
        if let Err(e) = self.ledger.charge_mint(self.config.economy.mint_cost, agent.id, &agent.name) {
            tracing::warn!("Mint charge for {} failed, discarding agent: {}", agent.id, e);
            self.registry.remove(agent.id)?;
            return Err(e);
        }
        tracing::debug!("Minted {} ({:?}, total stats {})", agent.name, agent.rarity, agent.total_stats());
        self.logs.append(
            LogStream::User,
            NewEntry::new(LogKind::Info, format!("Minted {} ({:?})", agent.name, agent.rarity)),
        );
        Ok(agent)
    }

    pub fn allocate_funds(&mut self, id: AgentId, amount: Amount) -> Result<()> {
        self.ledger.allocate_funds(&mut self.registry, id, amount)?;
        tracing::debug!("Allocated {} to {}", amount, id);
        Ok(())
    }

    /// Split `total` evenly over `ids`; returns the per-agent share
    pub fn allocate_batch(&mut self, ids: &[AgentId], total: Amount) -> Result<Amount> {
        let share = self.ledger.allocate_batch(&mut self.registry, ids, total)?;
        tracing::debug!("Allocated {} to each of {} agents", share, ids.len());
        Ok(share)
    }

    pub fn withdraw_funds(&mut self, id: AgentId, amount: Amount) -> Result<()> {
        self.ledger.withdraw_funds(&mut self.registry, id, amount)?;
        tracing::debug!("Withdrew {} from {}", amount, id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Agent commands
    // ------------------------------------------------------------------

    fn owned_agent(&self, id: AgentId) -> Result<&Agent> {
        let owner = self.ledger.owner()?;
        let agent = self.registry.get(id)?;
        if agent.owner != owner {
            return Err(ArenaError::NotOwner(id));
        }
        Ok(agent)
    }

    fn check_joinable(&self, id: AgentId) -> Result<()> {
        if !self.initialized {
            return Err(ArenaError::ArenaNotReady);
        }
        let agent = self.owned_agent(id)?;
        if agent.status != AgentStatus::Idle {
            return Err(ArenaError::AgentBusy { id, status: agent.status });
        }
        if agent.balance <= 0 {
            return Err(ArenaError::InsufficientAgentBalance {
                requested: 1,
                available: agent.balance,
            });
        }
        Ok(())
    }

    fn join_unchecked(&mut self, id: AgentId) -> Result<()> {
        self.registry.set_status(id, AgentStatus::InArena)?;
        let name = self.registry.get(id)?.name.clone();
        let message = format!("{} entered the arena", name);
        self.logs.append(LogStream::Arena, NewEntry::new(LogKind::Join, message.clone()));
        self.logs.append(LogStream::User, NewEntry::new(LogKind::Join, message));
        tracing::debug!("{} joined the arena", id);
        Ok(())
    }

    /// Put an idle, funded agent into the arena pool
    pub fn join_arena(&mut self, id: AgentId) -> Result<()> {
        self.check_joinable(id)?;
        self.join_unchecked(id)
    }

    /// Join several agents; nothing joins unless all of them can
    pub fn join_batch(&mut self, ids: &[AgentId]) -> Result<usize> {
        for (i, &id) in ids.iter().enumerate() {
            self.check_joinable(id)?;
            if ids[..i].contains(&id) {
                return Err(ArenaError::AgentBusy { id, status: AgentStatus::InArena });
            }
        }
        for &id in ids {
            self.join_unchecked(id)?;
        }
        Ok(ids.len())
    }

    pub fn leave_arena(&mut self, id: AgentId) -> Result<()> {
        let agent = self.owned_agent(id)?;
        if agent.status != AgentStatus::InArena {
            return Err(ArenaError::AgentBusy { id, status: agent.status });
        }
        let message = format!("{} left the arena", agent.name);

        self.registry.set_status(id, AgentStatus::Idle)?;
        self.logs.append(LogStream::Arena, NewEntry::new(LogKind::Leave, message.clone()));
        self.logs.append(LogStream::User, NewEntry::new(LogKind::Leave, message));
        tracing::debug!("{} left the arena", id);
        Ok(())
    }

    /// Change leverage; refused while the agent is fighting
    pub fn update_agent_leverage(&mut self, id: AgentId, leverage: u32) -> Result<()> {
        let agent = self.owned_agent(id)?;
        if agent.status == AgentStatus::Fighting {
            return Err(ArenaError::AgentBusy { id, status: agent.status });
        }
        self.registry.set_leverage(id, leverage)?;
        tracing::debug!("{} leverage set to {}x", id, leverage);
        Ok(())
    }

    /// Delete an idle or liquidated agent, releasing its balance to the wallet
    pub fn remove_agent(&mut self, id: AgentId) -> Result<Agent> {
        let agent = self.owned_agent(id)?;
        if !matches!(agent.status, AgentStatus::Idle | AgentStatus::Liquidated) {
            return Err(ArenaError::AgentBusy { id, status: agent.status });
        }

        let removed = self.registry.remove(id)?;
        self.ledger
            .release(id, removed.balance, format!("Released from {}", removed.name));
        tracing::debug!("Removed {} ({} released)", removed.name, removed.balance);
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Arena lifecycle
    // ------------------------------------------------------------------

    /// Seed system agents (once) and schedule the first round
    ///
    /// Calling this again aborts any round in flight and supersedes every
    /// pending continuation.
    pub fn initialize_arena(&mut self) -> Continuation {
        self.scheduler.abort_round(&mut self.registry);
        if self.registry.system_agents().next().is_none() {
            self.seed_system_agents();
        }

        self.initialized = true;
        self.epoch += 1;
        tracing::info!("Arena initialized (epoch {})", self.epoch);
        self.logs.append(
            LogStream::Arena,
            NewEntry::new(LogKind::Info, "The arena gates open").highlight(),
        );
        Continuation {
            epoch: self.epoch,
            delay: self.config.timing.start_delay(),
        }
    }

    fn seed_system_agents(&mut self) {
        let economy = self.config.economy.clone();
        for _ in 0..economy.system_agent_count {
            let rarity = Rarity::roll(&mut self.rng);
            let agent = self.registry.create_agent(Owner::System, rarity, &mut self.rng);
            let balance = self.rng.gen_range(economy.system_balance_min..=economy.system_balance_max);
            let seeded = self
                .registry
                .update_balance(agent.id, balance)
                .and_then(|_| self.registry.set_status(agent.id, AgentStatus::InArena));
            if let Err(e) = seeded {
                tracing::warn!("Failed to seed system agent {}: {}", agent.id, e);
            }
        }
        tracing::info!("Seeded {} system agents", economy.system_agent_count);
    }

    /// Start a round now instead of waiting out the current pause
    pub fn start_new_round(&mut self) -> Result<Continuation> {
        if !self.initialized {
            return Err(ArenaError::ArenaNotReady);
        }
        if !self.scheduler.phase().can_start_round() {
            return Err(ArenaError::RoundInProgress);
        }
        self.epoch += 1;
        Ok(Continuation {
            epoch: self.epoch,
            delay: Duration::ZERO,
        })
    }

    /// Run one scheduler transition if `epoch` is still current
    pub fn step(&mut self, epoch: u64) -> Option<Continuation> {
        if !self.initialized || epoch != self.epoch {
            tracing::debug!("Dropping stale continuation (epoch {} vs {})", epoch, self.epoch);
            return None;
        }
        let mut ctx = RoundContext {
            registry: &mut self.registry,
            ledger: &mut self.ledger,
            logs: &mut self.logs,
            rng: &mut self.rng,
        };
        let delay = self.scheduler.step(&mut ctx);
        Some(Continuation { epoch, delay })
    }

    /// Drive one full round synchronously, ignoring delays
    ///
    /// Returns the settled round number. Used by headless runs and tests.
    pub fn play_round(&mut self) -> Result<u64> {
        let mut next = self.start_new_round()?;
        loop {
            next = self.step(next.epoch).ok_or(ArenaError::ArenaNotReady)?;
            if self.scheduler.phase() == Phase::Waiting {
                return Ok(self.scheduler.round_number());
            }
        }
    }

    /// Stop the arena: abort any round and invalidate pending continuations
    pub fn halt(&mut self) {
        self.scheduler.abort_round(&mut self.registry);
        self.initialized = false;
        self.epoch += 1;
        tracing::info!("Arena halted (epoch {})", self.epoch);
    }
}
