//! Wallet ledger - the user's spendable balance and its flows
//!
//! Money moves between exactly three places: outside the game (deposit,
//! withdraw, mint fees, battle PnL), the wallet, and the user's agents.
//! Transfers between wallet and agents never change
//! `wallet.balance + sum(agent.balance)`; the ledger keeps running totals of
//! the external flows so that sum can be checked at any time.

use std::collections::VecDeque;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentStatus;
use crate::core::error::{ArenaError, Result};
use crate::core::types::{AgentId, Amount, Owner, ProviderKind, Timestamp};
use crate::registry::AgentRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: String,
    pub nickname: String,
    pub provider: Option<ProviderKind>,
    pub balance: Amount,
    pub connected: bool,
}

impl Wallet {
    fn disconnected() -> Self {
        Self {
            address: String::new(),
            nickname: String::new(),
            provider: None,
            balance: 0,
            connected: false,
        }
    }
}

/// Read-only wallet view with the locked balance mirrored from agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletView {
    pub address: String,
    pub nickname: String,
    pub provider: Option<ProviderKind>,
    pub balance: Amount,
    pub locked_balance: Amount,
    pub connected: bool,
}

impl WalletView {
    pub fn total_assets(&self) -> Amount {
        self.balance + self.locked_balance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    Mint,
    /// Wallet to agent
    Allocate,
    /// Agent to wallet
    Release,
    BattleWin,
    BattleLoss,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub kind: TransactionKind,
    /// Signed change to the wallet, or to the agent for battle entries
    pub amount: Amount,
    pub agent: Option<AgentId>,
    pub timestamp: Timestamp,
    pub description: String,
}

/// Running totals of flows that cross the game boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub deposited: Amount,
    pub withdrawn: Amount,
    pub mint_fees: Amount,
    /// Net battle result of the user's agents, including retired residuals
    pub battle_pnl: Amount,
}

impl LedgerTotals {
    /// What wallet plus agents should hold right now
    pub fn expected_assets(&self) -> Amount {
        self.deposited - self.withdrawn - self.mint_fees + self.battle_pnl
    }
}

/// Parse a user-entered amount; rejects non-numeric and non-positive input
pub fn parse_amount(input: &str) -> Result<Amount> {
    let trimmed = input.trim();
    let amount: Amount = trimmed
        .parse()
        .map_err(|_| ArenaError::InvalidAmount(trimmed.to_string()))?;
    if amount <= 0 {
        return Err(ArenaError::InvalidAmount(trimmed.to_string()));
    }
    Ok(amount)
}

fn require_positive(amount: Amount) -> Result<()> {
    if amount <= 0 {
        return Err(ArenaError::InvalidAmount(amount.to_string()));
    }
    Ok(())
}

#[derive(Debug)]
pub struct Ledger {
    wallet: Wallet,
    journal: VecDeque<Transaction>,
    retention: usize,
    next_tx_id: u64,
    totals: LedgerTotals,
}

impl Ledger {
    pub fn new(retention: usize) -> Self {
        Self {
            wallet: Wallet::disconnected(),
            journal: VecDeque::new(),
            retention: retention.max(1),
            next_tx_id: 1,
            totals: LedgerTotals::default(),
        }
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn totals(&self) -> LedgerTotals {
        self.totals
    }

    pub fn is_connected(&self) -> bool {
        self.wallet.connected
    }

    /// Owner tag of the connected user's agents
    pub fn owner(&self) -> Result<Owner> {
        if !self.wallet.connected {
            return Err(ArenaError::WalletNotConnected);
        }
        Ok(Owner::User(self.wallet.address.clone()))
    }

    /// Connect the wallet; the starting balance is booked as a deposit
    ///
    /// Connecting an already connected wallet only updates the nickname.
    pub fn connect(&mut self, nickname: &str, provider: ProviderKind, starting_balance: Amount) -> &Wallet {
        if self.wallet.connected {
            self.wallet.nickname = nickname.to_string();
            return &self.wallet;
        }

        self.wallet = Wallet {
            address: format!("0x{}", Uuid::new_v4().simple()),
            nickname: nickname.to_string(),
            provider: Some(provider),
            balance: 0,
            connected: true,
        };
        match self.totals.deposited.checked_add(starting_balance) {
            Some(deposited) if starting_balance > 0 => {
                self.wallet.balance = starting_balance;
                self.totals.deposited = deposited;
                self.journal_push(TransactionKind::Deposit, starting_balance, None, "Welcome bonus".into());
            }
            Some(_) => {}
            None => tracing::warn!("Starting balance {} overflows deposit total, not credited", starting_balance),
        }
        tracing::debug!("Wallet {} connected for {}", self.wallet.address, nickname);
        &self.wallet
    }

    pub fn view(&self, registry: &AgentRegistry) -> WalletView {
        let locked_balance = match self.owner() {
            Ok(owner) => registry.balance_of(&owner),
            Err(_) => 0,
        };
        WalletView {
            address: self.wallet.address.clone(),
            nickname: self.wallet.nickname.clone(),
            provider: self.wallet.provider,
            balance: self.wallet.balance,
            locked_balance,
            connected: self.wallet.connected,
        }
    }

    /// Wallet plus every balance held by the user's agents
    pub fn total_assets(&self, registry: &AgentRegistry) -> Amount {
        self.view(registry).total_assets()
    }

    /// True when current assets match the external flows booked so far
    pub fn is_balanced(&self, registry: &AgentRegistry) -> bool {
        self.total_assets(registry) == self.totals.expected_assets()
    }

    /// External deposit into the wallet
    pub fn deposit(&mut self, amount: Amount) -> Result<Amount> {
        self.owner()?;
        require_positive(amount)?;
        let overflow = || ArenaError::InvalidAmount(amount.to_string());
        let balance = self.wallet.balance.checked_add(amount).ok_or_else(overflow)?;
        let deposited = self.totals.deposited.checked_add(amount).ok_or_else(overflow)?;

        self.wallet.balance = balance;
        self.totals.deposited = deposited;
        self.journal_push(TransactionKind::Deposit, amount, None, "Deposit".into());
        Ok(self.wallet.balance)
    }

    /// External withdrawal out of the wallet
    pub fn withdraw(&mut self, amount: Amount) -> Result<Amount> {
        self.owner()?;
        require_positive(amount)?;
        self.ensure_wallet_covers(amount)?;
        self.wallet.balance -= amount;
        self.totals.withdrawn += amount;
        self.journal_push(TransactionKind::Withdraw, -amount, None, "Withdraw".into());
        Ok(self.wallet.balance)
    }

    /// Check the wallet can pay `amount` without changing anything
    pub fn ensure_wallet_covers(&self, amount: Amount) -> Result<()> {
        if amount > self.wallet.balance {
            return Err(ArenaError::InsufficientWalletBalance {
                requested: amount,
                available: self.wallet.balance,
            });
        }
        Ok(())
    }

    /// Debit a mint fee; callers validate with `ensure_wallet_covers` first
    pub fn charge_mint(&mut self, cost: Amount, agent: AgentId, name: &str) -> Result<()> {
        self.owner()?;
        self.ensure_wallet_covers(cost)?;
        self.wallet.balance -= cost;
        self.totals.mint_fees += cost;
        self.journal_push(TransactionKind::Mint, -cost, Some(agent), format!("Minted {}", name));
        Ok(())
    }

    fn ensure_owned(&self, registry: &AgentRegistry, agent_id: AgentId) -> Result<()> {
        let owner = self.owner()?;
        let agent = registry.get(agent_id)?;
        if agent.owner != owner {
            return Err(ArenaError::NotOwner(agent_id));
        }
        Ok(())
    }

    /// Move funds from the wallet onto one of the user's agents
    pub fn allocate_funds(&mut self, registry: &mut AgentRegistry, agent_id: AgentId, amount: Amount) -> Result<()> {
        self.ensure_owned(registry, agent_id)?;
        require_positive(amount)?;
        self.ensure_wallet_covers(amount)?;
        let agent = registry.get(agent_id)?;
        if agent.status == AgentStatus::Liquidated {
            return Err(ArenaError::AgentBusy { id: agent_id, status: agent.status });
        }

        registry.update_balance(agent_id, amount)?;
        self.wallet.balance -= amount;
        self.journal_push(TransactionKind::Allocate, -amount, Some(agent_id), "Allocated to agent".into());
        Ok(())
    }

    /// Split `total` evenly over `agents`, flooring the share
    ///
    /// The whole batch is validated before any agent is funded. Returns the
    /// per-agent share.
    pub fn allocate_batch(&mut self, registry: &mut AgentRegistry, agents: &[AgentId], total: Amount) -> Result<Amount> {
        require_positive(total)?;
        if agents.is_empty() {
            return Err(ArenaError::InvalidAmount(total.to_string()));
        }
        let share = total / agents.len() as Amount;
        require_positive(share)?;
        self.ensure_wallet_covers(share * agents.len() as Amount)?;
        for &id in agents {
            self.ensure_owned(registry, id)?;
            let agent = registry.get(id)?;
            if agent.status == AgentStatus::Liquidated {
                return Err(ArenaError::AgentBusy { id, status: agent.status });
            }
        }

        for &id in agents {
            self.allocate_funds(registry, id, share)?;
        }
        Ok(share)
    }

    /// Move funds from an idle agent back to the wallet
    pub fn withdraw_funds(&mut self, registry: &mut AgentRegistry, agent_id: AgentId, amount: Amount) -> Result<()> {
        self.ensure_owned(registry, agent_id)?;
        let agent = registry.get(agent_id)?;
        if agent.status != AgentStatus::Idle {
            return Err(ArenaError::AgentBusy { id: agent_id, status: agent.status });
        }
        require_positive(amount)?;
        if amount > agent.balance {
            return Err(ArenaError::InsufficientAgentBalance {
                requested: amount,
                available: agent.balance,
            });
        }

        let balance = self
            .wallet
            .balance
            .checked_add(amount)
            .ok_or_else(|| ArenaError::InvalidAmount(amount.to_string()))?;

        registry.update_balance(agent_id, -amount)?;
        self.wallet.balance = balance;
        self.journal_push(TransactionKind::Release, amount, Some(agent_id), "Withdrawn from agent".into());
        Ok(())
    }

    /// Credit a residual balance that left an agent outside of `withdraw_funds`
    /// (liquidation or removal). The agent side has already been zeroed.
    pub fn release(&mut self, agent_id: AgentId, amount: Amount, description: String) {
        if amount <= 0 || !self.wallet.connected {
            return;
        }
        let Some(balance) = self.wallet.balance.checked_add(amount) else {
            tracing::warn!("Release of {} from {} overflows the wallet", amount, agent_id);
            return;
        };
        self.wallet.balance = balance;
        self.journal_push(TransactionKind::Release, amount, Some(agent_id), description);
    }

    /// Book a user agent's battle result as an external flow
    pub fn record_battle(&mut self, agent_id: AgentId, pnl: Amount, description: String) {
        self.totals.battle_pnl += pnl;
        let kind = if pnl >= 0 { TransactionKind::BattleWin } else { TransactionKind::BattleLoss };
        self.journal_push(kind, pnl, Some(agent_id), description);
    }

    /// Journal entries, newest first
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> + '_ {
        self.journal.iter().rev()
    }

    fn journal_push(&mut self, kind: TransactionKind, amount: Amount, agent: Option<AgentId>, description: String) {
        let id = self.next_tx_id;
        self.next_tx_id += 1;
        self.journal.push_back(Transaction {
            id,
            kind,
            amount,
            agent,
            timestamp: Utc::now(),
            description,
        });
        while self.journal.len() > self.retention {
            self.journal.pop_front();
        }
    }
}
