//! Round scheduler - one arena round as an explicit state machine
//!
//! Each call to [`RoundScheduler::step`] performs exactly one transition and
//! returns how long to wait before the next one. The scheduler never sleeps
//! or spawns; the caller owns time (the async runtime in production, a loop
//! in tests). Per step:
//!
//! - idle / waiting: start a round, draw participants
//! - selecting: reveal one slot
//! - countdown: decrement, or enter fighting
//! - fighting: decrement, or settle the round
//! - settlement: enter waiting

use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::agent::{Agent, AgentStatus, BattleRecord, BattleResult};
use crate::arena::phase::Phase;
use crate::battle::{BattleResolver, ParticipantOutcome, RoundOutcome, TopEntry};
use crate::core::config::TimingConfig;
use crate::core::error::Result;
use crate::core::types::{AgentId, Amount, Owner, RoundNumber, Timestamp};
use crate::ledger::Ledger;
use crate::log::{LogKind, LogSink, LogStream, NewEntry};
use crate::registry::AgentRegistry;

/// Mutable state a round step may touch
pub struct RoundContext<'a> {
    pub registry: &'a mut AgentRegistry,
    pub ledger: &'a mut Ledger,
    pub logs: &'a mut LogSink,
    pub rng: &'a mut ChaCha8Rng,
}

impl RoundContext<'_> {
    fn user_owner(&self) -> Option<Owner> {
        self.ledger.owner().ok()
    }

    fn log_arena(&mut self, entry: NewEntry) {
        self.logs.append(LogStream::Arena, entry);
    }

    fn log_user(&mut self, entry: NewEntry) {
        self.logs.append(LogStream::User, entry);
    }
}

/// Draw up to `cap` agents uniformly without replacement
///
/// The result is in random order; that order becomes the slot order.
pub fn sample_participants(eligible: &[AgentId], cap: usize, rng: &mut ChaCha8Rng) -> Vec<AgentId> {
    if eligible.len() > cap {
        eligible.choose_multiple(rng, cap).copied().collect()
    } else {
        let mut all = eligible.to_vec();
        all.shuffle(rng);
        all
    }
}

#[derive(Debug)]
pub struct RoundScheduler {
    phase: Phase,
    round_number: RoundNumber,
    participants: Vec<Agent>,
    selected_slots: Vec<usize>,
    countdown: u32,
    top3: Vec<TopEntry>,
    last_outcome: Option<RoundOutcome>,
    resolver: BattleResolver,
    timing: TimingConfig,
    cap: usize,
}

impl RoundScheduler {
    pub fn new(resolver: BattleResolver, timing: TimingConfig, cap: usize) -> Self {
        Self {
            phase: Phase::Idle,
            round_number: 0,
            participants: Vec::new(),
            selected_slots: Vec::new(),
            countdown: 0,
            top3: Vec::new(),
            last_outcome: None,
            resolver,
            timing,
            cap: cap.max(1),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round_number(&self) -> RoundNumber {
        self.round_number
    }

    pub fn participants(&self) -> &[Agent] {
        &self.participants
    }

    pub fn selected_slots(&self) -> &[usize] {
        &self.selected_slots
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn top3(&self) -> &[TopEntry] {
        &self.top3
    }

    /// Full resolution of the most recent settled round
    pub fn last_outcome(&self) -> Option<&RoundOutcome> {
        self.last_outcome.as_ref()
    }

    /// Perform one transition; returns the delay before the next step
    pub fn step(&mut self, ctx: &mut RoundContext<'_>) -> Duration {
        match self.phase {
            Phase::Idle | Phase::Waiting => self.begin_round(ctx),
            Phase::Selecting => self.reveal_slot(),
            Phase::Countdown => self.tick_countdown(),
            Phase::Fighting => self.tick_fighting(ctx),
            Phase::Settlement => self.enter_waiting(),
        }
    }

    fn begin_round(&mut self, ctx: &mut RoundContext<'_>) -> Duration {
        self.round_number += 1;
        self.participants.clear();
        self.selected_slots.clear();
        self.top3.clear();
        self.countdown = 0;

        let eligible = ctx.registry.eligible_for_round();
        let drawn = sample_participants(&eligible, self.cap, &mut *ctx.rng);

        for &id in &drawn {
            let drafted = ctx
                .registry
                .set_status(id, AgentStatus::Fighting)
                .and_then(|_| ctx.registry.restore_hp(id))
                .and_then(|_| ctx.registry.get(id).cloned());
            match drafted {
                Ok(agent) => self.participants.push(agent),
                Err(e) => tracing::warn!("Could not draft {}: {}", id, e),
            }
        }

        if self.participants.is_empty() {
            tracing::info!("Round {} skipped: no eligible agents", self.round_number);
            ctx.log_arena(
                NewEntry::new(
                    LogKind::Info,
                    format!("Round {} skipped: no agents in the arena", self.round_number),
                )
                .round(self.round_number),
            );
            self.phase = Phase::Waiting;
            return self.timing.waiting();
        }

        tracing::info!(
            "Round {} selecting {} of {} eligible agents",
            self.round_number,
            self.participants.len(),
            eligible.len()
        );
        ctx.log_arena(
            NewEntry::new(
                LogKind::RoundStart,
                format!(
                    "Round {} begins! {} fighters enter the arena",
                    self.round_number,
                    self.participants.len()
                ),
            )
            .highlight()
            .round(self.round_number),
        );
        if let Some(owner) = ctx.user_owner() {
            let mine: Vec<String> = self
                .participants
                .iter()
                .filter(|a| a.owner == owner)
                .map(|a| a.name.clone())
                .collect();
            if !mine.is_empty() {
                ctx.log_user(
                    NewEntry::new(
                        LogKind::RoundStart,
                        format!("Round {}: {} selected to fight", self.round_number, mine.join(", ")),
                    )
                    .round(self.round_number),
                );
            }
        }

        self.phase = self.phase.next();
        self.timing.slot_reveal()
    }

    fn reveal_slot(&mut self) -> Duration {
        let next = self.selected_slots.len();
        if next < self.participants.len() {
            self.selected_slots.push(next);
        }
        if self.selected_slots.len() < self.participants.len() {
            return self.timing.slot_reveal();
        }

        tracing::debug!("Round {} countdown", self.round_number);
        self.phase = self.phase.next();
        self.countdown = self.timing.countdown_ticks;
        self.timing.tick()
    }

    fn tick_countdown(&mut self) -> Duration {
        if self.countdown > 1 {
            self.countdown -= 1;
            return self.timing.tick();
        }

        tracing::debug!("Round {} fighting", self.round_number);
        self.phase = self.phase.next();
        self.countdown = self.timing.fighting_ticks;
        self.timing.tick()
    }

    fn tick_fighting(&mut self, ctx: &mut RoundContext<'_>) -> Duration {
        if self.countdown > 1 {
            self.countdown -= 1;
            return self.timing.tick();
        }

        self.countdown = 0;
        self.phase = self.phase.next();
        self.settle(ctx);
        self.timing.settlement_hold()
    }

    fn enter_waiting(&mut self) -> Duration {
        self.phase = self.phase.next();
        self.timing.waiting()
    }

    fn settle(&mut self, ctx: &mut RoundContext<'_>) {
        let outcome = self.resolver.resolve(&self.participants, &mut *ctx.rng);
        let user = ctx.user_owner();
        let settled_at = Utc::now();

        for result in &outcome.outcomes {
            let Some(snapshot) = self.participants.get(result.slot) else {
                continue;
            };
            if !ctx.registry.contains(result.agent_id) {
                tracing::warn!("Participant {} vanished before settlement", result.agent_id);
                continue;
            }
            let is_mine = user.as_ref().map_or(false, |owner| &snapshot.owner == owner);
            let applied = match apply_outcome(ctx, result, settled_at, is_mine) {
                Ok(applied) => applied,
                Err(e) => {
                    tracing::warn!("Settlement of {} failed: {}", result.agent_id, e);
                    return_to_arena(ctx.registry, result.agent_id);
                    continue;
                }
            };

            if let Some(killer) = result.eliminated_by {
                ctx.log_arena(
                    NewEntry::new(
                        LogKind::Kill,
                        format!("{} eliminated {}", result.opponent, snapshot.name),
                    )
                    .damage(snapshot.max_hp)
                    .round(self.round_number),
                );
                tracing::debug!("{} eliminated by {}", result.agent_id, killer);
            }
            if is_mine {
                let message = if result.survived {
                    format!("{} survived round {} (+{})", snapshot.name, self.round_number, applied)
                } else {
                    format!("{} was liquidated in round {} ({})", snapshot.name, self.round_number, applied)
                };
                let kind = if result.survived { LogKind::Info } else { LogKind::Kill };
                ctx.log_user(NewEntry::new(kind, message).highlight().round(self.round_number));
            }
        }

        let champion = outcome
            .champion()
            .map(|entry| entry.agent.name.clone())
            .unwrap_or_else(|| "none".to_string());
        tracing::info!(
            "Round {} settled: {} survivors, champion {}",
            self.round_number,
            outcome.survivors().count(),
            champion
        );
        ctx.log_arena(
            NewEntry::new(
                LogKind::RoundEnd,
                format!("Round {} is over! Champion: {}", self.round_number, champion),
            )
            .highlight()
            .round(self.round_number),
        );

        // Participants now show their settled state
        for agent in &mut self.participants {
            if let Ok(settled) = ctx.registry.get(agent.id) {
                *agent = settled.clone();
            }
        }
        self.top3 = outcome.top3.clone();
        self.last_outcome = Some(outcome);
    }

    /// Return every participant still marked fighting to the arena and clear
    /// the round. Used when the arena is torn down or reinitialized mid-round.
    pub fn abort_round(&mut self, registry: &mut AgentRegistry) {
        for agent in &self.participants {
            return_to_arena(registry, agent.id);
        }
        if self.phase.is_active() {
            tracing::info!("Round {} aborted in {:?}", self.round_number, self.phase);
        }
        self.phase = Phase::Idle;
        self.participants.clear();
        self.selected_slots.clear();
        self.countdown = 0;
        self.top3.clear();
    }
}

/// Put a still-fighting agent back in the pool with full HP
fn return_to_arena(registry: &mut AgentRegistry, id: AgentId) {
    let fighting = registry
        .get(id)
        .map(|a| a.status == AgentStatus::Fighting)
        .unwrap_or(false);
    if !fighting {
        return;
    }
    let restored = registry
        .set_status(id, AgentStatus::InArena)
        .and_then(|_| registry.restore_hp(id));
    if let Err(e) = restored {
        tracing::warn!("Failed to return {} to the arena: {}", id, e);
    }
}

/// Write one participant's result back; returns the balance change applied
///
/// The balance write goes first. If it fails nothing has changed and nothing
/// is booked; once it succeeds the battle result is booked before the
/// remaining bookkeeping.
fn apply_outcome(
    ctx: &mut RoundContext<'_>,
    result: &ParticipantOutcome,
    settled_at: Timestamp,
    is_mine: bool,
) -> Result<Amount> {
    let id = result.agent_id;
    let current = ctx.registry.get(id)?.balance;
    // Losses never exceed what the agent holds now
    let applied = result.pnl.max(-current);

    ctx.registry.update_balance(id, applied)?;
    if is_mine {
        ctx.ledger.record_battle(id, applied, format!("Arena battle vs {}", result.opponent));
    }

    if result.survived {
        ctx.registry.set_status(id, AgentStatus::InArena)?;
        ctx.registry.restore_hp(id)?;
    } else {
        let residual = ctx.registry.liquidate(id)?;
        if is_mine {
            ctx.ledger.release(id, residual, "Residual margin after liquidation".into());
        }
    }

    let record = BattleRecord::new(
        result.opponent.clone(),
        if result.survived { BattleResult::Win } else { BattleResult::Loss },
        applied,
    )
    .tournament(result.rank)
    .at(settled_at);
    ctx.registry.record_battle_outcome(id, record)?;
    if result.kills > 0 {
        ctx.registry.add_kills(id, result.kills)?;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Rarity;
    use crate::battle::OutcomePolicy;
    use crate::core::types::ProviderKind;
    use crate::ledger::TransactionKind;
    use rand::SeedableRng;

    struct Harness {
        registry: AgentRegistry,
        ledger: Ledger,
        logs: LogSink,
        rng: ChaCha8Rng,
    }

    impl Harness {
        fn new(seed: u64) -> Self {
            Self {
                registry: AgentRegistry::new(),
                ledger: Ledger::new(100),
                logs: LogSink::new(100),
                rng: ChaCha8Rng::seed_from_u64(seed),
            }
        }

        fn ctx(&mut self) -> RoundContext<'_> {
            RoundContext {
                registry: &mut self.registry,
                ledger: &mut self.ledger,
                logs: &mut self.logs,
                rng: &mut self.rng,
            }
        }

        fn add_arena_agents(&mut self, owner: Owner, n: usize) -> Vec<AgentId> {
            (0..n)
                .map(|_| {
                    let agent = self.registry.create_agent(owner.clone(), Rarity::Common, &mut self.rng);
                    self.registry.update_balance(agent.id, 100).unwrap();
                    self.registry.set_status(agent.id, AgentStatus::InArena).unwrap();
                    agent.id
                })
                .collect()
        }
    }

    fn scheduler(policy: OutcomePolicy) -> RoundScheduler {
        RoundScheduler::new(BattleResolver::new(policy), TimingConfig::default(), 10)
    }

    fn immortal() -> OutcomePolicy {
        OutcomePolicy {
            min_survival: 1.0,
            max_survival: 1.0,
            ..OutcomePolicy::default()
        }
    }

    #[test]
    fn test_full_round_timing_and_phases() {
        let mut h = Harness::new(1);
        h.add_arena_agents(Owner::System, 4);
        let mut s = scheduler(OutcomePolicy::default());

        let mut trace = Vec::new();
        let mut total = Duration::ZERO;
        loop {
            let delay = s.step(&mut h.ctx());
            trace.push((s.phase(), s.countdown(), s.selected_slots().len()));
            total += delay;
            if s.phase() == Phase::Waiting {
                break;
            }
        }

        // 4 reveals at 300ms, 3 countdown ticks, 10 fighting ticks, hold 0, waiting 5s
        assert_eq!(total, Duration::from_millis(4 * 300 + 3_000 + 10_000 + 5_000));
        let selecting = trace.iter().filter(|(p, _, _)| *p == Phase::Selecting).count();
        assert_eq!(selecting, 4);
        let countdowns: Vec<u32> = trace
            .iter()
            .filter(|(p, _, _)| *p == Phase::Countdown)
            .map(|(_, c, _)| *c)
            .collect();
        assert_eq!(countdowns, vec![3, 2, 1]);
        let fights: Vec<u32> = trace
            .iter()
            .filter(|(p, _, _)| *p == Phase::Fighting)
            .map(|(_, c, _)| *c)
            .collect();
        assert_eq!(fights, (1..=10).rev().collect::<Vec<_>>());
        assert_eq!(s.round_number(), 1);
    }

    #[test]
    fn test_selected_slots_grow_one_at_a_time() {
        let mut h = Harness::new(2);
        h.add_arena_agents(Owner::System, 6);
        let mut s = scheduler(immortal());

        s.step(&mut h.ctx());
        assert_eq!(s.phase(), Phase::Selecting);
        assert!(s.selected_slots().is_empty());
        for expected in 1..=6 {
            s.step(&mut h.ctx());
            assert_eq!(s.selected_slots().len(), expected);
        }
        assert_eq!(s.phase(), Phase::Countdown);
        assert_eq!(s.selected_slots(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_selection_respects_cap_and_marks_fighting() {
        let mut h = Harness::new(3);
        h.add_arena_agents(Owner::System, 25);
        let mut s = scheduler(immortal());

        s.step(&mut h.ctx());
        assert_eq!(s.participants().len(), 10);
        let fighting = h.registry.iter().filter(|a| a.status == AgentStatus::Fighting).count();
        assert_eq!(fighting, 10);
        for p in s.participants() {
            assert_eq!(p.hp, p.max_hp);
        }
    }

    #[test]
    fn test_empty_arena_skips_to_waiting() {
        let mut h = Harness::new(4);
        let mut s = scheduler(OutcomePolicy::default());

        let delay = s.step(&mut h.ctx());
        assert_eq!(s.phase(), Phase::Waiting);
        assert_eq!(delay, TimingConfig::default().waiting());
        assert_eq!(s.round_number(), 1);
        let entry = h.logs.entries(LogStream::Arena).next().unwrap();
        assert_eq!(entry.kind, LogKind::Info);

        s.step(&mut h.ctx());
        assert_eq!(s.round_number(), 2);
    }

    #[test]
    fn test_settlement_writes_back() {
        let mut h = Harness::new(5);
        let ids = h.add_arena_agents(Owner::System, 8);
        let mut s = scheduler(OutcomePolicy::default());

        while s.phase() != Phase::Settlement {
            s.step(&mut h.ctx());
        }

        let outcome = s.last_outcome().unwrap().clone();
        for result in &outcome.outcomes {
            let agent = h.registry.get(result.agent_id).unwrap();
            assert_eq!(agent.total_battles, 1);
            assert_eq!(agent.battle_history().len(), 1);
            if result.survived {
                assert_eq!(agent.status, AgentStatus::InArena);
                assert_eq!(agent.balance, 100 + result.pnl);
                assert_eq!(agent.hp, agent.max_hp);
            } else {
                assert_eq!(agent.status, AgentStatus::Liquidated);
                assert_eq!(agent.balance, 0);
            }
        }
        assert!(ids.iter().all(|id| h.registry.get(*id).unwrap().status != AgentStatus::Fighting));
        assert!(s.top3().len() <= 3);
        let kinds: Vec<LogKind> = h.logs.entries(LogStream::Arena).map(|e| e.kind).collect();
        assert_eq!(kinds[0], LogKind::RoundEnd);
    }

    #[test]
    fn test_user_liquidation_releases_residual_and_stays_balanced() {
        let mut h = Harness::new(6);
        h.ledger.connect("me", ProviderKind::Wallet, 1_000);
        let owner = h.ledger.owner().unwrap();
        let agent = h.registry.create_agent(owner, Rarity::Common, &mut h.rng);
        h.ledger.allocate_funds(&mut h.registry, agent.id, 300).unwrap();
        h.registry.set_status(agent.id, AgentStatus::InArena).unwrap();

        let doomed = OutcomePolicy {
            base_survival: 0.0,
            stat_weight: 0.0,
            min_survival: 0.0,
            max_survival: 0.0,
            ..OutcomePolicy::default()
        };
        let mut s = scheduler(doomed);
        while s.phase() != Phase::Settlement {
            s.step(&mut h.ctx());
        }

        let settled = h.registry.get(agent.id).unwrap();
        assert_eq!(settled.status, AgentStatus::Liquidated);
        assert_eq!(settled.balance, 0);
        assert_eq!(settled.battle_history()[0].result, BattleResult::Loss);
        let loss = -settled.battle_history()[0].earnings;
        assert_eq!(h.ledger.wallet().balance, 700 + 300 - loss);
        assert!(h.ledger.is_balanced(&h.registry));
        assert_eq!(h.logs.len(LogStream::User), 2);
    }

    #[test]
    fn test_user_survivor_logged_as_info() {
        let mut h = Harness::new(8);
        h.ledger.connect("me", ProviderKind::Wallet, 0);
        let owner = h.ledger.owner().unwrap();
        let id = h.add_arena_agents(owner, 1)[0];
        let mut s = scheduler(immortal());
        while s.phase() != Phase::Settlement {
            s.step(&mut h.ctx());
        }

        assert_eq!(h.registry.get(id).unwrap().status, AgentStatus::InArena);
        let latest = h.logs.entries(LogStream::User).next().unwrap();
        assert_eq!(latest.kind, LogKind::Info);
        assert!(latest.message.contains("survived"));
    }

    #[test]
    fn test_failed_write_back_books_nothing() {
        let mut h = Harness::new(9);
        h.ledger.connect("me", ProviderKind::Wallet, 0);
        let owner = h.ledger.owner().unwrap();
        let ids = h.add_arena_agents(owner, 4);
        // Any profit overflows these balances
        for &id in &ids {
            h.registry.update_balance(id, Amount::MAX - 100).unwrap();
        }
        let mut s = scheduler(immortal());
        while s.phase() != Phase::Settlement {
            s.step(&mut h.ctx());
        }

        let outcome = s.last_outcome().unwrap().clone();
        assert!(outcome.outcomes.iter().any(|o| o.pnl > 0));
        for result in &outcome.outcomes {
            let agent = h.registry.get(result.agent_id).unwrap();
            assert_eq!(agent.status, AgentStatus::InArena);
            assert_eq!(agent.hp, agent.max_hp);
            if result.pnl > 0 {
                assert_eq!(agent.balance, Amount::MAX);
                assert_eq!(agent.total_battles, 0);
            } else {
                assert_eq!(agent.total_battles, 1);
            }
        }
        let booked = h
            .ledger
            .transactions()
            .filter(|t| t.kind == TransactionKind::BattleWin)
            .count();
        let settled = outcome.outcomes.iter().filter(|o| o.pnl == 0).count();
        assert_eq!(booked, settled);
        assert_eq!(h.ledger.totals().battle_pnl, 0);
    }

    #[test]
    fn test_abort_round_returns_fighters() {
        let mut h = Harness::new(7);
        h.add_arena_agents(Owner::System, 5);
        let mut s = scheduler(OutcomePolicy::default());
        for _ in 0..4 {
            s.step(&mut h.ctx());
        }
        assert!(s.phase().is_active());

        s.abort_round(&mut h.registry);
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.participants().is_empty());
        assert!(h.registry.iter().all(|a| a.status == AgentStatus::InArena));
    }

    #[test]
    fn test_sample_is_uniform() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let eligible: Vec<AgentId> = (0..20).map(|_| AgentId::new()).collect();
        let mut counts = vec![0u32; eligible.len()];
        let rounds = 4_000;
        for _ in 0..rounds {
            let drawn = sample_participants(&eligible, 10, &mut rng);
            assert_eq!(drawn.len(), 10);
            for id in drawn {
                let idx = eligible.iter().position(|e| *e == id).unwrap();
                counts[idx] += 1;
            }
        }
        // Each agent expects rounds * 10 / 20 = 2000 selections
        for count in counts {
            assert!((1_850..=2_150).contains(&count), "count {} too far from 2000", count);
        }
    }
}
