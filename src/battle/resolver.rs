//! Round resolution: who survives, who profits, who places
//!
//! Resolution runs once per round on the frozen participant snapshot. It is a
//! pure function of the snapshot, the policy and the RNG; applying the result
//! to the registry and ledger is the scheduler's job.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::battle::policy::{OutcomePolicy, TieBreak};
use crate::core::types::{AgentId, Amount};

/// Opponent name used when nobody else was involved
pub const ARENA_OPPONENT: &str = "The Arena";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantOutcome {
    pub agent_id: AgentId,
    /// Selection slot (index into the participant list)
    pub slot: usize,
    pub survived: bool,
    /// Signed change to the agent's balance
    pub pnl: Amount,
    /// Survivor credited with this agent's elimination
    pub eliminated_by: Option<AgentId>,
    pub kills: u32,
    pub rank: Option<u32>,
    pub opponent: String,
}

/// One podium place
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopEntry {
    pub agent: Agent,
    pub profit: Amount,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// One outcome per participant, in slot order
    pub outcomes: Vec<ParticipantOutcome>,
    /// Up to three survivors, best first
    pub top3: Vec<TopEntry>,
}

impl RoundOutcome {
    pub fn survivors(&self) -> impl Iterator<Item = &ParticipantOutcome> + '_ {
        self.outcomes.iter().filter(|o| o.survived)
    }

    pub fn eliminated(&self) -> impl Iterator<Item = &ParticipantOutcome> + '_ {
        self.outcomes.iter().filter(|o| !o.survived)
    }

    pub fn champion(&self) -> Option<&TopEntry> {
        self.top3.first()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BattleResolver {
    policy: OutcomePolicy,
}

impl BattleResolver {
    pub fn new(policy: OutcomePolicy) -> Self {
        Self { policy }
    }

    /// Resolve a round; an empty snapshot yields an empty outcome
    pub fn resolve<R: Rng + ?Sized>(&self, participants: &[Agent], rng: &mut R) -> RoundOutcome {
        if participants.is_empty() {
            return RoundOutcome::default();
        }

        // 1. Survival and PnL
        let mut outcomes: Vec<ParticipantOutcome> = participants
            .iter()
            .enumerate()
            .map(|(slot, agent)| {
                let survived = rng.gen_bool(self.policy.survival_chance(agent));
                let factor = self.policy.leverage_factor(agent);
                let pnl = if survived {
                    rng.gen_range(0..self.policy.max_profit) * factor
                } else {
                    -(rng.gen_range(0..self.policy.max_loss) * factor).min(agent.balance.max(0))
                };
                ParticipantOutcome {
                    agent_id: agent.id,
                    slot,
                    survived,
                    pnl,
                    eliminated_by: None,
                    kills: 0,
                    rank: None,
                    opponent: String::new(),
                }
            })
            .collect();

        // 2. Kill credits: each eliminated agent falls to a random survivor
        let survivor_slots: Vec<usize> = outcomes.iter().filter(|o| o.survived).map(|o| o.slot).collect();
        let mut first_victim: Vec<Option<usize>> = vec![None; participants.len()];
        for slot in 0..outcomes.len() {
            if outcomes[slot].survived {
                continue;
            }
            if let Some(&killer) = survivor_slots.choose(rng) {
                outcomes[slot].eliminated_by = Some(participants[killer].id);
                outcomes[slot].opponent = participants[killer].name.clone();
                outcomes[killer].kills += 1;
                first_victim[killer].get_or_insert(slot);
            } else {
                outcomes[slot].opponent = ARENA_OPPONENT.to_string();
            }
        }

        // 3. Survivors face their first victim, or a random other fighter
        for &slot in &survivor_slots {
            let opponent = match first_victim[slot] {
                Some(victim) => participants[victim].name.clone(),
                None => {
                    let others: Vec<usize> = (0..participants.len()).filter(|&s| s != slot).collect();
                    others
                        .choose(rng)
                        .map(|&other| participants[other].name.clone())
                        .unwrap_or_else(|| ARENA_OPPONENT.to_string())
                }
            };
            outcomes[slot].opponent = opponent;
        }

        // 4. Podium
        let ranked = self.rank_survivors(participants, &outcomes, rng);
        let mut top3 = Vec::with_capacity(3);
        for (place, slot) in ranked.into_iter().take(3).enumerate() {
            outcomes[slot].rank = Some(place as u32 + 1);
            top3.push(TopEntry {
                agent: participants[slot].clone(),
                profit: outcomes[slot].pnl,
            });
        }

        RoundOutcome { outcomes, top3 }
    }

    /// Survivor slots ordered by profit, ties broken by the policy
    fn rank_survivors<R: Rng + ?Sized>(
        &self,
        participants: &[Agent],
        outcomes: &[ParticipantOutcome],
        rng: &mut R,
    ) -> Vec<usize> {
        let mut ranked: Vec<(usize, u64)> = outcomes
            .iter()
            .filter(|o| o.survived)
            .map(|o| {
                let key = match self.policy.tie_break {
                    TieBreak::Random => rng.gen(),
                    _ => 0,
                };
                (o.slot, key)
            })
            .collect();

        ranked.sort_by(|&(a, key_a), &(b, key_b)| {
            outcomes[b].pnl.cmp(&outcomes[a].pnl).then_with(|| match self.policy.tie_break {
                TieBreak::StatsThenSlot => participants[b]
                    .total_stats()
                    .cmp(&participants[a].total_stats())
                    .then(a.cmp(&b)),
                TieBreak::Slot => a.cmp(&b),
                TieBreak::Random => key_a.cmp(&key_b),
            })
        });

        ranked.into_iter().map(|(slot, _)| slot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Position, Rarity, Stats};
    use crate::core::types::Owner;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn fighter(name: &str, total: u32, balance: Amount) -> Agent {
        let s = total / 5;
        let mut agent = Agent::new(Owner::System, name.into(), Rarity::Common, Stats::new(s, s, s, s, s), Position::Long);
        agent.balance = balance;
        agent
    }

    fn field(n: usize) -> Vec<Agent> {
        (0..n).map(|i| fighter(&format!("f{}", i), 50 + i as u32 * 5, 500)).collect()
    }

    #[test]
    fn test_empty_snapshot() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let outcome = BattleResolver::default().resolve(&[], &mut rng);
        assert!(outcome.outcomes.is_empty());
        assert!(outcome.top3.is_empty());
    }

    #[test]
    fn test_outcome_bounds() {
        let resolver = BattleResolver::default();
        let participants = field(10);
        for seed in 0..50 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let outcome = resolver.resolve(&participants, &mut rng);
            assert_eq!(outcome.outcomes.len(), 10);
            for o in &outcome.outcomes {
                if o.survived {
                    assert!(o.pnl >= 0 && o.pnl < 100);
                    assert!(o.eliminated_by.is_none());
                } else {
                    assert!(o.pnl <= 0 && o.pnl > -50);
                    assert_eq!(o.kills, 0);
                }
                assert!(!o.opponent.is_empty());
            }
            assert!(outcome.top3.len() <= 3);
            assert!(outcome.top3.len() <= outcome.survivors().count());
        }
    }

    #[test]
    fn test_kills_match_eliminations() {
        let resolver = BattleResolver::default();
        let participants = field(10);
        for seed in 0..30 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let outcome = resolver.resolve(&participants, &mut rng);
            let kills: u32 = outcome.outcomes.iter().map(|o| o.kills).sum();
            let credited = outcome.eliminated().filter(|o| o.eliminated_by.is_some()).count() as u32;
            assert_eq!(kills, credited);
            if outcome.survivors().count() > 0 {
                assert_eq!(credited, outcome.eliminated().count() as u32);
            }
        }
    }

    #[test]
    fn test_top3_sorted_by_profit() {
        let resolver = BattleResolver::default();
        let participants = field(10);
        for seed in 0..30 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let outcome = resolver.resolve(&participants, &mut rng);
            for pair in outcome.top3.windows(2) {
                assert!(pair[0].profit >= pair[1].profit);
            }
            for (place, entry) in outcome.top3.iter().enumerate() {
                let o = outcome.outcomes.iter().find(|o| o.agent_id == entry.agent.id).unwrap();
                assert_eq!(o.rank, Some(place as u32 + 1));
                assert!(o.survived);
            }
        }
    }

    #[test]
    fn test_loss_capped_at_balance() {
        let policy = OutcomePolicy {
            base_survival: 0.0,
            stat_weight: 0.0,
            min_survival: 0.0,
            max_survival: 0.0,
            max_loss: 1_000,
            ..OutcomePolicy::default()
        };
        let resolver = BattleResolver::new(policy);
        let participants = vec![fighter("poor", 50, 3), fighter("broke", 50, 0)];
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let outcome = resolver.resolve(&participants, &mut rng);
        assert!(outcome.outcomes.iter().all(|o| !o.survived));
        assert!(outcome.outcomes[0].pnl >= -3);
        assert_eq!(outcome.outcomes[1].pnl, 0);
        assert!(outcome.outcomes.iter().all(|o| o.opponent == ARENA_OPPONENT));
        assert!(outcome.top3.is_empty());
    }

    #[test]
    fn test_leverage_scales_profit() {
        let policy = OutcomePolicy {
            min_survival: 1.0,
            max_survival: 1.0,
            ..OutcomePolicy::default()
        };
        let resolver = BattleResolver::new(policy);
        let mut agent = fighter("lev", 50, 100);
        agent.leverage = 10;
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let outcome = resolver.resolve(&[agent], &mut rng);
        assert!(outcome.outcomes[0].survived);
        assert_eq!(outcome.outcomes[0].pnl % 10, 0);
        assert_eq!(outcome.outcomes[0].rank, Some(1));
    }

    #[test]
    fn test_tie_break_by_stats_then_slot() {
        let policy = OutcomePolicy {
            min_survival: 1.0,
            max_survival: 1.0,
            max_profit: 1,
            ..OutcomePolicy::default()
        };
        let resolver = BattleResolver::new(policy);
        let participants = vec![
            fighter("low", 50, 100),
            fighter("high", 100, 100),
            fighter("mid_a", 75, 100),
            fighter("mid_b", 75, 100),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let outcome = resolver.resolve(&participants, &mut rng);
        let names: Vec<&str> = outcome.top3.iter().map(|t| t.agent.name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid_a", "mid_b"]);
    }

    #[test]
    fn test_tie_break_by_slot() {
        let policy = OutcomePolicy {
            min_survival: 1.0,
            max_survival: 1.0,
            max_profit: 1,
            tie_break: TieBreak::Slot,
            ..OutcomePolicy::default()
        };
        let resolver = BattleResolver::new(policy);
        let participants = vec![fighter("a", 50, 1), fighter("b", 100, 1), fighter("c", 75, 1), fighter("d", 90, 1)];
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let outcome = resolver.resolve(&participants, &mut rng);
        let names: Vec<&str> = outcome.top3.iter().map(|t| t.agent.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
