//! Rarity tiers and the stat block they roll

use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Rarity tier, ordered from most to least common
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Rarity {
    Common = 1,
    Rare = 2,
    Epic = 3,
    Legendary = 4,
    Mythic = 5,
}

impl Rarity {
    pub const ALL: [Rarity; 5] = [
        Rarity::Common,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
        Rarity::Mythic,
    ];

    /// Mint weights out of 100
    const WEIGHTS: [u32; 5] = [55, 28, 12, 4, 1];

    /// Range each individual stat is rolled from
    pub fn stat_range(self) -> RangeInclusive<u32> {
        match self {
            Rarity::Common => 5..=20,
            Rarity::Rare => 15..=35,
            Rarity::Epic => 30..=55,
            Rarity::Legendary => 50..=75,
            Rarity::Mythic => 70..=99,
        }
    }

    /// Hit points before the defense bonus
    pub fn base_hp(self) -> u32 {
        match self {
            Rarity::Common => 100,
            Rarity::Rare => 120,
            Rarity::Epic => 150,
            Rarity::Legendary => 180,
            Rarity::Mythic => 220,
        }
    }

    /// Roll a rarity using the mint weights
    pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> Rarity {
        let total: u32 = Self::WEIGHTS.iter().sum();
        let mut pick = rng.gen_range(0..total);
        for (rarity, weight) in Self::ALL.iter().zip(Self::WEIGHTS) {
            if pick < weight {
                return *rarity;
            }
            pick -= weight;
        }
        Rarity::Common
    }
}

/// The five combat stats of an agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub attack: u32,
    pub defense: u32,
    pub crit: u32,
    pub hit: u32,
    pub agility: u32,
}

impl Stats {
    pub fn new(attack: u32, defense: u32, crit: u32, hit: u32, agility: u32) -> Self {
        Self { attack, defense, crit, hit, agility }
    }

    /// Roll every stat independently within the rarity's range
    pub fn roll<R: Rng + ?Sized>(rarity: Rarity, rng: &mut R) -> Self {
        let range = rarity.stat_range();
        Self {
            attack: rng.gen_range(range.clone()),
            defense: rng.gen_range(range.clone()),
            crit: rng.gen_range(range.clone()),
            hit: rng.gen_range(range.clone()),
            agility: rng.gen_range(range),
        }
    }

    pub fn total(&self) -> u32 {
        self.attack + self.defense + self.crit + self.hit + self.agility
    }

    /// Highest total any agent can roll
    pub fn max_total() -> u32 {
        Rarity::Mythic.stat_range().end() * 5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_rarity_ordering() {
        assert!(Rarity::Common < Rarity::Rare);
        assert!(Rarity::Rare < Rarity::Epic);
        assert!(Rarity::Epic < Rarity::Legendary);
        assert!(Rarity::Legendary < Rarity::Mythic);
    }

    #[test]
    fn test_rolled_stats_stay_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for rarity in Rarity::ALL {
            let range = rarity.stat_range();
            for _ in 0..50 {
                let stats = Stats::roll(rarity, &mut rng);
                for value in [stats.attack, stats.defense, stats.crit, stats.hit, stats.agility] {
                    assert!(range.contains(&value), "{:?} rolled {}", rarity, value);
                }
                assert!(stats.total() <= Stats::max_total());
            }
        }
    }

    #[test]
    fn test_rarity_roll_favors_common() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut common = 0;
        let mut mythic = 0;
        for _ in 0..2000 {
            match Rarity::roll(&mut rng) {
                Rarity::Common => common += 1,
                Rarity::Mythic => mythic += 1,
                _ => {}
            }
        }
        assert!(common > 900, "common rolled {} times", common);
        assert!(mythic < 100, "mythic rolled {} times", mythic);
    }

    #[test]
    fn test_stats_total() {
        let stats = Stats::new(10, 20, 30, 40, 50);
        assert_eq!(stats.total(), 150);
    }
}
