//! Halving / fee engine (C13): block-reward schedule, fee distribution
//! persistence contract, and voluntary-burn bookkeeping, grounded on
//! `original_source/src/consensus/multinode_consensus.py`'s reward/halving
//! section and `fault_tolerance.py`'s persistence-reload pattern, following
//! `axc-core::chain::FeeDistribution` for the distribution type itself.

use axc_core::FeeDistribution;
use axc_reputation::UserReputationStore;

pub const DEFAULT_INITIAL_REWARD: u64 = 1024;
pub const DEFAULT_HALVING_INTERVAL: u64 = 100_000;

#[derive(Debug, Clone, Copy)]
pub struct HalvingEvent {
    pub halvings_occurred: u64,
    pub new_reward: u64,
    pub next_halving_block: u64,
}

/// Tracks the block-reward schedule and fee distribution. Owns no chain
/// state; the consensus task asks it for the reward due at a given block
/// height and is told when a halving fires.
pub struct RewardSchedule {
    initial_reward: u64,
    halving_interval: u64,
    current_reward: u64,
    halvings_occurred: u64,
    next_halving_block: u64,
    fee_distribution: FeeDistribution,
}

impl RewardSchedule {
    pub fn new(initial_reward: u64, halving_interval: u64) -> Self {
        RewardSchedule {
            initial_reward,
            halving_interval,
            current_reward: initial_reward,
            halvings_occurred: 0,
            next_halving_block: halving_interval,
            fee_distribution: FeeDistribution::INITIAL,
        }
    }

    /// Restores a schedule from persisted state, falling back to the
    /// initial distribution if the persisted fractions don't sum to 1
    /// within the 1e-3 tolerance (§5 crash-recovery rule).
    pub fn from_persisted(
        initial_reward: u64,
        halving_interval: u64,
        halvings_occurred: u64,
        last_block: u64,
        persisted_distribution: FeeDistribution,
    ) -> Self {
        let current_reward = reward_at(initial_reward, halving_interval, last_block);
        let next_halving_block = (halvings_occurred + 1) * halving_interval;
        let fee_distribution = if persisted_distribution.is_valid() {
            persisted_distribution
        } else {
            tracing::warn!("persisted fee distribution failed the sum-to-1 check, resetting to defaults");
            FeeDistribution::INITIAL
        };
        RewardSchedule {
            initial_reward,
            halving_interval,
            current_reward,
            halvings_occurred,
            next_halving_block,
            fee_distribution,
        }
    }

    pub fn current_reward(&self) -> u64 {
        self.current_reward
    }

    pub fn fee_distribution(&self) -> FeeDistribution {
        self.fee_distribution
    }

    pub fn halvings_occurred(&self) -> u64 {
        self.halvings_occurred
    }

    /// `reward(n) = initial_reward / 2^floor(n / halving_interval)`.
    pub fn reward_at(&self, block_n: u64) -> u64 {
        reward_at(self.initial_reward, self.halving_interval, block_n)
    }

    /// Called once per produced block. If `block_n` lands on a halving
    /// boundary (`block_n > 0 && block_n % halving_interval == 0`), advances
    /// the schedule and returns the event so the caller can persist state
    /// and broadcast a FeeDistributionUpdate.
    pub fn on_block_produced(&mut self, block_n: u64, new_distribution: FeeDistribution) -> Option<HalvingEvent> {
        self.current_reward = self.reward_at(block_n);
        if block_n > 0 && block_n % self.halving_interval == 0 {
            self.halvings_occurred += 1;
            self.next_halving_block = block_n + self.halving_interval;
            self.fee_distribution = new_distribution;
            Some(HalvingEvent {
                halvings_occurred: self.halvings_occurred,
                new_reward: self.current_reward,
                next_halving_block: self.next_halving_block,
            })
        } else {
            None
        }
    }
}

fn reward_at(initial_reward: u64, halving_interval: u64, block_n: u64) -> u64 {
    let halvings = block_n / halving_interval;
    if halvings >= 64 {
        return 0;
    }
    initial_reward >> halvings
}

/// Applies a voluntary token burn: credits the burn address (left to the
/// chain's ledger, not duplicated here), and raises the burner's user
/// reputation via the shared store.
pub fn record_voluntary_burn(users: &UserReputationStore, burner: &str, amount: u64, now: u64) {
    users.record_voluntary_burn(burner, amount, now);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_halves_at_each_interval() {
        let schedule = RewardSchedule::new(1024, 100);
        assert_eq!(schedule.reward_at(0), 1024);
        assert_eq!(schedule.reward_at(99), 1024);
        assert_eq!(schedule.reward_at(100), 512);
        assert_eq!(schedule.reward_at(250), 256);
    }

    #[test]
    fn on_block_produced_fires_only_on_boundary() {
        let mut schedule = RewardSchedule::new(1024, 100);
        assert!(schedule.on_block_produced(50, FeeDistribution::INITIAL).is_none());
        let event = schedule.on_block_produced(100, FeeDistribution::INITIAL).unwrap();
        assert_eq!(event.halvings_occurred, 1);
        assert_eq!(event.new_reward, 512);
        assert_eq!(schedule.current_reward(), 512);
    }

    #[test]
    fn invalid_persisted_distribution_falls_back_to_default() {
        let bogus = FeeDistribution { burn: 0.1, developer: 0.1, liquidity: 0.1 };
        let schedule = RewardSchedule::from_persisted(1024, 100_000, 0, 0, bogus);
        assert_eq!(schedule.fee_distribution(), FeeDistribution::INITIAL);
    }

    #[test]
    fn voluntary_burn_raises_user_reputation() {
        let users = UserReputationStore::new();
        record_voluntary_burn(&users, "AXuser", 10, 1);
        let rep = users.get_user_reputation("AXuser", 1);
        assert!(rep.current > 0.0);
        assert_eq!(rep.tokens_burned, 10);
    }
}
