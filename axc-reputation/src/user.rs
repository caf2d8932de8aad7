use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const PRIORITY_THRESHOLDS: [f64; 5] = [0.0, 75.0, 150.0, 300.0, 500.0];
const DEFAULT_BURN_MULTIPLIER: f64 = 10.0;
const DEFAULT_MAX_SCORE: f64 = 1000.0;

/// Canonical per-level fee discount table, taken from the reputation
/// interface's mapping rather than the node engine's duplicate of it.
const DISCOUNT_TABLE: [(u8, f64); 5] = [(1, 1.0), (2, 0.95), (3, 0.90), (4, 0.85), (5, 0.80)];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReputation {
    pub address: String,
    pub current: f64,
    pub tokens_burned: u64,
    pub voluntary_burns: u64,
    pub transaction_count: u64,
    pub last_activity: u64,
}

impl UserReputation {
    fn new(address: String, now: u64) -> Self {
        UserReputation {
            address,
            current: 0.0,
            tokens_burned: 0,
            voluntary_burns: 0,
            transaction_count: 0,
            last_activity: now,
        }
    }

    /// 1..=5, derived from `current` against the fixed thresholds.
    pub fn priority_level(&self) -> u8 {
        priority_level_for_score(self.current)
    }
}

pub fn priority_level_for_score(score: f64) -> u8 {
    let mut level = 1u8;
    for (i, threshold) in PRIORITY_THRESHOLDS.iter().enumerate().skip(1) {
        if score >= *threshold {
            level = (i + 1) as u8;
        }
    }
    level
}

/// Fraction of the fee actually charged at this priority level (1.0 = no
/// discount). Grounded on `reputation_interface.py`'s discount map.
pub fn priority_multiplier(level: u8) -> f64 {
    DISCOUNT_TABLE
        .iter()
        .find(|(l, _)| *l == level)
        .map(|(_, m)| *m)
        .unwrap_or(1.0)
}

/// Discount fraction (1.0 - multiplier): how much of the fee is waived.
pub fn transaction_fee_discount(level: u8) -> f64 {
    1.0 - priority_multiplier(level)
}

#[derive(Default)]
pub struct UserReputationStore {
    inner: RwLock<HashMap<String, UserReputation>>,
    burn_multiplier: f64,
    max_score: f64,
}

impl UserReputationStore {
    pub fn new() -> Self {
        UserReputationStore {
            inner: RwLock::new(HashMap::new()),
            burn_multiplier: DEFAULT_BURN_MULTIPLIER,
            max_score: DEFAULT_MAX_SCORE,
        }
    }

    pub fn get_user_reputation(&self, address: &str, now: u64) -> UserReputation {
        let mut users = self.inner.write();
        users
            .entry(address.to_string())
            .or_insert_with(|| UserReputation::new(address.to_string(), now))
            .clone()
    }

    /// Raises `current` by `amount * burn_multiplier`, clamped to `max_score`.
    pub fn record_voluntary_burn(&self, address: &str, amount: u64, now: u64) -> UserReputation {
        let mut users = self.inner.write();
        let user = users
            .entry(address.to_string())
            .or_insert_with(|| UserReputation::new(address.to_string(), now));
        user.tokens_burned += amount;
        user.voluntary_burns += 1;
        user.current = (user.current + amount as f64 * self.burn_multiplier).min(self.max_score);
        user.last_activity = now;
        user.clone()
    }

    pub fn record_transaction(&self, address: &str, now: u64) -> UserReputation {
        let mut users = self.inner.write();
        let user = users
            .entry(address.to_string())
            .or_insert_with(|| UserReputation::new(address.to_string(), now));
        user.transaction_count += 1;
        user.last_activity = now;
        user.clone()
    }

    pub fn get_transaction_priority(&self, address: &str, now: u64) -> u8 {
        self.get_user_reputation(address, now).priority_level()
    }

    pub fn snapshot(&self) -> Vec<UserReputation> {
        self.inner.read().values().cloned().collect()
    }

    pub fn load(users: Vec<UserReputation>) -> Self {
        let mut map = HashMap::new();
        for user in users {
            map.insert(user.address.clone(), user);
        }
        UserReputationStore {
            inner: RwLock::new(map),
            burn_multiplier: DEFAULT_BURN_MULTIPLIER,
            max_score: DEFAULT_MAX_SCORE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_levels_follow_thresholds() {
        assert_eq!(priority_level_for_score(0.0), 1);
        assert_eq!(priority_level_for_score(75.0), 2);
        assert_eq!(priority_level_for_score(149.0), 2);
        assert_eq!(priority_level_for_score(300.0), 4);
        assert_eq!(priority_level_for_score(999.0), 5);
    }

    #[test]
    fn discount_table_matches_canonical_values() {
        assert_eq!(priority_multiplier(1), 1.0);
        assert_eq!(priority_multiplier(5), 0.80);
        assert!((transaction_fee_discount(5) - 0.20).abs() < 1e-9);
    }

    #[test]
    fn voluntary_burn_raises_score_and_clamps() {
        let store = UserReputationStore::new();
        let user = store.record_voluntary_burn("AXuser", 200, 10);
        assert_eq!(user.current, 1000.0);
        assert_eq!(user.tokens_burned, 200);
        let user = store.record_voluntary_burn("AXuser", 1, 11);
        assert_eq!(user.current, 1000.0);
    }

    #[test]
    fn record_transaction_increments_count() {
        let store = UserReputationStore::new();
        store.record_transaction("AXuser", 1);
        let user = store.record_transaction("AXuser", 2);
        assert_eq!(user.transaction_count, 2);
    }
}
