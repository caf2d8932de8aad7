use crate::hash::Hash32;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Transfer,
    GenesisInit,
    MiningReward,
    NetworkMaintenance,
    TokenBurn,
    LiquidityPool,
    Faucet,
}

impl TransactionType {
    /// System transaction types credit a designated address without
    /// debiting a regular sender balance.
    pub fn is_system(self) -> bool {
        !matches!(self, TransactionType::Transfer)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub from: String,
    pub to: String,
    #[serde(with = "crate::decimal")]
    pub amount: u64,
    #[serde(with = "crate::decimal")]
    pub fee: u64,
    pub timestamp: u64,
    pub nonce: u64,
    pub tx_type: TransactionType,
    pub memo: Option<String>,
    pub signature: Option<Vec<u8>>,
}

impl Transaction {
    /// SHA-256 of the transaction's canonical JSON encoding.
    pub fn hash(&self) -> Hash32 {
        let encoded = serde_json::to_vec(self).expect("transaction always serializes");
        Hash32::of(&encoded)
    }

    /// Structural validity: independent of ledger state. `from`/`to` address
    /// well-formedness is the caller's job (crypto::validate_address).
    pub fn is_structurally_valid(&self) -> bool {
        if self.tx_type == TransactionType::Transfer && self.from.is_empty() {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction {
            from: "AXsender".into(),
            to: "AXreceiver".into(),
            amount: 100,
            fee: 1,
            timestamp: 1000,
            nonce: 0,
            tx_type: TransactionType::Transfer,
            memo: None,
            signature: None,
        }
    }

    #[test]
    fn hash_is_stable_for_identical_content() {
        let a = sample();
        let b = sample();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_changes_with_content() {
        let a = sample();
        let mut b = sample();
        b.amount = 101;
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn system_types_are_distinguished_from_transfer() {
        assert!(!TransactionType::Transfer.is_system());
        assert!(TransactionType::MiningReward.is_system());
        assert!(TransactionType::TokenBurn.is_system());
    }
}
