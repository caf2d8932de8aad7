use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{address} has balance {balance} but {required} is required")]
    InsufficientBalance {
        address: String,
        balance: u64,
        required: u64,
    },
    #[error("credit to {address} would overflow u64")]
    Overflow { address: String },
}

/// Address -> balance. Rebuilt by replaying the chain from genesis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    pub balances: HashMap<String, u64>,
}

impl Ledger {
    pub fn balance(&self, address: &str) -> u64 {
        *self.balances.get(address).unwrap_or(&0)
    }

    pub fn credit(&mut self, address: &str, amount: u64) -> Result<(), LedgerError> {
        let entry = self.balances.entry(address.to_string()).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow {
                address: address.to_string(),
            })?;
        Ok(())
    }

    pub fn debit(&mut self, address: &str, amount: u64) -> Result<(), LedgerError> {
        let balance = self.balance(address);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                address: address.to_string(),
                balance,
                required: amount,
            });
        }
        self.balances.insert(address.to_string(), balance - amount);
        Ok(())
    }

    pub fn total_supply(&self) -> u64 {
        self.balances.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_rejects_insufficient_balance() {
        let mut ledger = Ledger::default();
        ledger.credit("AXa", 10).unwrap();
        let err = ledger.debit("AXa", 20).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn credit_then_debit_nets_correctly() {
        let mut ledger = Ledger::default();
        ledger.credit("AXa", 100).unwrap();
        ledger.debit("AXa", 40).unwrap();
        assert_eq!(ledger.balance("AXa"), 60);
    }
}
