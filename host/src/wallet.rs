use std::collections::HashMap;
use std::sync::Mutex;

use crate::*;

/// In-memory balances. Unknown players simply have a zero balance.
#[derive(Debug, Default)]
pub struct Wallet {
    balances: Mutex<HashMap<PlayerId, u64>>,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, player: &PlayerId) -> Result<u64> {
        let balances = self.balances.lock().map_err(|_| HostError::Poisoned)?;
        Ok(balances.get(player).copied().unwrap_or(0))
    }

    pub fn deposit(&self, player: &PlayerId, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(HostError::InvalidAmount);
        }
        let mut balances = self.balances.lock().map_err(|_| HostError::Poisoned)?;
        let balance = balances.entry(player.clone()).or_default();
        *balance = balance.checked_add(amount).ok_or(HostError::InvalidAmount)?;
        Ok(*balance)
    }

    pub fn debit(&self, player: &PlayerId, amount: u64) -> Result<u64> {
        let mut balances = self.balances.lock().map_err(|_| HostError::Poisoned)?;
        let balance = balances.entry(player.clone()).or_default();
        if *balance < amount {
            return Err(HostError::InsufficientFunds {
                balance: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        Ok(*balance)
    }

    pub fn credit(&self, player: &PlayerId, amount: u64) -> Result<u64> {
        let mut balances = self.balances.lock().map_err(|_| HostError::Poisoned)?;
        let balance = balances.entry(player.clone()).or_default();
        *balance = balance.saturating_add(amount);
        Ok(*balance)
    }
}
