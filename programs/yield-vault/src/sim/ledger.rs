use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::accounts::AccountMap;
use crate::capability::{Mintable, TokenLedger};
use crate::error::{Result, VaultError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct MintState {
    supply: u64,
    balances: AccountMap<u64>,
    /// owner → spender → remaining allowance
    allowances: AccountMap<AccountMap<u64>>,
}

/// Balances for any number of mints, keyed `mint → owner`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLedger {
    mints: AccountMap<MintState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn debit(state: &mut MintState, owner: &Pubkey, amount: u64) -> Result<()> {
        let balance = state.balances.value(owner);
        let remaining = balance
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientBalance)?;
        state.balances.insert(*owner, remaining);
        Ok(())
    }

    fn credit(state: &mut MintState, owner: &Pubkey, amount: u64) -> Result<()> {
        let balance = state.balances.value(owner);
        let updated = balance
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticFault)?;
        state.balances.insert(*owner, updated);
        Ok(())
    }

    fn move_tokens(&mut self, mint: &Pubkey, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let state = self
            .mints
            .get_mut(mint)
            .ok_or(VaultError::InsufficientBalance)?;
        Self::debit(state, from, amount)?;
        Self::credit(state, to, amount)
    }
}

impl TokenLedger for MemoryLedger {
    fn balance_of(&self, mint: &Pubkey, owner: &Pubkey) -> u64 {
        self.mints
            .get(mint)
            .map(|state| state.balances.value(owner))
            .unwrap_or_default()
    }

    fn allowance(&self, mint: &Pubkey, owner: &Pubkey, spender: &Pubkey) -> u64 {
        self.mints
            .get(mint)
            .and_then(|state| state.allowances.get(owner))
            .map(|spenders| spenders.value(spender))
            .unwrap_or_default()
    }

    fn transfer(&mut self, mint: &Pubkey, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()> {
        self.move_tokens(mint, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        mint: &Pubkey,
        spender: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        amount: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        if spender != from {
            let allowed = self.allowance(mint, from, spender);
            if allowed < amount {
                return Err(VaultError::InsufficientAllowance);
            }
            if allowed != u64::MAX {
                self.approve(mint, from, spender, allowed - amount)?;
            }
        }
        self.move_tokens(mint, from, to, amount)
    }

    fn approve(&mut self, mint: &Pubkey, owner: &Pubkey, spender: &Pubkey, amount: u64) -> Result<()> {
        self.mints
            .entry(*mint)
            .or_default()
            .allowances
            .entry(*owner)
            .or_default()
            .insert(*spender, amount);
        Ok(())
    }
}

impl Mintable for MemoryLedger {
    fn total_supply(&self, mint: &Pubkey) -> u64 {
        self.mints.get(mint).map(|s| s.supply).unwrap_or_default()
    }

    fn mint_to(&mut self, mint: &Pubkey, to: &Pubkey, amount: u64) -> Result<()> {
        let state = self.mints.entry(*mint).or_default();
        state.supply = state
            .supply
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticFault)?;
        Self::credit(state, to, amount)
    }

    fn burn(&mut self, mint: &Pubkey, from: &Pubkey, amount: u64) -> Result<()> {
        let state = self
            .mints
            .get_mut(mint)
            .ok_or(VaultError::InsufficientBalance)?;
        Self::debit(state, from, amount)?;
        state.supply = state
            .supply
            .checked_sub(amount)
            .ok_or(VaultError::ArithmeticFault)?;
        Ok(())
    }
}
