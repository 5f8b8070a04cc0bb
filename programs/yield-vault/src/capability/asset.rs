use solana_sdk::pubkey::Pubkey;

use crate::error::Result;

/// Fungible-asset capability, keyed by mint.
///
/// Implementations must fail loudly (`InsufficientBalance`,
/// `InsufficientAllowance`) instead of silently moving less.
pub trait TokenLedger {
    fn balance_of(&self, mint: &Pubkey, owner: &Pubkey) -> u64;

    fn allowance(&self, mint: &Pubkey, owner: &Pubkey, spender: &Pubkey) -> u64;

    /// Move `amount` out of `from`'s own balance.
    fn transfer(&mut self, mint: &Pubkey, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance.
    /// An allowance of `u64::MAX` is never decremented.
    fn transfer_from(
        &mut self,
        mint: &Pubkey,
        spender: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        amount: u64,
    ) -> Result<()>;

    fn approve(&mut self, mint: &Pubkey, owner: &Pubkey, spender: &Pubkey, amount: u64) -> Result<()>;
}

/// Supply control, needed only by collaborators that issue their own token
/// (the AMM's LP token, faucets in simulations).
pub trait Mintable {
    fn total_supply(&self, mint: &Pubkey) -> u64;

    fn mint_to(&mut self, mint: &Pubkey, to: &Pubkey, amount: u64) -> Result<()>;

    fn burn(&mut self, mint: &Pubkey, from: &Pubkey, amount: u64) -> Result<()>;
}
