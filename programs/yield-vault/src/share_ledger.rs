//! ERC4626-style share ledger.
//!
//! Holders own `shares`; the ledger tracks the `total_assets` those shares
//! are a claim on. Conversions always round in the ledger's favour:
//! deposit and redeem floor, mint and withdraw ceil. Together with
//! [`ShareLedger::accrue`] being the only way `total_assets` grows without
//! minting, this keeps the exchange rate `total_assets / total_shares`
//! non-decreasing across every ledger operation.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::accounts::{pubkey_str, AccountMap};
use crate::access::{Ownable, Pausable};
use crate::capability::{Context, TokenLedger};
use crate::constants::DEFAULT_DEPOSIT_LIMIT;
use crate::error::{Result, VaultError};
use crate::events::Event;
use crate::math::{mul_div_ceil, mul_div_floor};

/// Who holds the asset the shares are a claim on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Custody {
    /// The ledger's own account holds the asset: deposits pull it in with
    /// `transfer_from`, withdrawals push it out.
    Held,
    /// Pure accounting. `manager` custodies (and stakes) the asset and is
    /// the only caller allowed to move shares in or out or accrue yield.
    Managed {
        #[serde(with = "pubkey_str")]
        manager: Pubkey,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    #[serde(with = "pubkey_str")]
    id: Pubkey,
    name: String,
    symbol: String,
    /// Mint of the underlying asset
    #[serde(with = "pubkey_str")]
    asset: Pubkey,
    custody: Custody,
    owner: Ownable,
    pause: Pausable,
    deposit_limit: u64,
    total_shares: u64,
    total_assets: u64,
    balances: AccountMap<u64>,
    /// owner → spender → shares
    allowances: AccountMap<AccountMap<u64>>,
}

impl ShareLedger {
    pub fn new(
        id: Pubkey,
        asset: Pubkey,
        owner: Pubkey,
        name: impl Into<String>,
        symbol: impl Into<String>,
        custody: Custody,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            symbol: symbol.into(),
            asset,
            custody,
            owner: Ownable::new(owner),
            pause: Pausable::default(),
            deposit_limit: DEFAULT_DEPOSIT_LIMIT,
            total_shares: 0,
            total_assets: 0,
            balances: AccountMap::default(),
            allowances: AccountMap::default(),
        }
    }

    pub fn with_deposit_limit(mut self, limit: u64) -> Self {
        self.deposit_limit = limit;
        self
    }

    // ─── Reads ────────────────────────────────────────────────────────────────

    pub fn id(&self) -> Pubkey {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn asset(&self) -> Pubkey {
        self.asset
    }

    pub fn custody(&self) -> Custody {
        self.custody
    }

    pub fn owner(&self) -> Pubkey {
        self.owner.owner()
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn deposit_limit(&self) -> u64 {
        self.deposit_limit
    }

    pub fn total_assets(&self) -> u64 {
        self.total_assets
    }

    pub fn total_supply(&self) -> u64 {
        self.total_shares
    }

    pub fn balance_of(&self, holder: &Pubkey) -> u64 {
        self.balances.value(holder)
    }

    pub fn allowance(&self, owner: &Pubkey, spender: &Pubkey) -> u64 {
        self.allowances
            .get(owner)
            .map(|spenders| spenders.value(spender))
            .unwrap_or_default()
    }

    // ─── Conversions ──────────────────────────────────────────────────────────

    /// Shares `assets` is worth, floored. 1:1 while the ledger is empty.
    pub fn convert_to_shares(&self, assets: u64) -> Result<u64> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        mul_div_floor(assets, self.total_shares, self.total_assets)
    }

    /// Assets `shares` is worth, floored. 1:1 while the ledger is empty.
    pub fn convert_to_assets(&self, shares: u64) -> Result<u64> {
        if self.total_shares == 0 {
            return Ok(shares);
        }
        mul_div_floor(shares, self.total_assets, self.total_shares)
    }

    pub fn preview_deposit(&self, assets: u64) -> Result<u64> {
        self.convert_to_shares(assets)
    }

    /// Assets needed to mint exactly `shares` (rounded up).
    pub fn preview_mint(&self, shares: u64) -> Result<u64> {
        if self.total_shares == 0 {
            return Ok(shares);
        }
        mul_div_ceil(shares, self.total_assets, self.total_shares)
    }

    /// Shares burned to withdraw exactly `assets` (rounded up).
    pub fn preview_withdraw(&self, assets: u64) -> Result<u64> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        mul_div_ceil(assets, self.total_shares, self.total_assets)
    }

    pub fn preview_redeem(&self, shares: u64) -> Result<u64> {
        self.convert_to_assets(shares)
    }

    pub fn max_deposit(&self) -> u64 {
        if self.is_paused() {
            0
        } else {
            self.deposit_limit
        }
    }

    /// Shares the deposit limit buys, saturating at `u64::MAX` when the
    /// limit is too large to convert.
    pub fn max_mint(&self) -> Result<u64> {
        if self.is_paused() {
            return Ok(0);
        }
        match self.convert_to_shares(self.deposit_limit) {
            Err(VaultError::ArithmeticFault) => Ok(u64::MAX),
            other => other,
        }
    }

    pub fn max_withdraw(&self, owner: &Pubkey) -> Result<u64> {
        self.convert_to_assets(self.balance_of(owner))
    }

    pub fn max_redeem(&self, owner: &Pubkey) -> u64 {
        self.balance_of(owner)
    }

    // ─── Entry ────────────────────────────────────────────────────────────────

    /// Deposit `assets` and credit `receiver` with the floored share amount.
    pub fn deposit<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        assets: u64,
        receiver: &Pubkey,
    ) -> Result<u64> {
        self.pause.require_not_paused()?;
        self.require_manager(caller)?;
        if assets == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.require_within_limit(assets)?;

        let shares = self.preview_deposit(assets)?;
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.enter(ctx, caller, receiver, assets, shares)?;
        Ok(shares)
    }

    /// Mint exactly `shares` to `receiver`, charging the rounded-up asset cost.
    pub fn mint<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        shares: u64,
        receiver: &Pubkey,
    ) -> Result<u64> {
        self.pause.require_not_paused()?;
        self.require_manager(caller)?;
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let assets = self.preview_mint(shares)?;
        self.require_within_limit(assets)?;
        self.enter(ctx, caller, receiver, assets, shares)?;
        Ok(assets)
    }

    fn enter<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        receiver: &Pubkey,
        assets: u64,
        shares: u64,
    ) -> Result<()> {
        self.total_assets = self
            .total_assets
            .checked_add(assets)
            .ok_or(VaultError::ArithmeticFault)?;
        self.total_shares = self
            .total_shares
            .checked_add(shares)
            .ok_or(VaultError::ArithmeticFault)?;
        credit(&mut self.balances, receiver, shares)?;

        if self.custody == Custody::Held {
            ctx.tokens
                .transfer_from(&self.asset, &self.id, caller, &self.id, assets)?;
        }

        tracing::info!(caller = %caller, receiver = %receiver, assets, shares, "deposit");
        ctx.emit(Event::Deposit { caller: *caller, receiver: *receiver, assets, shares });
        Ok(())
    }

    // ─── Exit ─────────────────────────────────────────────────────────────────

    /// Withdraw exactly `assets` out of `owner`'s position, burning the
    /// rounded-up share amount.
    pub fn withdraw<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        assets: u64,
        receiver: &Pubkey,
        owner: &Pubkey,
    ) -> Result<u64> {
        self.require_manager(caller)?;
        if assets == 0 {
            return Err(VaultError::ZeroAmount);
        }
        if assets > self.max_withdraw(owner)? {
            return Err(VaultError::InsufficientBalance);
        }
        let shares = self.preview_withdraw(assets)?;
        self.exit(ctx, caller, receiver, owner, assets, shares)?;
        Ok(shares)
    }

    /// Burn exactly `shares` from `owner` and pay out their floored value.
    pub fn redeem<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        shares: u64,
        receiver: &Pubkey,
        owner: &Pubkey,
    ) -> Result<u64> {
        self.require_manager(caller)?;
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        if shares > self.max_redeem(owner) {
            return Err(VaultError::InsufficientBalance);
        }
        let assets = self.preview_redeem(shares)?;
        if assets == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.exit(ctx, caller, receiver, owner, assets, shares)?;
        Ok(assets)
    }

    fn exit<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        receiver: &Pubkey,
        owner: &Pubkey,
        assets: u64,
        shares: u64,
    ) -> Result<()> {
        // The manager of a Managed ledger acts for every holder.
        if self.custody == Custody::Held && caller != owner {
            self.spend_allowance(owner, caller, shares)?;
        }
        debit(&mut self.balances, owner, shares)?;
        self.total_shares = self
            .total_shares
            .checked_sub(shares)
            .ok_or(VaultError::ArithmeticFault)?;
        self.total_assets = self
            .total_assets
            .checked_sub(assets)
            .ok_or(VaultError::ArithmeticFault)?;

        if self.custody == Custody::Held {
            ctx.tokens.transfer(&self.asset, &self.id, receiver, assets)?;
        }

        tracing::info!(caller = %caller, owner = %owner, assets, shares, "withdraw");
        ctx.emit(Event::Withdraw {
            caller: *caller,
            receiver: *receiver,
            owner: *owner,
            assets,
            shares,
        });
        Ok(())
    }

    // ─── Share token ──────────────────────────────────────────────────────────

    pub fn transfer<L>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        to: &Pubkey,
        shares: u64,
    ) -> Result<()> {
        self.move_shares(caller, to, shares)?;
        ctx.emit(Event::Transfer { from: *caller, to: *to, shares });
        Ok(())
    }

    pub fn approve<L>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        spender: &Pubkey,
        shares: u64,
    ) -> Result<()> {
        self.allowances
            .entry(*caller)
            .or_default()
            .insert(*spender, shares);
        ctx.emit(Event::Approval { owner: *caller, spender: *spender, shares });
        Ok(())
    }

    pub fn transfer_from<L>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        shares: u64,
    ) -> Result<()> {
        if caller != from {
            self.spend_allowance(from, caller, shares)?;
        }
        self.move_shares(from, to, shares)?;
        ctx.emit(Event::Transfer { from: *from, to: *to, shares });
        Ok(())
    }

    fn move_shares(&mut self, from: &Pubkey, to: &Pubkey, shares: u64) -> Result<()> {
        debit(&mut self.balances, from, shares)?;
        credit(&mut self.balances, to, shares)
    }

    fn spend_allowance(&mut self, owner: &Pubkey, spender: &Pubkey, shares: u64) -> Result<()> {
        let current = self.allowance(owner, spender);
        if current == u64::MAX {
            return Ok(());
        }
        let remaining = current
            .checked_sub(shares)
            .ok_or(VaultError::InsufficientAllowance)?;
        self.allowances
            .entry(*owner)
            .or_default()
            .insert(*spender, remaining);
        Ok(())
    }

    // ─── Compounding ──────────────────────────────────────────────────────────

    /// Grow `total_assets` by `assets` without minting, raising the value of
    /// every outstanding share. Manager-only.
    ///
    /// Yield accrued while no shares exist goes to the next depositor.
    pub fn accrue<L>(&mut self, ctx: &mut Context<'_, L>, caller: &Pubkey, assets: u64) -> Result<u64> {
        match self.custody {
            Custody::Managed { manager } if manager == *caller => {}
            _ => return Err(VaultError::Unauthorized),
        }
        if assets == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.total_assets = self
            .total_assets
            .checked_add(assets)
            .ok_or(VaultError::ArithmeticFault)?;

        tracing::info!(assets, total_assets = self.total_assets, "yield accrued");
        ctx.emit(Event::YieldAccrued { assets, total_assets: self.total_assets });
        Ok(self.total_assets)
    }

    // ─── Admin ────────────────────────────────────────────────────────────────

    pub fn pause<L>(&mut self, ctx: &mut Context<'_, L>, caller: &Pubkey) -> Result<()> {
        self.owner.require_owner(caller)?;
        self.pause.pause()?;
        ctx.emit(Event::Paused { account: *caller });
        Ok(())
    }

    pub fn unpause<L>(&mut self, ctx: &mut Context<'_, L>, caller: &Pubkey) -> Result<()> {
        self.owner.require_owner(caller)?;
        self.pause.unpause()?;
        ctx.emit(Event::Unpaused { account: *caller });
        Ok(())
    }

    pub fn set_deposit_limit<L>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        limit: u64,
    ) -> Result<()> {
        self.owner.require_owner(caller)?;
        if limit == 0 {
            return Err(VaultError::InvalidParameter("deposit limit must be non-zero".into()));
        }
        self.deposit_limit = limit;
        ctx.emit(Event::DepositLimitUpdated { limit });
        Ok(())
    }

    /// Sweep everything the ledger's own account holds to the owner.
    /// Share accounting is left untouched.
    pub fn emergency_withdraw<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
    ) -> Result<u64> {
        self.owner.require_owner(caller)?;
        let amount = ctx.tokens.balance_of(&self.asset, &self.id);
        ctx.tokens.transfer(&self.asset, &self.id, caller, amount)?;

        tracing::warn!(owner = %caller, amount, "ledger emergency withdraw");
        ctx.emit(Event::EmergencyWithdraw { owner: *caller, amount });
        Ok(amount)
    }

    // ─── Guards ───────────────────────────────────────────────────────────────

    fn require_manager(&self, caller: &Pubkey) -> Result<()> {
        match self.custody {
            Custody::Managed { manager } if manager != *caller => Err(VaultError::Unauthorized),
            _ => Ok(()),
        }
    }

    fn require_within_limit(&self, assets: u64) -> Result<()> {
        if assets > self.deposit_limit {
            return Err(VaultError::LimitExceeded { amount: assets, limit: self.deposit_limit });
        }
        Ok(())
    }
}

fn credit(balances: &mut AccountMap<u64>, holder: &Pubkey, shares: u64) -> Result<()> {
    let updated = balances
        .value(holder)
        .checked_add(shares)
        .ok_or(VaultError::ArithmeticFault)?;
    balances.insert(*holder, updated);
    Ok(())
}

fn debit(balances: &mut AccountMap<u64>, holder: &Pubkey, shares: u64) -> Result<()> {
    let remaining = balances
        .value(holder)
        .checked_sub(shares)
        .ok_or(VaultError::InsufficientBalance)?;
    if remaining == 0 {
        balances.remove(holder);
    } else {
        balances.insert(*holder, remaining);
    }
    Ok(())
}
