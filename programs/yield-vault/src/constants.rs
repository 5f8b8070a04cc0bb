/// Denominator for basis-point math (u128 to avoid up-cast noise)
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Upper bound accepted by `set_slippage_tolerance`
pub const MAX_SLIPPAGE_BPS: u16 = 10_000;

/// Default slippage tolerance for strategy AMM legs: 0.50 %
pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;

/// Q64.64 fixed-point scale (reward-per-token accumulator)
pub const Q64: u128 = 1u128 << 64;

/// Per-call deposit ceiling until one is configured: unlimited
pub const DEFAULT_DEPOSIT_LIMIT: u64 = u64::MAX;

/// Default LP fee charged by the in-memory AMM: 0.30 %
pub const AMM_FEE_BPS: u16 = 30;
