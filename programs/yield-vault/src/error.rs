//! Vault error type.

/// All failures surfaced by the ledger, the reward engine, the strategy and
/// the collaborators they call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    // ── Input validation ─────────────────────────────────────────────────────
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Deposit amount exceeds limit: {amount} > {limit}")]
    LimitExceeded { amount: u64, limit: u64 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // ── Balances ─────────────────────────────────────────────────────────────
    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Insufficient staked balance")]
    InsufficientStake,

    #[error("Insufficient allowance")]
    InsufficientAllowance,

    // ── Access control ───────────────────────────────────────────────────────
    #[error("Operation is paused")]
    Paused,

    #[error("Caller is not authorized for this operation")]
    Unauthorized,

    // ── AMM legs ─────────────────────────────────────────────────────────────
    /// An AMM leg produced less than the caller's minimum.
    #[error("Output below minimum — slippage exceeded: actual={actual}, minimum={minimum}")]
    SlippageExceeded { actual: u64, minimum: u64 },

    #[error("No pair exists for this token combination")]
    PairNotFound,

    #[error("Pair has insufficient liquidity")]
    InsufficientLiquidity,

    // ── Arithmetic ───────────────────────────────────────────────────────────
    /// Overflow or an undefined division. Never expected on valid state.
    #[error("Arithmetic fault (overflow or division by zero)")]
    ArithmeticFault,
}

/// Convenience alias so every module can write `Result<T>`.
pub type Result<T> = std::result::Result<T, VaultError>;
