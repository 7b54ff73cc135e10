//! Error taxonomy for the quoting, simulation and execution pipeline.
//!
//! Every error exposes a stable kebab-case `reason()` so route results can be
//! logged and compared without matching on display strings.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::dex_interface::LegQuote;

/// Malformed route input (pool count, mints, amount, impact bound).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputValidationError {
    #[error("expected exactly 3 pools, got {0}")]
    PoolCount(usize),

    #[error("token {0} is missing")]
    MissingToken(&'static str),

    #[error("dx must be > 0")]
    NonPositiveAmount,

    #[error("max impact must be a finite number, got {0}")]
    InvalidMaxImpact(f64),
}

impl InputValidationError {
    pub fn reason(&self) -> &'static str {
        match self {
            InputValidationError::PoolCount(_) => "invalid-pool-count",
            InputValidationError::MissingToken(_) => "missing-token",
            InputValidationError::NonPositiveAmount => "invalid-amount",
            InputValidationError::InvalidMaxImpact(_) => "invalid-max-impact",
        }
    }
}

/// A leg could not be priced. Never substituted with a default value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuoteFailure {
    #[error("input amount must be > 0")]
    InvalidAmount,

    #[error("slippage {0} bps is out of range")]
    InvalidSlippage(u16),

    #[error("pool {pool} has no reserves")]
    ReservesMissing { pool: String },

    #[error("pool {pool} has a zero reserve")]
    ReservesZero { pool: String },

    #[error("pool {pool} is missing {field}")]
    PoolIncomplete { pool: String, field: &'static str },

    #[error("no quote adapter available: {0}")]
    AdapterUnavailable(String),

    #[error("no simulation method for pool {pool}")]
    NoSimulationMethod { pool: String },

    #[error("mint {mint} does not match pool {pool}")]
    MintMismatch { pool: String, mint: Pubkey },

    #[error("incomplete quote: {0}")]
    IncompleteQuote(String),

    #[error("arithmetic overflow while quoting pool {pool}")]
    MathOverflow { pool: String },

    #[error("quote timed out after {0}ms")]
    Timeout(u64),

    #[error("adapter used before init")]
    NotInitialized,

    #[error("adapter init failed: {0}")]
    Init(#[from] InitError),

    #[error("liquidity sdk error: {0}")]
    Sdk(String),

    #[error("chain read failed: {0}")]
    Chain(String),

    #[error("price impact {impact_pct:.4}% exceeds limit {max_pct}%")]
    PriceImpactExceeded { impact_pct: f64, max_pct: f64 },
}

impl QuoteFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            QuoteFailure::InvalidAmount => "invalid-amount",
            QuoteFailure::InvalidSlippage(_) => "invalid-slippage",
            QuoteFailure::ReservesMissing { .. } => "reserves-missing",
            QuoteFailure::ReservesZero { .. } => "reserves-zero",
            QuoteFailure::PoolIncomplete { .. } => "pool-incomplete",
            QuoteFailure::AdapterUnavailable(_) => "adapter-unavailable",
            QuoteFailure::NoSimulationMethod { .. } => "no-simulation-method",
            QuoteFailure::MintMismatch { .. } => "mint-mismatch",
            QuoteFailure::IncompleteQuote(_) => "incomplete-quote",
            QuoteFailure::MathOverflow { .. } => "math-overflow",
            QuoteFailure::Timeout(_) => "timeout",
            QuoteFailure::NotInitialized => "not-initialized",
            QuoteFailure::Init(_) => "init-failed",
            QuoteFailure::Sdk(_) => "sdk-error",
            QuoteFailure::Chain(_) => "chain-error",
            QuoteFailure::PriceImpactExceeded { .. } => "price-impact-exceeded",
        }
    }
}

/// Adapter `init` failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InitError {
    #[error("pool record is missing {0}")]
    MissingField(&'static str),

    #[error("pool account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("failed to decode pool account: {0}")]
    Decode(String),

    #[error("on-chain mints do not match the pool record")]
    MintMismatch,

    #[error("liquidity sdk error: {0}")]
    Sdk(String),

    #[error("chain read failed: {0}")]
    Chain(String),
}

/// Why a triangular route was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputValidationError),

    #[error("pools do not form a closed A->B->C->A cycle")]
    InvalidTriangle,

    #[error("leg {leg} failed: {failure}")]
    LegFailed { leg: usize, failure: QuoteFailure },

    /// Profit guard tripped; the legs are kept for diagnosis.
    #[error("unrealistic profit {profit_pct}%")]
    UnrealisticProfit { profit_pct: f64, legs: Vec<LegQuote> },
}

impl RouteError {
    pub fn reason(&self) -> &'static str {
        match self {
            RouteError::InvalidInput(e) => e.reason(),
            RouteError::InvalidTriangle => "invalid-triangle",
            RouteError::LegFailed { failure, .. } => failure.reason(),
            RouteError::UnrealisticProfit { .. } => "unrealistic-profit",
        }
    }

    /// Legs carried by the error, if any.
    pub fn legs(&self) -> &[LegQuote] {
        match self {
            RouteError::UnrealisticProfit { legs, .. } => legs,
            _ => &[],
        }
    }
}

/// Transaction build or broadcast failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("flashloan provider is not configured")]
    FlashloanProviderUnconfigured,

    #[error("expected 3 route legs, got {0}")]
    LegCount(usize),

    #[error("leg {leg} is missing {field}")]
    MissingLegAmount { leg: usize, field: &'static str },

    #[error("leg 1 input {actual} does not match the loan amount {expected}")]
    LoanAmountMismatch { expected: u64, actual: u64 },

    #[error("leg {leg} reuses the loan amount instead of its own quoted input")]
    ReusedLoanAmount { leg: usize },

    #[error("leg {leg} input {actual} does not match the previous leg's quoted output {expected}")]
    LegAmountMismatch { leg: usize, expected: u64, actual: u64 },

    #[error("leg {leg} mints do not chain: {detail}")]
    BrokenMintChain { leg: usize, detail: String },

    #[error("leg {leg} has no routing accounts for {dex}")]
    MissingRoutingAccounts { leg: usize, dex: String },

    #[error("unsupported dex type '{0}'")]
    UnsupportedDex(String),

    #[error("instruction builder failed for leg {leg}: {detail}")]
    InstructionBuild { leg: usize, detail: String },

    #[error("flashloan instruction failed: {0}")]
    Flashloan(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("transaction {0} failed on-chain: {1}")]
    TransactionFailed(String, String),

    #[error("blockhash expired before {0} confirmed")]
    BlockhashExpired(String),

    #[error("confirmation timed out for {0}")]
    ConfirmTimeout(String),

    #[error("execution is not configured")]
    NotConfigured,
}

impl ExecutionError {
    pub fn reason(&self) -> &'static str {
        match self {
            ExecutionError::FlashloanProviderUnconfigured => "flashloan-unconfigured",
            ExecutionError::LegCount(_) => "invalid-leg-count",
            ExecutionError::MissingLegAmount { .. } => "missing-leg-amount",
            ExecutionError::LoanAmountMismatch { .. } => "loan-amount-mismatch",
            ExecutionError::ReusedLoanAmount { .. } => "reused-loan-amount",
            ExecutionError::LegAmountMismatch { .. } => "leg-amount-mismatch",
            ExecutionError::BrokenMintChain { .. } => "broken-mint-chain",
            ExecutionError::MissingRoutingAccounts { .. } => "missing-routing-accounts",
            ExecutionError::UnsupportedDex(_) => "unsupported-dex",
            ExecutionError::InstructionBuild { .. } => "instruction-build-failed",
            ExecutionError::Flashloan(_) => "flashloan-failed",
            ExecutionError::Signing(_) => "signing-failed",
            ExecutionError::Send(_) => "send-failed",
            ExecutionError::TransactionFailed(..) => "transaction-failed",
            ExecutionError::BlockhashExpired(_) => "blockhash-expired",
            ExecutionError::ConfirmTimeout(_) => "confirm-timeout",
            ExecutionError::NotConfigured => "execution-not-configured",
        }
    }
}
