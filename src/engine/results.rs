// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::keepers::{BankError, OracleError, PricingError};
use crate::margin::MarginRatioTooLow;
use crate::position::{Position, PositionResp};
use crate::types::{Address, Coin, Pair, PairParseError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginChangeResult {
    pub position: Position,
    pub funding_payment: Decimal,
    pub margin_out: Option<Coin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingResult {
    pub pair: Pair,
    pub mark_price: Decimal,
    pub index_price: Decimal,
    pub premium_fraction: Decimal,
    pub funding_rate: Decimal,
    pub cumulative_premium_fraction: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    pub fee_to_liquidator: Coin,
    pub fee_to_perp_ecosystem_fund: Coin,
    pub bad_debt: Decimal,
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRequest {
    pub pair: Pair,
    pub trader: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiLiquidationResult {
    pub request: LiquidationRequest,
    pub outcome: Result<LiquidationOutcome, EngineError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub position: Position,
    pub position_notional: Decimal,
    pub unrealized_pnl: Decimal,
    pub margin_ratio_mark: Decimal,
    pub margin_ratio_index: Option<Decimal>,
    pub block_number: i64,
}

/// Every open/close entry point returns the transition it applied.
pub type TradeResult = Result<PositionResp, EngineError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("pair {0} not found")]
    PairNotFound(Pair),

    #[error("no funding metadata for pair {0}")]
    PairMetadataNotFound(Pair),

    #[error("pair {0} already registered")]
    PairAlreadyExists(Pair),

    #[error("no position for {trader} on {pair}")]
    PositionNotFound { pair: Pair, trader: Address },

    #[error("position size is zero")]
    PositionZero,

    #[error("quote amount must be positive")]
    QuoteAmountIsZero,

    #[error("leverage must be positive")]
    LeverageIsZero,

    #[error("leverage {leverage} exceeds the pair maximum {max}")]
    LeverageIsTooHigh { leverage: Decimal, max: Decimal },

    #[error("margin ratio {ratio} is below the required {threshold}")]
    MarginRatioTooLow { ratio: Decimal, threshold: Decimal },

    #[error("margin ratio {ratio} is at or above maintenance {threshold}, cannot liquidate")]
    MarginHighEnough { ratio: Decimal, threshold: Decimal },

    #[error("underwater position: closing leaves {bad_debt} bad debt, cannot reverse")]
    UnderwaterPosition { bad_debt: Decimal },

    #[error("opening or increasing a position cannot carry bad debt, got {0}")]
    BadDebtOnOpen(Decimal),

    #[error("removing margin would create {0} bad debt")]
    RemoveMarginCausesBadDebt(Decimal),

    #[error("cannot add margin to a position with {0} bad debt")]
    AddMarginWithBadDebt(Decimal),

    #[error("not enough free collateral: {0}")]
    NotEnoughFreeCollateral(Decimal),

    #[error("margin denom {got} does not match quote denom {expected}")]
    InvalidMarginDenom { expected: String, got: String },

    #[error("margin amount must be positive, got {0}")]
    InvalidMarginAmount(Decimal),

    #[error("open interest on {pair} would reach {requested}, cap is {cap}")]
    OpenInterestExceeded { pair: Pair, requested: Decimal, cap: Decimal },

    #[error("liquidate response is incomplete: {0}")]
    InvalidLiquidateResp(String),

    #[error("every liquidation in the batch failed")]
    AllLiquidationsFailed,

    #[error("remaining open notional {0} must be positive after a reduction")]
    NonPositiveOpenNotional(Decimal),

    #[error("invalid pair: {0}")]
    InvalidPair(#[from] PairParseError),

    #[error("pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("bank error: {0}")]
    Bank(#[from] BankError),

    #[error("invalid params: {0}")]
    Config(#[from] ConfigError),
}

impl From<MarginRatioTooLow> for EngineError {
    fn from(err: MarginRatioTooLow) -> Self {
        EngineError::MarginRatioTooLow {
            ratio: err.ratio,
            threshold: err.threshold,
        }
    }
}
