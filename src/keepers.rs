// 3.0 keepers.rs: the capabilities the clearing house consumes from outside.
// pricing (virtual pool), oracle (index prices), bank (module accounts) and the
// large-position whitelist. each is a narrow trait injected into the engine.

use crate::types::{Address, BlockContext, Coin, Direction, Pair};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// 3.1: module accounts holding clearing house funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleAccount {
    /// Trader margin collateral
    Vault,
    /// Absorbs bad debt, fronts vault shortfalls
    PerpEcosystemFund,
    /// Receives the toll
    FeePool,
}

impl ModuleAccount {
    pub fn name(&self) -> &'static str {
        match self {
            ModuleAccount::Vault => "vault",
            ModuleAccount::PerpEcosystemFund => "perp_ef",
            ModuleAccount::FeePool => "fee_pool",
        }
    }

    pub fn address(&self) -> Address {
        Address::module(self.name())
    }
}

impl fmt::Display for ModuleAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("no pool for pair {0}")]
    PoolNotFound(Pair),

    #[error("pool {0} is not enabled")]
    PoolDisabled(Pair),

    #[error("pool {0} is still enabled, no settlement price")]
    PoolEnabled(Pair),

    #[error("price of {pair} would move to {price}, outside the fluctuation limit")]
    OverFluctuationLimit { pair: Pair, price: Decimal },

    #[error("trade of {amount} on {pair} exceeds the trade limit {limit}")]
    OverTradingLimit { pair: Pair, amount: Decimal, limit: Decimal },

    #[error("base amount {amount} crosses the limit {limit}")]
    BaseLimitExceeded { amount: Decimal, limit: Decimal },

    #[error("quote amount {amount} crosses the limit {limit}")]
    QuoteLimitExceeded { amount: Decimal, limit: Decimal },

    #[error("pool {0} does not hold enough reserve")]
    InsufficientReserve(Pair),

    #[error("invalid amount {0}")]
    InvalidAmount(Decimal),
}

/// Virtual pool as seen by the clearing house. all amounts are absolute.
pub trait PricingEngine {
    fn exists_pool(&self, pair: &Pair) -> bool;

    fn max_leverage(&self, pair: &Pair) -> Result<Decimal, PricingError>;

    /// Swaps `quote_amount` for base. `base_limit` of zero means no slippage bound.
    fn swap_quote_for_base(
        &mut self,
        pair: &Pair,
        direction: Direction,
        quote_amount: Decimal,
        base_limit: Decimal,
        skip_fluctuation_check: bool,
    ) -> Result<Decimal, PricingError>;

    /// Swaps `base_amount` for quote. `quote_limit` of zero means no slippage bound.
    fn swap_base_for_quote(
        &mut self,
        pair: &Pair,
        direction: Direction,
        base_amount: Decimal,
        quote_limit: Decimal,
        skip_fluctuation_check: bool,
    ) -> Result<Decimal, PricingError>;

    /// Quote value of moving `base_amount` in `direction` at current reserves.
    fn base_asset_price(
        &self,
        pair: &Pair,
        direction: Direction,
        base_amount: Decimal,
    ) -> Result<Decimal, PricingError>;

    fn base_asset_twap(
        &self,
        pair: &Pair,
        direction: Direction,
        base_amount: Decimal,
        lookback_ms: i64,
    ) -> Result<Decimal, PricingError>;

    fn mark_price(&self, pair: &Pair) -> Result<Decimal, PricingError>;

    fn mark_price_twap(&self, pair: &Pair, lookback_ms: i64) -> Result<Decimal, PricingError>;

    /// Only available once the pool has been deactivated.
    fn settlement_price(&self, pair: &Pair) -> Result<Decimal, PricingError>;

    fn begin_block(&mut self, _block: &BlockContext) {}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("no index price for {token0}:{token1}")]
    NoPrice { token0: String, token1: String },
}

pub trait Oracle {
    fn current_twap(&self, token0: &str, token1: &str) -> Result<Decimal, OracleError>;

    fn begin_block(&mut self, _block: &BlockContext) {}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BankError {
    #[error("{address} holds {available}{denom}, needs {requested}{denom}")]
    InsufficientFunds {
        address: Address,
        denom: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("transfer amount {0} must be a positive whole number")]
    InvalidAmount(Decimal),
}

pub trait Bank {
    fn balance(&self, address: &Address, denom: &str) -> Decimal;

    fn send_from_account_to_module(
        &mut self,
        from: &Address,
        to: ModuleAccount,
        coin: &Coin,
    ) -> Result<(), BankError>;

    fn send_from_module_to_module(
        &mut self,
        from: ModuleAccount,
        to: ModuleAccount,
        coin: &Coin,
    ) -> Result<(), BankError>;

    fn send_from_module_to_account(
        &mut self,
        from: ModuleAccount,
        to: &Address,
        coin: &Coin,
    ) -> Result<(), BankError>;

    fn module_balance(&self, module: ModuleAccount, denom: &str) -> Decimal {
        self.balance(&module.address(), denom)
    }
}

/// Traders allowed past the open interest cap.
pub trait Whitelist: fmt::Debug {
    fn is_whitelisted(&self, address: &Address) -> bool;
}

impl Whitelist for BTreeSet<Address> {
    fn is_whitelisted(&self, address: &Address) -> bool {
        self.contains(address)
    }
}
