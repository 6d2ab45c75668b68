//! Scripted collaborators for engine unit tests. every price and swap result is set by the test.

use super::config::EngineConfig;
use super::core::Engine;
use crate::config::Params;
use crate::custody::Ledger;
use crate::keepers::{Bank, Oracle, OracleError, PricingEngine, PricingError};
use crate::types::{Direction, Pair};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

pub(crate) type ScriptedEngine = Engine<ScriptedPool, FixedOracle, Ledger>;

pub(crate) fn pair() -> Pair {
    Pair::new("ubtc", "unusd").expect("valid test pair")
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SwapCall {
    pub direction: Direction,
    pub amount: Decimal,
    pub limit: Decimal,
}

#[derive(Debug, Clone)]
pub(crate) struct ScriptedPool {
    pub pair: Pair,
    pub max_leverage: Decimal,
    /// returned by swap_quote_for_base
    pub swap_base_out: Decimal,
    /// returned by swap_base_for_quote
    pub swap_quote_out: Decimal,
    /// base_asset_price for sizes not listed in size_quotes
    pub spot_notional: Decimal,
    pub size_quotes: BTreeMap<Decimal, Decimal>,
    pub twap_notional: Decimal,
    pub mark_price: Decimal,
    pub mark_twap: Decimal,
    pub settlement_price: Option<Decimal>,
    pub swaps: Vec<SwapCall>,
}

impl ScriptedPool {
    fn check_pair(&self, pair: &Pair) -> Result<(), PricingError> {
        if pair == &self.pair {
            Ok(())
        } else {
            Err(PricingError::PoolNotFound(pair.clone()))
        }
    }
}

impl PricingEngine for ScriptedPool {
    fn exists_pool(&self, pair: &Pair) -> bool {
        pair == &self.pair
    }

    fn max_leverage(&self, pair: &Pair) -> Result<Decimal, PricingError> {
        self.check_pair(pair)?;
        Ok(self.max_leverage)
    }

    fn swap_quote_for_base(
        &mut self,
        pair: &Pair,
        direction: Direction,
        quote_amount: Decimal,
        base_limit: Decimal,
        _skip_fluctuation_check: bool,
    ) -> Result<Decimal, PricingError> {
        self.check_pair(pair)?;
        self.swaps.push(SwapCall {
            direction,
            amount: quote_amount,
            limit: base_limit,
        });
        Ok(self.swap_base_out)
    }

    fn swap_base_for_quote(
        &mut self,
        pair: &Pair,
        direction: Direction,
        base_amount: Decimal,
        quote_limit: Decimal,
        _skip_fluctuation_check: bool,
    ) -> Result<Decimal, PricingError> {
        self.check_pair(pair)?;
        self.swaps.push(SwapCall {
            direction,
            amount: base_amount,
            limit: quote_limit,
        });
        Ok(self.swap_quote_out)
    }

    fn base_asset_price(
        &self,
        pair: &Pair,
        _direction: Direction,
        base_amount: Decimal,
    ) -> Result<Decimal, PricingError> {
        self.check_pair(pair)?;
        Ok(self.size_quotes.get(&base_amount).copied().unwrap_or(self.spot_notional))
    }

    fn base_asset_twap(
        &self,
        pair: &Pair,
        _direction: Direction,
        _base_amount: Decimal,
        _lookback_ms: i64,
    ) -> Result<Decimal, PricingError> {
        self.check_pair(pair)?;
        Ok(self.twap_notional)
    }

    fn mark_price(&self, pair: &Pair) -> Result<Decimal, PricingError> {
        self.check_pair(pair)?;
        Ok(self.mark_price)
    }

    fn mark_price_twap(&self, pair: &Pair, _lookback_ms: i64) -> Result<Decimal, PricingError> {
        self.check_pair(pair)?;
        Ok(self.mark_twap)
    }

    fn settlement_price(&self, pair: &Pair) -> Result<Decimal, PricingError> {
        self.check_pair(pair)?;
        self.settlement_price
            .ok_or_else(|| PricingError::PoolEnabled(pair.clone()))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FixedOracle {
    pub price: Decimal,
}

impl Oracle for FixedOracle {
    fn current_twap(&self, _token0: &str, _token1: &str) -> Result<Decimal, OracleError> {
        Ok(self.price)
    }
}

/// One registered pair, max leverage 15, empty ledger, default params.
pub(crate) fn scripted_engine() -> ScriptedEngine {
    let pool = ScriptedPool {
        pair: pair(),
        max_leverage: dec!(15),
        swap_base_out: Decimal::ZERO,
        swap_quote_out: Decimal::ZERO,
        spot_notional: Decimal::ZERO,
        size_quotes: BTreeMap::new(),
        twap_notional: Decimal::ZERO,
        mark_price: dec!(10),
        mark_twap: dec!(10),
        settlement_price: None,
        swaps: Vec::new(),
    };
    let oracle = FixedOracle { price: dec!(10) };

    let mut engine = Engine::new(Params::default(), EngineConfig::default(), pool, oracle, Ledger::new())
        .expect("default params are valid");
    engine.add_pair(pair()).expect("fresh engine");
    engine
}

impl<V, O, B> Engine<V, O, B>
where
    V: PricingEngine + Clone,
    O: Oracle,
    B: Bank + Clone,
{
    /// Pushes a premium fraction so the pair's latest cumulative value becomes `value`.
    pub(crate) fn set_cumulative_premium_fraction(&mut self, pair: &Pair, value: Decimal) {
        if let Some(meta) = self.state.pair_metadata.get_mut(pair) {
            let delta = value - meta.latest_cumulative_premium_fraction();
            meta.push_premium_fraction(delta);
        }
    }
}
