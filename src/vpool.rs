// 9.3 vpool.rs: MOCKED virtual pool. constant product x*y=k per pair, no real liquidity.
// reserves are snapshotted every block for TWAPs. swaps are bounded by a trade limit
// (share of reserve) and a fluctuation limit (price move within the block).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::keepers::{PricingEngine, PricingError};
use crate::types::{BlockContext, Direction, Pair};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpoolConfig {
    // Max share of a reserve one swap may take (0.1 = 10%)
    pub trade_limit_ratio: Decimal,
    // Max relative price move against the block's opening price
    pub fluctuation_limit_ratio: Decimal,
    pub max_leverage: Decimal,
    // Snapshots kept for TWAPs
    pub max_snapshots: usize,
}

impl Default for VpoolConfig {
    fn default() -> Self {
        Self {
            trade_limit_ratio: dec!(0.1),
            fluctuation_limit_ratio: dec!(0.1),
            max_leverage: dec!(15),
            max_snapshots: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub quote_reserve: Decimal,
    pub base_reserve: Decimal,
    pub timestamp_ms: i64,
    pub block_height: i64,
}

impl ReserveSnapshot {
    pub fn price(&self) -> Decimal {
        self.quote_reserve / self.base_reserve
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vpool {
    pair: Pair,
    quote_reserve: Decimal,
    base_reserve: Decimal,
    config: VpoolConfig,
    enabled: bool,
    settlement_price: Option<Decimal>,
    // Spot price when the current block began
    block_open_price: Decimal,
    // Oldest first, the last entry tracks the current block
    snapshots: VecDeque<ReserveSnapshot>,
    now_ms: i64,
}

impl Vpool {
    pub fn new(
        pair: Pair,
        quote_reserve: Decimal,
        base_reserve: Decimal,
        config: VpoolConfig,
        block: &BlockContext,
    ) -> Result<Self, PricingError> {
        if quote_reserve <= Decimal::ZERO {
            return Err(PricingError::InvalidAmount(quote_reserve));
        }
        if base_reserve <= Decimal::ZERO {
            return Err(PricingError::InvalidAmount(base_reserve));
        }

        let mut snapshots = VecDeque::new();
        snapshots.push_back(ReserveSnapshot {
            quote_reserve,
            base_reserve,
            timestamp_ms: block.time.as_millis(),
            block_height: block.height,
        });

        Ok(Self {
            pair,
            quote_reserve,
            base_reserve,
            config,
            enabled: true,
            settlement_price: None,
            block_open_price: quote_reserve / base_reserve,
            snapshots,
            now_ms: block.time.as_millis(),
        })
    }

    pub fn pair(&self) -> &Pair {
        &self.pair
    }

    pub fn quote_reserve(&self) -> Decimal {
        self.quote_reserve
    }

    pub fn base_reserve(&self) -> Decimal {
        self.base_reserve
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn spot_price(&self) -> Decimal {
        self.quote_reserve / self.base_reserve
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &ReserveSnapshot> {
        self.snapshots.iter()
    }

    /// Stops trading and fixes the settlement price at the current spot.
    pub fn deactivate(&mut self) {
        self.enabled = false;
        self.settlement_price = Some(self.spot_price());
    }

    pub fn begin_block(&mut self, block: &BlockContext) {
        self.now_ms = block.time.as_millis();
        self.block_open_price = self.spot_price();

        if matches!(self.snapshots.back(), Some(last) if last.block_height == block.height) {
            return;
        }
        self.snapshots.push_back(ReserveSnapshot {
            quote_reserve: self.quote_reserve,
            base_reserve: self.base_reserve,
            timestamp_ms: self.now_ms,
            block_height: block.height,
        });
        while self.snapshots.len() > self.config.max_snapshots {
            self.snapshots.pop_front();
        }
    }

    // quote paid (RemoveFromPool) or received (AddToPool) for moving base_amount
    fn quote_for_base(
        quote_reserve: Decimal,
        base_reserve: Decimal,
        direction: Direction,
        base_amount: Decimal,
    ) -> Option<Decimal> {
        match direction {
            Direction::AddToPool => Some(quote_reserve * base_amount / (base_reserve + base_amount)),
            Direction::RemoveFromPool if base_amount < base_reserve => {
                Some(quote_reserve * base_amount / (base_reserve - base_amount))
            }
            Direction::RemoveFromPool => None,
        }
    }

    fn base_for_quote(
        quote_reserve: Decimal,
        base_reserve: Decimal,
        direction: Direction,
        quote_amount: Decimal,
    ) -> Option<Decimal> {
        match direction {
            Direction::AddToPool => Some(base_reserve * quote_amount / (quote_reserve + quote_amount)),
            Direction::RemoveFromPool if quote_amount < quote_reserve => {
                Some(base_reserve * quote_amount / (quote_reserve - quote_amount))
            }
            Direction::RemoveFromPool => None,
        }
    }

    pub fn base_asset_price(&self, direction: Direction, base_amount: Decimal) -> Result<Decimal, PricingError> {
        if base_amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        Self::quote_for_base(self.quote_reserve, self.base_reserve, direction, base_amount)
            .ok_or_else(|| PricingError::InsufficientReserve(self.pair.clone()))
    }

    pub fn quote_asset_price(&self, direction: Direction, quote_amount: Decimal) -> Result<Decimal, PricingError> {
        if quote_amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        Self::base_for_quote(self.quote_reserve, self.base_reserve, direction, quote_amount)
            .ok_or_else(|| PricingError::InsufficientReserve(self.pair.clone()))
    }

    fn require_enabled(&self) -> Result<(), PricingError> {
        if self.enabled {
            Ok(())
        } else {
            Err(PricingError::PoolDisabled(self.pair.clone()))
        }
    }

    fn check_trade_limit(&self, amount: Decimal, reserve: Decimal) -> Result<(), PricingError> {
        let limit = reserve * self.config.trade_limit_ratio;
        if amount > limit {
            return Err(PricingError::OverTradingLimit {
                pair: self.pair.clone(),
                amount,
                limit,
            });
        }
        Ok(())
    }

    fn check_fluctuation(&self, quote_reserve: Decimal, base_reserve: Decimal) -> Result<(), PricingError> {
        let price = quote_reserve / base_reserve;
        let open = self.block_open_price;
        if open.is_zero() {
            return Ok(());
        }
        if ((price - open) / open).abs() > self.config.fluctuation_limit_ratio {
            return Err(PricingError::OverFluctuationLimit {
                pair: self.pair.clone(),
                price,
            });
        }
        Ok(())
    }

    // commits new reserves, the current block's snapshot follows them
    fn commit(&mut self, quote_reserve: Decimal, base_reserve: Decimal) {
        self.quote_reserve = quote_reserve;
        self.base_reserve = base_reserve;
        if let Some(last) = self.snapshots.back_mut() {
            last.quote_reserve = quote_reserve;
            last.base_reserve = base_reserve;
        }
    }

    /// `direction` is the quote side of the swap.
    pub fn swap_quote_for_base(
        &mut self,
        direction: Direction,
        quote_amount: Decimal,
        base_limit: Decimal,
        skip_fluctuation_check: bool,
    ) -> Result<Decimal, PricingError> {
        self.require_enabled()?;
        if quote_amount < Decimal::ZERO {
            return Err(PricingError::InvalidAmount(quote_amount));
        }
        if quote_amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.check_trade_limit(quote_amount, self.quote_reserve)?;

        let base_amount = self.quote_asset_price(direction, quote_amount)?;
        if !base_limit.is_zero() {
            let crosses = match direction {
                Direction::AddToPool => base_amount < base_limit,
                Direction::RemoveFromPool => base_amount > base_limit,
            };
            if crosses {
                return Err(PricingError::BaseLimitExceeded {
                    amount: base_amount,
                    limit: base_limit,
                });
            }
        }

        let (quote_reserve, base_reserve) = match direction {
            Direction::AddToPool => (self.quote_reserve + quote_amount, self.base_reserve - base_amount),
            Direction::RemoveFromPool => (self.quote_reserve - quote_amount, self.base_reserve + base_amount),
        };
        if !skip_fluctuation_check {
            self.check_fluctuation(quote_reserve, base_reserve)?;
        }
        self.commit(quote_reserve, base_reserve);
        Ok(base_amount)
    }

    /// `direction` is the base side of the swap.
    pub fn swap_base_for_quote(
        &mut self,
        direction: Direction,
        base_amount: Decimal,
        quote_limit: Decimal,
        skip_fluctuation_check: bool,
    ) -> Result<Decimal, PricingError> {
        self.require_enabled()?;
        if base_amount < Decimal::ZERO {
            return Err(PricingError::InvalidAmount(base_amount));
        }
        if base_amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.check_trade_limit(base_amount, self.base_reserve)?;

        let quote_amount = self.base_asset_price(direction, base_amount)?;
        if !quote_limit.is_zero() {
            let crosses = match direction {
                Direction::AddToPool => quote_amount < quote_limit,
                Direction::RemoveFromPool => quote_amount > quote_limit,
            };
            if crosses {
                return Err(PricingError::QuoteLimitExceeded {
                    amount: quote_amount,
                    limit: quote_limit,
                });
            }
        }

        let (quote_reserve, base_reserve) = match direction {
            Direction::AddToPool => (self.quote_reserve - quote_amount, self.base_reserve + base_amount),
            Direction::RemoveFromPool => (self.quote_reserve + quote_amount, self.base_reserve - base_amount),
        };
        if !skip_fluctuation_check {
            self.check_fluctuation(quote_reserve, base_reserve)?;
        }
        self.commit(quote_reserve, base_reserve);
        Ok(quote_amount)
    }

    // time weighted average of `value` over the snapshots in the window.
    // a snapshot holds from its timestamp until the next one, the last until now.
    fn twap(
        &self,
        lookback_ms: i64,
        value: impl Fn(&ReserveSnapshot) -> Option<Decimal>,
    ) -> Result<Decimal, PricingError> {
        let window_start = self.now_ms - lookback_ms;
        let mut weighted_sum = Decimal::ZERO;
        let mut total_time = Decimal::ZERO;
        let mut period_end = self.now_ms;

        for snapshot in self.snapshots.iter().rev() {
            let start = snapshot.timestamp_ms.max(window_start);
            if period_end > start {
                let duration = Decimal::from(period_end - start);
                let v = value(snapshot).ok_or_else(|| PricingError::InsufficientReserve(self.pair.clone()))?;
                weighted_sum += v * duration;
                total_time += duration;
            }
            if snapshot.timestamp_ms <= window_start {
                break;
            }
            period_end = snapshot.timestamp_ms;
        }

        if total_time.is_zero() {
            let latest = ReserveSnapshot {
                quote_reserve: self.quote_reserve,
                base_reserve: self.base_reserve,
                timestamp_ms: self.now_ms,
                block_height: 0,
            };
            return value(&latest).ok_or_else(|| PricingError::InsufficientReserve(self.pair.clone()));
        }
        Ok(weighted_sum / total_time)
    }

    pub fn mark_price_twap(&self, lookback_ms: i64) -> Result<Decimal, PricingError> {
        self.twap(lookback_ms, |s| Some(s.price()))
    }

    pub fn base_asset_twap(
        &self,
        direction: Direction,
        base_amount: Decimal,
        lookback_ms: i64,
    ) -> Result<Decimal, PricingError> {
        if base_amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.twap(lookback_ms, |s| {
            Self::quote_for_base(s.quote_reserve, s.base_reserve, direction, base_amount)
        })
    }
}

/// Every pool the clearing house can trade against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VpoolSet {
    pools: BTreeMap<Pair, Vpool>,
}

impl VpoolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool(&mut self, pool: Vpool) {
        self.pools.insert(pool.pair().clone(), pool);
    }

    pub fn pool(&self, pair: &Pair) -> Result<&Vpool, PricingError> {
        self.pools
            .get(pair)
            .ok_or_else(|| PricingError::PoolNotFound(pair.clone()))
    }

    pub fn pool_mut(&mut self, pair: &Pair) -> Result<&mut Vpool, PricingError> {
        self.pools
            .get_mut(pair)
            .ok_or_else(|| PricingError::PoolNotFound(pair.clone()))
    }

    pub fn deactivate(&mut self, pair: &Pair) -> Result<Decimal, PricingError> {
        let pool = self.pool_mut(pair)?;
        pool.deactivate();
        tracing::info!(%pair, price = %pool.spot_price(), "pool deactivated");
        Ok(pool.spot_price())
    }
}

impl PricingEngine for VpoolSet {
    fn exists_pool(&self, pair: &Pair) -> bool {
        self.pools.contains_key(pair)
    }

    fn max_leverage(&self, pair: &Pair) -> Result<Decimal, PricingError> {
        Ok(self.pool(pair)?.config.max_leverage)
    }

    fn swap_quote_for_base(
        &mut self,
        pair: &Pair,
        direction: Direction,
        quote_amount: Decimal,
        base_limit: Decimal,
        skip_fluctuation_check: bool,
    ) -> Result<Decimal, PricingError> {
        self.pool_mut(pair)?
            .swap_quote_for_base(direction, quote_amount, base_limit, skip_fluctuation_check)
    }

    fn swap_base_for_quote(
        &mut self,
        pair: &Pair,
        direction: Direction,
        base_amount: Decimal,
        quote_limit: Decimal,
        skip_fluctuation_check: bool,
    ) -> Result<Decimal, PricingError> {
        self.pool_mut(pair)?
            .swap_base_for_quote(direction, base_amount, quote_limit, skip_fluctuation_check)
    }

    fn base_asset_price(
        &self,
        pair: &Pair,
        direction: Direction,
        base_amount: Decimal,
    ) -> Result<Decimal, PricingError> {
        self.pool(pair)?.base_asset_price(direction, base_amount)
    }

    fn base_asset_twap(
        &self,
        pair: &Pair,
        direction: Direction,
        base_amount: Decimal,
        lookback_ms: i64,
    ) -> Result<Decimal, PricingError> {
        self.pool(pair)?.base_asset_twap(direction, base_amount, lookback_ms)
    }

    fn mark_price(&self, pair: &Pair) -> Result<Decimal, PricingError> {
        Ok(self.pool(pair)?.spot_price())
    }

    fn mark_price_twap(&self, pair: &Pair, lookback_ms: i64) -> Result<Decimal, PricingError> {
        self.pool(pair)?.mark_price_twap(lookback_ms)
    }

    fn settlement_price(&self, pair: &Pair) -> Result<Decimal, PricingError> {
        let pool = self.pool(pair)?;
        pool.settlement_price
            .ok_or_else(|| PricingError::PoolEnabled(pair.clone()))
    }

    fn begin_block(&mut self, block: &BlockContext) {
        for pool in self.pools.values_mut() {
            pool.begin_block(block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    fn block(height: i64, ms: i64) -> BlockContext {
        BlockContext::new(height, Timestamp::from_millis(ms))
    }

    fn pool(quote: Decimal, base: Decimal) -> Vpool {
        Vpool::new("ubtc:unusd".parse().unwrap(), quote, base, VpoolConfig::default(), &block(1, 0)).unwrap()
    }

    #[test]
    fn constant_product_swaps() {
        let mut p = pool(dec!(1000), dec!(100));
        assert_eq!(p.spot_price(), dec!(10));

        // add 100 quote: base out = 100 * 100 / 1100
        let base = p.swap_quote_for_base(Direction::AddToPool, dec!(100), Decimal::ZERO, true).unwrap();
        assert_eq!(base, dec!(10000) / dec!(1100));
        assert_eq!(p.quote_reserve(), dec!(1100));
        assert_eq!((p.quote_reserve() * p.base_reserve()).round_dp(10), dec!(100000));
    }

    #[test]
    fn remove_quote_pays_base_in() {
        let mut p = pool(dec!(1000), dec!(100));
        let base = p.swap_quote_for_base(Direction::RemoveFromPool, dec!(50), Decimal::ZERO, true).unwrap();
        // 100 * 50 / 950
        assert_eq!(base, dec!(5000) / dec!(950));
        assert_eq!(p.quote_reserve(), dec!(950));
    }

    #[test]
    fn base_swaps_mirror_quote_swaps() {
        let mut p = pool(dec!(1000), dec!(100));
        let quote = p.swap_base_for_quote(Direction::AddToPool, dec!(5), Decimal::ZERO, true).unwrap();
        assert_eq!(quote, dec!(5000) / dec!(105));
        assert_eq!(p.base_reserve(), dec!(105));

        let quote = p.swap_base_for_quote(Direction::RemoveFromPool, dec!(5), Decimal::ZERO, true).unwrap();
        assert_eq!(p.base_reserve(), dec!(100));
        assert!(quote > Decimal::ZERO);
    }

    #[test]
    fn limits_are_enforced() {
        let mut p = pool(dec!(1000), dec!(100));
        assert!(matches!(
            p.swap_quote_for_base(Direction::AddToPool, dec!(200), Decimal::ZERO, true),
            Err(PricingError::OverTradingLimit { .. })
        ));
        assert!(matches!(
            p.swap_quote_for_base(Direction::AddToPool, dec!(50), dec!(5), true),
            Err(PricingError::BaseLimitExceeded { .. })
        ));
        assert!(matches!(
            p.swap_quote_for_base(Direction::RemoveFromPool, dec!(50), dec!(5), true),
            Err(PricingError::BaseLimitExceeded { .. })
        ));
        // nothing committed
        assert_eq!(p.quote_reserve(), dec!(1000));
    }

    #[test]
    fn fluctuation_limit_within_block() {
        let mut config = VpoolConfig::default();
        config.fluctuation_limit_ratio = dec!(0.05);
        let mut p = Vpool::new("ubtc:unusd".parse().unwrap(), dec!(1000), dec!(100), config, &block(1, 0)).unwrap();

        // +5% quote moves the price by ~10%
        assert!(matches!(
            p.swap_quote_for_base(Direction::AddToPool, dec!(50), Decimal::ZERO, false),
            Err(PricingError::OverFluctuationLimit { .. })
        ));
        assert!(p.swap_quote_for_base(Direction::AddToPool, dec!(50), Decimal::ZERO, true).is_ok());
    }

    #[test]
    fn twap_weights_by_time() {
        let mut p = pool(dec!(1000), dec!(100));
        p.begin_block(&block(2, 1000));
        p.swap_base_for_quote(Direction::RemoveFromPool, dec!(100) - dec!(1000) / dec!(11), Decimal::ZERO, true)
            .unwrap();
        p.begin_block(&block(3, 2000));

        // price 10 for 1s, then 12.1 for 1s
        let twap = p.mark_price_twap(10_000).unwrap();
        assert_eq!(twap.round_dp(6), dec!(11.05));

        // window only covers the last second
        assert_eq!(p.mark_price_twap(1000).unwrap().round_dp(6), dec!(12.1));
    }

    #[test]
    fn twap_without_elapsed_time_is_spot() {
        let p = pool(dec!(1000), dec!(100));
        assert_eq!(p.mark_price_twap(1000).unwrap(), dec!(10));
        assert_eq!(
            p.base_asset_twap(Direction::AddToPool, dec!(10), 1000).unwrap(),
            p.base_asset_price(Direction::AddToPool, dec!(10)).unwrap()
        );
    }

    #[test]
    fn deactivated_pool_settles() {
        let mut set = VpoolSet::new();
        let pair: Pair = "ubtc:unusd".parse().unwrap();
        set.add_pool(pool(dec!(1000), dec!(100)));

        assert_eq!(set.settlement_price(&pair), Err(PricingError::PoolEnabled(pair.clone())));
        assert_eq!(set.deactivate(&pair), Ok(dec!(10)));
        assert_eq!(set.settlement_price(&pair), Ok(dec!(10)));
        assert_eq!(
            set.swap_quote_for_base(&pair, Direction::AddToPool, dec!(1), Decimal::ZERO, false),
            Err(PricingError::PoolDisabled(pair.clone()))
        );
        assert!(!set.exists_pool(&"ueth:unusd".parse().unwrap()));
    }
}
