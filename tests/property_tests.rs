//! Property-based tests for the core math.
//!
//! These tests verify invariants hold under random inputs.

use perp_clearinghouse::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// Strategies for generating test data
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|x| Decimal::new(x, 2)) // 0.01 to 1,000,000
}

fn size_strategy() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..=1_000_000i64).prop_map(|x| Decimal::new(x, 3)) // -1000 to 1000
}

fn premium_strategy() -> impl Strategy<Value = Decimal> {
    (-10_000i64..=10_000i64).prop_map(|x| Decimal::new(x, 6)) // -0.01 to 0.01
}

fn reserve_strategy() -> impl Strategy<Value = Decimal> {
    (1_000i64..1_000_000_000i64).prop_map(Decimal::from)
}

fn pool(quote: Decimal, base: Decimal) -> Vpool {
    let block = BlockContext::new(1, Timestamp::from_millis(0));
    Vpool::new("ubtc:unusd".parse().unwrap(), quote, base, VpoolConfig::default(), &block).unwrap()
}

proptest! {
    /// Fees are whole units and never exceed their ratio of the notional
    #[test]
    fn fees_truncate_down(notional in amount_strategy()) {
        let params = Params::default();
        let fee = calc_fee(notional, &params);

        prop_assert!(fee.toll.fract().is_zero());
        prop_assert!(fee.spread.fract().is_zero());
        prop_assert!(fee.toll <= notional * params.toll_ratio);
        prop_assert!(notional * params.toll_ratio - fee.toll < Decimal::ONE);
        prop_assert_eq!(calc_fee(-notional, &params), fee);
    }

    /// Remaining margin and bad debt are never both positive, and their
    /// difference is the signed margin after funding
    #[test]
    fn remain_margin_splits_sign(
        margin in amount_strategy(),
        size in size_strategy(),
        position_pf in premium_strategy(),
        latest_pf in premium_strategy(),
        delta in size_strategy(),
    ) {
        let remainder = calc_remain_margin(margin, size, position_pf, latest_pf, delta);

        prop_assert!(remainder.margin >= Decimal::ZERO);
        prop_assert!(remainder.bad_debt >= Decimal::ZERO);
        prop_assert!(remainder.margin.is_zero() || remainder.bad_debt.is_zero());
        prop_assert_eq!(remainder.signed_margin(), delta - remainder.funding_payment + margin);
        prop_assert_eq!(remainder.latest_cumulative_premium_fraction, latest_pf);
    }

    /// Longs pay when the premium fraction rises, shorts receive it
    #[test]
    fn funding_payment_sign(
        size in size_strategy(),
        rise in (1i64..10_000i64).prop_map(|x| Decimal::new(x, 6)),
    ) {
        let payment = funding_payment(size, Decimal::ZERO, rise);
        if size > Decimal::ZERO {
            prop_assert!(payment > Decimal::ZERO);
        } else if size < Decimal::ZERO {
            prop_assert!(payment < Decimal::ZERO);
        } else {
            prop_assert_eq!(payment, Decimal::ZERO);
        }
    }

    /// Premium has the sign of mark - index and scales with the epoch length
    #[test]
    fn premium_tracks_gap(
        mark in amount_strategy(),
        index in amount_strategy(),
    ) {
        let day = premium_fraction(mark, index, DAY_MS);
        prop_assert_eq!(day, mark - index);

        let half_hour = premium_fraction(mark, index, DAY_MS / 48);
        prop_assert_eq!(half_hour.is_sign_negative() && !half_hour.is_zero(), mark < index);
        prop_assert!(half_hour.abs() <= day.abs());
    }

    /// Pnl is mirrored between a long and a short of the same notional
    #[test]
    fn pnl_mirrors_between_sides(
        size in (1i64..1_000_000i64).prop_map(|x| Decimal::new(x, 3)),
        open_notional in amount_strategy(),
        position_notional in amount_strategy(),
    ) {
        let long = unrealized_pnl(size, open_notional, position_notional);
        let short = unrealized_pnl(-size, open_notional, position_notional);

        prop_assert_eq!(long, -short);
        prop_assert_eq!(long > Decimal::ZERO, position_notional > open_notional);
        prop_assert_eq!(unrealized_pnl(Decimal::ZERO, open_notional, position_notional), Decimal::ZERO);
    }

    /// Free collateral never exceeds the margin itself
    #[test]
    fn free_collateral_bounded_by_margin(
        margin in amount_strategy(),
        pnl in size_strategy(),
        notional in amount_strategy(),
    ) {
        let free = free_collateral(margin, pnl, notional, dec!(0.0625));
        prop_assert!(free <= margin);
        if pnl < Decimal::ZERO {
            prop_assert!(free <= margin + pnl);
        }
    }

    /// Buying base and selling it straight back returns the quote and the reserves
    #[test]
    fn swap_round_trip_restores_reserves(
        quote_reserve in reserve_strategy(),
        base_reserve in reserve_strategy(),
        share in 1i64..1000i64,
    ) {
        let mut p = pool(quote_reserve, base_reserve);
        let quote_in = quote_reserve * Decimal::new(share, 5); // at most 1% of the reserve

        let base_out = p.swap_quote_for_base(Direction::AddToPool, quote_in, Decimal::ZERO, true).unwrap();
        prop_assert!(base_out > Decimal::ZERO);
        prop_assert!(base_out < base_reserve);
        prop_assert!(p.spot_price() > quote_reserve / base_reserve);

        let quote_back = p.swap_base_for_quote(Direction::AddToPool, base_out, Decimal::ZERO, true).unwrap();
        prop_assert!((quote_back - quote_in).abs() < dec!(0.000001));
        prop_assert!((p.quote_reserve() - quote_reserve).abs() < dec!(0.000001));
        prop_assert!((p.base_reserve() - base_reserve).abs() < dec!(0.000001));
    }

    /// The constant product holds across swaps in either direction
    #[test]
    fn swaps_keep_constant_product(
        quote_reserve in reserve_strategy(),
        base_reserve in reserve_strategy(),
        share in 1i64..1000i64,
        long in any::<bool>(),
    ) {
        let mut p = pool(quote_reserve, base_reserve);
        let k = quote_reserve * base_reserve;
        let direction = if long { Direction::AddToPool } else { Direction::RemoveFromPool };

        p.swap_quote_for_base(direction, quote_reserve * Decimal::new(share, 5), Decimal::ZERO, true).unwrap();
        let drift = (p.quote_reserve() * p.base_reserve() - k).abs() / k;
        prop_assert!(drift < dec!(0.0000000001));
    }

    /// The margin floor is inclusive only when asked for
    #[test]
    fn margin_floor_inclusive(threshold in (1i64..1000i64).prop_map(|x| Decimal::new(x, 4))) {
        prop_assert!(require_more_margin_ratio(threshold, threshold, true).is_ok());
        prop_assert_eq!(
            require_more_margin_ratio(threshold, threshold, false),
            Err(MarginRatioTooLow { ratio: threshold, threshold })
        );
    }
}

#[test]
fn preference_picks_by_pnl() {
    let spot = NotionalAndPnl {
        position_notional: dec!(100),
        unrealized_pnl: dec!(5),
    };
    let twap = NotionalAndPnl {
        position_notional: dec!(90),
        unrealized_pnl: dec!(-5),
    };

    assert_eq!(spot.prefer(twap, PnlPreference::Max), spot);
    assert_eq!(spot.prefer(twap, PnlPreference::Min), twap);
    // ties keep the first
    assert_eq!(spot.prefer(spot, PnlPreference::Min), spot);
}

#[test]
fn intervals_for_common_epochs() {
    assert_eq!(intervals_per_day(DAY_MS / 48), dec!(48));
    assert_eq!(intervals_per_day(DAY_MS), Decimal::ONE);
    assert_eq!(intervals_per_day(0), Decimal::ZERO);
}
