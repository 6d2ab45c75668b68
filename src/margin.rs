//! Margin and funding arithmetic.
//!
//! Every touch of a position settles pending funding into its margin. The
//! result is split into a non-negative remaining margin and a non-negative
//! bad debt, never both, so negative margin is never written back.
//!
//! Funding owed since the last touch is the change in the pair's cumulative
//! premium fraction times the signed size. A positive payment is owed by the
//! holder.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginRemainder {
    pub margin: Decimal,
    pub bad_debt: Decimal,
    pub funding_payment: Decimal,
    pub latest_cumulative_premium_fraction: Decimal,
}

impl MarginRemainder {
    /// margin - bad debt, i.e. the signed remaining margin.
    pub fn signed_margin(&self) -> Decimal {
        self.margin - self.bad_debt
    }
}

pub fn funding_payment(
    size: Decimal,
    position_premium_fraction: Decimal,
    latest_premium_fraction: Decimal,
) -> Decimal {
    if size.is_zero() {
        return Decimal::ZERO;
    }
    (latest_premium_fraction - position_premium_fraction) * size
}

/// Applies `margin_delta` and pending funding to `margin`.
pub fn calc_remain_margin(
    margin: Decimal,
    size: Decimal,
    position_premium_fraction: Decimal,
    latest_premium_fraction: Decimal,
    margin_delta: Decimal,
) -> MarginRemainder {
    let funding_payment = funding_payment(size, position_premium_fraction, latest_premium_fraction);
    let signed_remain_margin = margin_delta - funding_payment + margin;

    let (margin, bad_debt) = if signed_remain_margin < Decimal::ZERO {
        (Decimal::ZERO, signed_remain_margin.abs())
    } else {
        (signed_remain_margin, Decimal::ZERO)
    };

    MarginRemainder {
        margin,
        bad_debt,
        funding_payment,
        latest_cumulative_premium_fraction: latest_premium_fraction,
    }
}

pub fn margin_ratio(remainder: &MarginRemainder, position_notional: Decimal) -> Decimal {
    if position_notional.is_zero() {
        return Decimal::MAX;
    }
    remainder.signed_margin() / position_notional
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("margin ratio {ratio} does not meet the required {threshold}")]
pub struct MarginRatioTooLow {
    pub ratio: Decimal,
    pub threshold: Decimal,
}

pub fn require_more_margin_ratio(
    ratio: Decimal,
    threshold: Decimal,
    or_equal: bool,
) -> Result<(), MarginRatioTooLow> {
    let diff = ratio - threshold;
    let ok = if or_equal {
        diff >= Decimal::ZERO
    } else {
        diff > Decimal::ZERO
    };
    if ok {
        Ok(())
    } else {
        Err(MarginRatioTooLow { ratio, threshold })
    }
}

/// Collateral a trader may pull out of a position without dropping below
/// maintenance, valued with the trader-unfavourable pnl.
pub fn free_collateral(
    margin: Decimal,
    unrealized_pnl: Decimal,
    position_notional: Decimal,
    maintenance_margin_ratio: Decimal,
) -> Decimal {
    let usable = margin.min(margin + unrealized_pnl);
    usable - position_notional * maintenance_margin_ratio
}
