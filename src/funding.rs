// 5.0: funding. once per funding epoch each pair's mark/index gap becomes a premium
// fraction, added onto the pair's cumulative series. longs pay shorts when mark > index.
// 5.1 premium fraction, 5.2 rate.

use crate::types::DAY_MS;
use rust_decimal::Decimal;

// 5.1: the gap spread over the day's epochs
pub fn premium_fraction(mark_price: Decimal, index_price: Decimal, epoch_duration_ms: i64) -> Decimal {
    let intervals = intervals_per_day(epoch_duration_ms);
    if intervals.is_zero() {
        return Decimal::ZERO;
    }
    (mark_price - index_price) / intervals
}

// 5.2: per epoch rate, relative to the index
pub fn funding_rate(premium_fraction: Decimal, index_price: Decimal) -> Decimal {
    if index_price.is_zero() {
        return Decimal::ZERO;
    }
    premium_fraction / index_price
}

/// Epochs per day, e.g. 48 for a 30 minute epoch.
pub fn intervals_per_day(epoch_duration_ms: i64) -> Decimal {
    if epoch_duration_ms <= 0 {
        return Decimal::ZERO;
    }
    Decimal::from(DAY_MS) / Decimal::from(epoch_duration_ms)
}
