// 2.0: trading fees. toll goes to the fee pool, spread to the ecosystem fund.
// both are charged on exchanged notional and cut down to whole quote units.

use crate::config::Params;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxFee {
    pub toll: Decimal,
    pub spread: Decimal,
}

impl TxFee {
    pub fn zero() -> Self {
        Self {
            toll: Decimal::ZERO,
            spread: Decimal::ZERO,
        }
    }

    pub fn total(&self) -> Decimal {
        self.toll + self.spread
    }
}

pub fn calc_fee(notional: Decimal, params: &Params) -> TxFee {
    if notional.is_zero() {
        return TxFee::zero();
    }
    let notional = notional.abs();
    TxFee {
        toll: (notional * params.toll_ratio).trunc(),
        spread: (notional * params.spread_ratio).trunc(),
    }
}
