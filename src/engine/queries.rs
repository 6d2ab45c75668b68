//! Read-only position queries.

use super::core::Engine;
use super::results::{EngineError, PositionInfo};
use crate::keepers::{Bank, Oracle, PricingEngine};
use crate::position::{MarginRatioBasis, PnlCalcOption, PnlPreference};
use crate::types::{Address, Pair};

impl<V, O, B> Engine<V, O, B>
where
    V: PricingEngine + Clone,
    O: Oracle,
    B: Bank + Clone,
{
    /// Position valued at spot, with its margin ratio at mark and, when the
    /// oracle has a price, at index.
    pub fn query_position(&self, pair: &Pair, trader: &Address) -> Result<PositionInfo, EngineError> {
        self.require_pair(pair)?;
        let position = self.require_position(pair, trader)?;
        if position.is_empty() {
            return Err(EngineError::PositionZero);
        }

        let valuation = self.position_notional_and_unrealized_pnl(&position, PnlCalcOption::Spot)?;
        let margin_ratio_mark = self.margin_ratio(&position, MarginRatioBasis::Preference(PnlPreference::Max))?;
        let margin_ratio_index = self
            .margin_ratio(&position, MarginRatioBasis::Price(PnlCalcOption::Oracle))
            .ok();

        Ok(PositionInfo {
            position,
            position_notional: valuation.position_notional,
            unrealized_pnl: valuation.unrealized_pnl,
            margin_ratio_mark,
            margin_ratio_index,
            block_number: self.block.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::{pair, scripted_engine};
    use crate::engine::EngineError;
    use crate::position::Position;
    use crate::types::Address;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn query_open_position() {
        let mut engine = scripted_engine();
        let trader = Address::new("alice");
        engine.state.positions.set(Position {
            pair: pair(),
            trader_address: trader.clone(),
            size: dec!(-10),
            margin: dec!(20),
            open_notional: dec!(100),
            latest_cumulative_premium_fraction: Decimal::ZERO,
            block_number: 1,
        });
        engine.vpool_mut().spot_notional = dec!(90);
        engine.vpool_mut().twap_notional = dec!(110);
        engine.oracle_mut().price = dec!(12);
        engine.advance_block(5_000);

        let info = engine.query_position(&pair(), &trader).unwrap();
        assert_eq!(info.position_notional, dec!(90));
        assert_eq!(info.unrealized_pnl, dec!(10));
        // max pnl is the spot valuation: 30 / 90
        assert_eq!(info.margin_ratio_mark, dec!(30) / dec!(90));
        // index 12 * 10 = 120: (20 - 20) / 120
        assert_eq!(info.margin_ratio_index, Some(Decimal::ZERO));
        assert_eq!(info.block_number, 2);
    }

    #[test]
    fn query_cleared_position() {
        let mut engine = scripted_engine();
        let trader = Address::new("alice");
        assert!(matches!(
            engine.query_position(&pair(), &trader),
            Err(EngineError::PositionNotFound { .. })
        ));

        engine.state.positions.clear(&pair(), &trader, Decimal::ZERO, 1);
        assert_eq!(engine.query_position(&pair(), &trader), Err(EngineError::PositionZero));
    }
}
