//! Position valuation and margin ratios against live pricing.

use super::core::Engine;
use super::results::EngineError;
use crate::keepers::{Bank, Oracle, PricingEngine};
use crate::margin::{calc_remain_margin, margin_ratio, MarginRemainder};
use crate::position::{MarginRatioBasis, NotionalAndPnl, PnlCalcOption, PnlPreference, Position};
use crate::types::Direction;
use rust_decimal::Decimal;

impl<V, O, B> Engine<V, O, B>
where
    V: PricingEngine + Clone,
    O: Oracle,
    B: Bank + Clone,
{
    /// Settles pending funding and `margin_delta` into the position's margin.
    pub fn calc_remain_margin_with_funding_payment(
        &self,
        position: &Position,
        margin_delta: Decimal,
    ) -> Result<MarginRemainder, EngineError> {
        let latest = self.cumulative_premium_fraction(&position.pair)?;
        Ok(calc_remain_margin(
            position.margin,
            position.size,
            position.latest_cumulative_premium_fraction,
            latest,
            margin_delta,
        ))
    }

    pub fn position_notional_and_unrealized_pnl(
        &self,
        position: &Position,
        option: PnlCalcOption,
    ) -> Result<NotionalAndPnl, EngineError> {
        if position.is_empty() {
            return Ok(NotionalAndPnl::zero());
        }

        let pair = &position.pair;
        let direction = Direction::closing_base(position.size);
        let base_amount = position.size.abs();

        let position_notional = match option {
            PnlCalcOption::Spot => self.vpool.base_asset_price(pair, direction, base_amount)?,
            PnlCalcOption::Twap => self.vpool.base_asset_twap(
                pair,
                direction,
                base_amount,
                self.params.twap_lookback_window_ms,
            )?,
            PnlCalcOption::Oracle => {
                let index_price = self.oracle.current_twap(pair.base_denom(), pair.quote_denom())?;
                index_price * base_amount
            }
        };

        Ok(NotionalAndPnl {
            position_notional,
            unrealized_pnl: position.unrealized_pnl(position_notional),
        })
    }

    /// Spot vs twap valuation, whichever gives the larger (Max) or smaller (Min) pnl.
    pub fn preference_position_notional_and_unrealized_pnl(
        &self,
        position: &Position,
        preference: PnlPreference,
    ) -> Result<NotionalAndPnl, EngineError> {
        let spot = self.position_notional_and_unrealized_pnl(position, PnlCalcOption::Spot)?;
        let twap = self.position_notional_and_unrealized_pnl(position, PnlCalcOption::Twap)?;
        Ok(spot.prefer(twap, preference))
    }

    pub fn margin_ratio(&self, position: &Position, basis: MarginRatioBasis) -> Result<Decimal, EngineError> {
        if position.is_empty() {
            return Err(EngineError::PositionZero);
        }

        let valuation = match basis {
            MarginRatioBasis::Price(option) => self.position_notional_and_unrealized_pnl(position, option)?,
            MarginRatioBasis::Preference(preference) => {
                self.preference_position_notional_and_unrealized_pnl(position, preference)?
            }
        };

        let remainder = self.calc_remain_margin_with_funding_payment(position, valuation.unrealized_pnl)?;
        Ok(margin_ratio(&remainder, valuation.position_notional))
    }
}
