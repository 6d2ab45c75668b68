//! Liquidation of positions below maintenance margin.

use super::core::Engine;
use super::results::{EngineError, LiquidationOutcome, LiquidationRequest, MultiLiquidationResult};
use crate::events::{EventPayload, PositionLiquidatedEvent};
use crate::keepers::{Bank, ModuleAccount, Oracle, PricingEngine};
use crate::margin::require_more_margin_ratio;
use crate::position::{LiquidateResp, MarginRatioBasis, PnlCalcOption, PnlPreference, Position};
use crate::types::{Address, Coin, Direction, Pair, Side};
use rust_decimal::Decimal;

impl<V, O, B> Engine<V, O, B>
where
    V: PricingEngine + Clone,
    O: Oracle,
    B: Bank + Clone,
{
    /// Liquidates the trader's position. partial when the spot margin ratio still
    /// covers the liquidation fee, full otherwise.
    pub fn liquidate(
        &mut self,
        liquidator: &Address,
        pair: &Pair,
        trader: &Address,
    ) -> Result<LiquidationOutcome, EngineError> {
        self.atomic(|engine| engine.execute_liquidation(liquidator, pair, trader))
    }

    /// Runs every request on its own. fails only if none succeeds.
    pub fn multi_liquidate(
        &mut self,
        liquidator: &Address,
        requests: &[LiquidationRequest],
    ) -> Result<Vec<MultiLiquidationResult>, EngineError> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let outcome = self.liquidate(liquidator, &request.pair, &request.trader);
            if let Err(err) = &outcome {
                tracing::debug!(pair = %request.pair, trader = %request.trader, error = %err, "liquidation skipped");
            }
            results.push(MultiLiquidationResult {
                request: request.clone(),
                outcome,
            });
        }

        if !results.is_empty() && results.iter().all(|r| r.outcome.is_err()) {
            return Err(EngineError::AllLiquidationsFailed);
        }
        Ok(results)
    }

    fn execute_liquidation(
        &mut self,
        liquidator: &Address,
        pair: &Pair,
        trader: &Address,
    ) -> Result<LiquidationOutcome, EngineError> {
        self.require_pair(pair)?;
        let position = self.require_position(pair, trader)?;

        let threshold = self.params.maintenance_margin_ratio;
        let ratio = self.margin_ratio(&position, MarginRatioBasis::Preference(PnlPreference::Min))?;
        if require_more_margin_ratio(ratio, threshold, true).is_ok() {
            return Err(EngineError::MarginHighEnough { ratio, threshold });
        }

        let spot_ratio = self.margin_ratio(&position, MarginRatioBasis::Price(PnlCalcOption::Spot))?;

        let (resp, partial) = if spot_ratio >= self.params.liquidation_fee_ratio {
            let checkpoint = self.checkpoint();
            match self.execute_partial_liquidation(liquidator, &position)? {
                Some(resp) => (resp, true),
                None => {
                    // fee does not fit in what the partial close leaves behind
                    self.restore(checkpoint);
                    (self.execute_full_liquidation(liquidator, &position)?, false)
                }
            }
        } else {
            (self.execute_full_liquidation(liquidator, &position)?, false)
        };

        let (fee_to_liquidator, fee_to_perp_ecosystem_fund) = self.distribute_liquidate_rewards(&resp)?;
        self.emit_position_liquidated(&position, &resp, &fee_to_liquidator, &fee_to_perp_ecosystem_fund)?;

        tracing::info!(
            %pair,
            %trader,
            %liquidator,
            partial,
            margin_ratio = %ratio,
            bad_debt = %resp.bad_debt,
            fee_to_liquidator = %fee_to_liquidator.amount,
            "position liquidated"
        );

        Ok(LiquidationOutcome {
            fee_to_liquidator,
            fee_to_perp_ecosystem_fund,
            bad_debt: resp.bad_debt,
            partial,
        })
    }

    // closes partial_liquidation_ratio of the size. None when the fee would eat the margin.
    fn execute_partial_liquidation(
        &mut self,
        liquidator: &Address,
        position: &Position,
    ) -> Result<Option<LiquidateResp>, EngineError> {
        let side = Side::of_size(position.size).ok_or(EngineError::PositionZero)?.opposite();
        let partial_base = position.size.abs() * self.params.partial_liquidation_ratio;
        let partial_notional = self.vpool.base_asset_price(
            &position.pair,
            Direction::closing_base(position.size),
            partial_base,
        )?;

        let mut resp = self.open_reverse_position(
            position.clone(),
            side,
            partial_notional,
            Decimal::ONE,
            Decimal::ZERO,
            true,
        )?;

        let fee = resp.exchanged_notional_value * self.params.liquidation_fee_ratio;
        if resp.position.is_empty() || fee >= resp.position.margin {
            return Ok(None);
        }

        resp.position.margin -= fee;
        self.state.positions.set(resp.position.clone());

        let fee_to_liquidator = fee / Decimal::TWO;
        Ok(Some(LiquidateResp {
            bad_debt: Decimal::ZERO,
            fee_to_liquidator,
            fee_to_perp_ecosystem_fund: fee - fee_to_liquidator,
            liquidator: liquidator.clone(),
            position_resp: resp,
        }))
    }

    fn execute_full_liquidation(
        &mut self,
        liquidator: &Address,
        position: &Position,
    ) -> Result<LiquidateResp, EngineError> {
        let resp = self.close_position_entirely(position.clone(), Decimal::ZERO, true)?;
        let denom = position.pair.quote_denom();

        let remain_margin = resp.margin_to_vault.abs();
        let fee = resp.exchanged_notional_value * self.params.liquidation_fee_ratio;
        let fee_to_liquidator = fee / Decimal::TWO;

        let mut bad_debt = resp.bad_debt;
        if fee > remain_margin {
            bad_debt += fee - remain_margin;
        } else {
            let refund = (remain_margin - fee).round();
            self.withdraw_from_vault(denom, &position.trader_address, refund)?;
        }

        if bad_debt > Decimal::ZERO {
            self.settle_bad_debt(denom, bad_debt.round())?;
        }

        Ok(LiquidateResp {
            bad_debt,
            fee_to_liquidator,
            fee_to_perp_ecosystem_fund: fee - fee_to_liquidator,
            liquidator: liquidator.clone(),
            position_resp: resp,
        })
    }

    /// vault pays the ecosystem fund its share, the fund pays the liquidator.
    pub(super) fn distribute_liquidate_rewards(
        &mut self,
        resp: &LiquidateResp,
    ) -> Result<(Coin, Coin), EngineError> {
        resp.validate().map_err(EngineError::InvalidLiquidateResp)?;

        let pair = &resp.position_resp.position.pair;
        if !self.vpool.exists_pool(pair) {
            return Err(EngineError::PairNotFound(pair.clone()));
        }
        let denom = pair.quote_denom();

        let fee_to_ef = Coin::new(denom, resp.fee_to_perp_ecosystem_fund.round());
        if fee_to_ef.is_positive() {
            self.transfer_between_modules(ModuleAccount::Vault, ModuleAccount::PerpEcosystemFund, fee_to_ef.clone())?;
        }

        let fee_to_liquidator = Coin::new(denom, resp.fee_to_liquidator.round());
        if fee_to_liquidator.is_positive() {
            self.transfer_to_account(ModuleAccount::PerpEcosystemFund, &resp.liquidator, fee_to_liquidator.clone())?;
        }

        Ok((fee_to_liquidator, fee_to_ef))
    }

    fn emit_position_liquidated(
        &mut self,
        liquidated: &Position,
        resp: &LiquidateResp,
        fee_to_liquidator: &Coin,
        fee_to_ecosystem_fund: &Coin,
    ) -> Result<(), EngineError> {
        let mark_price = self.vpool.mark_price(&liquidated.pair)?;
        let after = &resp.position_resp;

        self.emit_event(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
            pair: liquidated.pair.clone(),
            trader_address: liquidated.trader_address.clone(),
            exchanged_quote_amount: after.exchanged_notional_value,
            exchanged_position_size: after.exchanged_position_size,
            liquidator_address: resp.liquidator.clone(),
            fee_to_liquidator: fee_to_liquidator.clone(),
            fee_to_ecosystem_fund: fee_to_ecosystem_fund.clone(),
            bad_debt: resp.bad_debt,
            margin: after.position.margin,
            position_notional: after.position_notional,
            position_size: after.position.size,
            unrealized_pnl: after.unrealized_pnl_after,
            mark_price,
            block_height: self.block.height,
            block_time_ms: self.block.time.as_millis(),
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::{pair, scripted_engine, ScriptedEngine};
    use crate::engine::{EngineError, LiquidationRequest};
    use crate::events::EventPayload;
    use crate::keepers::{Bank, ModuleAccount};
    use crate::position::{LiquidateResp, Position, PositionResp};
    use crate::types::{Address, Coin};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const DENOM: &str = "unusd";

    fn alice() -> Address {
        Address::new("alice")
    }

    fn keeper() -> Address {
        Address::new("keeper")
    }

    fn seed_long(engine: &mut ScriptedEngine, margin: Decimal) {
        engine.state.positions.set(Position {
            pair: pair(),
            trader_address: alice(),
            size: dec!(10000),
            margin,
            open_notional: dec!(10000),
            latest_cumulative_premium_fraction: Decimal::ZERO,
            block_number: 1,
        });
        engine.state.pair_metadata.get_mut(&pair()).unwrap().open_interest_notional = dec!(10000);
    }

    fn price_at(engine: &mut ScriptedEngine, spot: Decimal, twap: Decimal) {
        engine.vpool_mut().spot_notional = spot;
        engine.vpool_mut().twap_notional = twap;
    }

    #[test]
    fn healthy_position_cannot_be_liquidated() {
        let mut engine = scripted_engine();
        seed_long(&mut engine, dec!(1000));
        price_at(&mut engine, dec!(10000), dec!(10000));

        let err = engine.liquidate(&keeper(), &pair(), &alice()).unwrap_err();
        assert_eq!(
            err,
            EngineError::MarginHighEnough {
                ratio: dec!(0.1),
                threshold: dec!(0.0625)
            }
        );
    }

    #[test]
    fn partial_liquidation_closes_a_quarter() {
        let mut engine = scripted_engine();
        seed_long(&mut engine, dec!(1000));
        engine.bank_mut().mint_module(ModuleAccount::Vault, DENOM, dec!(1000));
        // margin ratio 500 / 9500 sits between the fee ratio and maintenance
        price_at(&mut engine, dec!(9500), dec!(9500));
        engine.vpool_mut().size_quotes.insert(dec!(2500), dec!(2400));
        engine.vpool_mut().swap_base_out = dec!(2500);

        let outcome = engine.liquidate(&keeper(), &pair(), &alice()).unwrap();
        assert!(outcome.partial);
        assert_eq!(outcome.fee_to_liquidator, Coin::new(DENOM, dec!(30)));
        assert_eq!(outcome.fee_to_perp_ecosystem_fund, Coin::new(DENOM, dec!(30)));
        assert_eq!(outcome.bad_debt, Decimal::ZERO);

        let position = engine.position(&pair(), &alice()).unwrap();
        assert_eq!(position.size, dec!(7500));
        // 1000 - 125 realized - 60 fee
        assert_eq!(position.margin, dec!(815));
        assert_eq!(position.open_notional, dec!(7475));

        assert_eq!(engine.bank().balance(&keeper(), DENOM), dec!(30));
        assert_eq!(engine.bank().module_balance(ModuleAccount::Vault, DENOM), dec!(970));
        assert_eq!(engine.bank().module_balance(ModuleAccount::PerpEcosystemFund, DENOM), Decimal::ZERO);
    }

    #[test]
    fn full_liquidation_books_uncovered_fee_as_bad_debt() {
        let mut engine = scripted_engine();
        seed_long(&mut engine, dec!(1000));
        engine.bank_mut().mint_module(ModuleAccount::Vault, DENOM, dec!(1000));
        engine.bank_mut().mint_module(ModuleAccount::PerpEcosystemFund, DENOM, dec!(100));
        // 200 / 9200 is below the fee ratio
        price_at(&mut engine, dec!(9200), dec!(9200));
        engine.vpool_mut().swap_quote_out = dec!(9200);

        let outcome = engine.liquidate(&keeper(), &pair(), &alice()).unwrap();
        assert!(!outcome.partial);
        // fee 230 against 200 of margin
        assert_eq!(outcome.bad_debt, dec!(30));
        assert_eq!(outcome.fee_to_liquidator, Coin::new(DENOM, dec!(115)));
        assert_eq!(outcome.fee_to_perp_ecosystem_fund, Coin::new(DENOM, dec!(115)));

        assert!(engine.position(&pair(), &alice()).unwrap().is_cleared());
        assert_eq!(engine.bank().balance(&alice(), DENOM), Decimal::ZERO);
        assert_eq!(engine.bank().balance(&keeper(), DENOM), dec!(115));
        assert_eq!(engine.bank().module_balance(ModuleAccount::Vault, DENOM), dec!(915));
        assert_eq!(engine.bank().module_balance(ModuleAccount::PerpEcosystemFund, DENOM), dec!(70));

        let liquidated = engine
            .events()
            .iter()
            .find_map(|e| match &e.payload {
                EventPayload::PositionLiquidated(ev) => Some(ev.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(liquidated.exchanged_quote_amount, dec!(9200));
        assert_eq!(liquidated.exchanged_position_size, dec!(-10000));
        assert_eq!(liquidated.liquidator_address, keeper());
    }

    #[test]
    fn partial_falls_back_to_full_when_fee_exceeds_margin() {
        let mut engine = scripted_engine();
        seed_long(&mut engine, dec!(10));
        engine.bank_mut().mint_module(ModuleAccount::Vault, DENOM, dec!(2000));
        // spot is generous, twap is not; funding leaves almost nothing after a partial close
        engine.set_cumulative_premium_fraction(&pair(), dec!(0.0505));
        price_at(&mut engine, dec!(12000), dec!(9000));
        engine.vpool_mut().size_quotes.insert(dec!(2500), dec!(3000));
        engine.vpool_mut().swap_base_out = dec!(2500);
        engine.vpool_mut().swap_quote_out = dec!(12000);

        let outcome = engine.liquidate(&keeper(), &pair(), &alice()).unwrap();
        assert!(!outcome.partial);
        assert_eq!(outcome.bad_debt, Decimal::ZERO);
        assert_eq!(outcome.fee_to_liquidator, Coin::new(DENOM, dec!(150)));

        // 10 + 2000 pnl - 505 funding - 300 fee
        assert_eq!(engine.bank().balance(&alice(), DENOM), dec!(1205));
        assert!(engine.position(&pair(), &alice()).unwrap().is_cleared());
        // the abandoned partial swap left no trace
        assert_eq!(engine.vpool().swaps.len(), 1);
    }

    #[test]
    fn multi_liquidate_reports_each_outcome() {
        let mut engine = scripted_engine();
        seed_long(&mut engine, dec!(1000));
        engine.bank_mut().mint_module(ModuleAccount::Vault, DENOM, dec!(1000));
        engine.bank_mut().mint_module(ModuleAccount::PerpEcosystemFund, DENOM, dec!(100));
        price_at(&mut engine, dec!(9200), dec!(9200));
        engine.vpool_mut().swap_quote_out = dec!(9200);

        let requests = vec![
            LiquidationRequest { pair: pair(), trader: Address::new("nobody") },
            LiquidationRequest { pair: pair(), trader: alice() },
        ];
        let results = engine.multi_liquidate(&keeper(), &requests).unwrap();
        assert!(matches!(results[0].outcome, Err(EngineError::PositionNotFound { .. })));
        assert!(results[1].outcome.is_ok());

        // alice is flat now, so a second batch has nothing to do
        assert_eq!(
            engine.multi_liquidate(&keeper(), &requests[1..]),
            Err(EngineError::AllLiquidationsFailed)
        );
    }

    #[test]
    fn rewards_require_a_complete_response() {
        let mut engine = scripted_engine();
        let resp = LiquidateResp {
            bad_debt: Decimal::ZERO,
            fee_to_liquidator: dec!(1),
            fee_to_perp_ecosystem_fund: dec!(1),
            liquidator: Address::new(""),
            position_resp: PositionResp::new(Position::zero(pair(), alice(), Decimal::ZERO, 1)),
        };
        assert!(matches!(
            engine.distribute_liquidate_rewards(&resp),
            Err(EngineError::InvalidLiquidateResp(_))
        ));

        let other = "ueth:unusd".parse().unwrap();
        let resp = LiquidateResp {
            liquidator: keeper(),
            position_resp: PositionResp::new(Position::zero(other, alice(), Decimal::ZERO, 1)),
            ..resp
        };
        assert!(matches!(
            engine.distribute_liquidate_rewards(&resp),
            Err(EngineError::PairNotFound(_))
        ));
    }
}
