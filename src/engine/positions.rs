//! Position lifecycle: open, increase, reduce, reverse, close, margin changes and settlement.

use super::core::Engine;
use super::results::{EngineError, MarginChangeResult, TradeResult};
use crate::events::{EventPayload, PositionChangedEvent, PositionSettledEvent};
use crate::fees::{calc_fee, TxFee};
use crate::keepers::{Bank, ModuleAccount, Oracle, PricingEngine, PricingError};
use crate::margin::{free_collateral, require_more_margin_ratio};
use crate::position::{MarginRatioBasis, PnlCalcOption, PnlPreference, Position, PositionResp};
use crate::types::{Address, Coin, Direction, Pair, Side};
use rust_decimal::Decimal;

impl<V, O, B> Engine<V, O, B>
where
    V: PricingEngine + Clone,
    O: Oracle,
    B: Bank + Clone,
{
    /// Opens, grows, shrinks or flips the trader's position by `quote_amount × leverage`
    /// of notional. `base_amount_limit` of zero disables the slippage bound.
    pub fn open_position(
        &mut self,
        pair: &Pair,
        side: Side,
        trader: &Address,
        quote_amount: Decimal,
        leverage: Decimal,
        base_amount_limit: Decimal,
    ) -> TradeResult {
        self.atomic(|engine| {
            engine.execute_open_position(pair, side, trader, quote_amount, leverage, base_amount_limit)
        })
    }

    fn execute_open_position(
        &mut self,
        pair: &Pair,
        side: Side,
        trader: &Address,
        quote_amount: Decimal,
        leverage: Decimal,
        base_amount_limit: Decimal,
    ) -> TradeResult {
        if quote_amount <= Decimal::ZERO {
            return Err(EngineError::QuoteAmountIsZero);
        }
        if leverage <= Decimal::ZERO {
            return Err(EngineError::LeverageIsZero);
        }
        self.require_pair(pair)?;
        let max_leverage = self.vpool.max_leverage(pair)?;
        if leverage > max_leverage {
            return Err(EngineError::LeverageIsTooHigh {
                leverage,
                max: max_leverage,
            });
        }

        let position = match self.state.positions.get(pair, trader) {
            Some(position) => position.clone(),
            None => Position::zero(
                pair.clone(),
                trader.clone(),
                self.cumulative_premium_fraction(pair)?,
                self.block.height,
            ),
        };

        let resp = match position.side() {
            Some(current) if current != side => {
                self.open_reverse_position(position, side, quote_amount, leverage, base_amount_limit, false)?
            }
            _ => self.increase_position(position, side, quote_amount * leverage, base_amount_limit, leverage)?,
        };

        self.after_position_update(&resp)?;

        tracing::debug!(
            %pair,
            %trader,
            size = %resp.position.size,
            exchanged_notional = %resp.exchanged_notional_value,
            "position opened"
        );
        Ok(resp)
    }

    // persists the transition, re-checks margin and settles funds with the trader
    fn after_position_update(&mut self, resp: &PositionResp) -> Result<(), EngineError> {
        let position = &resp.position;
        self.state.positions.set(position.clone());

        if !position.is_empty() {
            let ratio = self.margin_ratio(position, MarginRatioBasis::Preference(PnlPreference::Max))?;
            require_more_margin_ratio(ratio, self.params.maintenance_margin_ratio, true)?;
        }

        if !resp.bad_debt.is_zero() {
            return Err(EngineError::BadDebtOnOpen(resp.bad_debt));
        }

        let denom = position.pair.quote_denom().to_string();
        let margin_to_vault = resp.margin_to_vault.round();
        if margin_to_vault > Decimal::ZERO {
            self.transfer_to_module(
                &position.trader_address,
                ModuleAccount::Vault,
                Coin::new(denom.clone(), margin_to_vault),
            )?;
        } else if margin_to_vault < Decimal::ZERO {
            self.withdraw_from_vault(&denom, &position.trader_address, margin_to_vault.abs())?;
        }

        let fee = self.transfer_fee(&position.pair, &position.trader_address, resp.exchanged_notional_value)?;
        self.emit_position_changed(resp, fee)
    }

    pub(super) fn increase_position(
        &mut self,
        position: Position,
        side: Side,
        open_notional: Decimal,
        base_amount_limit: Decimal,
        leverage: Decimal,
    ) -> TradeResult {
        let pair = position.pair.clone();
        let base_amount = self.vpool.swap_quote_for_base(
            &pair,
            side.quote_direction(),
            open_notional,
            base_amount_limit,
            false,
        )?;
        let exchanged_position_size = base_amount * side.sign();

        self.increase_open_interest(&pair, &position.trader_address, open_notional)?;

        let margin_to_vault = open_notional / leverage;
        let remainder = self.calc_remain_margin_with_funding_payment(&position, margin_to_vault)?;

        let mut updated = position;
        updated.size += exchanged_position_size;
        updated.margin = remainder.margin;
        updated.open_notional += open_notional;
        updated.latest_cumulative_premium_fraction = remainder.latest_cumulative_premium_fraction;
        updated.touch(&self.block);

        let valuation = self.position_notional_and_unrealized_pnl(&updated, PnlCalcOption::Spot)?;

        Ok(PositionResp {
            position: updated,
            exchanged_notional_value: open_notional,
            exchanged_position_size,
            bad_debt: remainder.bad_debt,
            funding_payment: remainder.funding_payment,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl_after: valuation.unrealized_pnl,
            margin_to_vault,
            position_notional: valuation.position_notional,
        })
    }

    /// Partial close of `reduced_notional` worth of quote. `side` is the trade side,
    /// opposite to the position.
    pub(super) fn reduce_position(
        &mut self,
        position: Position,
        side: Side,
        reduced_notional: Decimal,
        base_amount_limit: Decimal,
        skip_fluctuation_check: bool,
    ) -> TradeResult {
        if position.is_empty() {
            return Err(EngineError::PositionZero);
        }

        let pair = position.pair.clone();
        let current = self.position_notional_and_unrealized_pnl(&position, PnlCalcOption::Spot)?;

        let base_amount = self.vpool.swap_quote_for_base(
            &pair,
            side.quote_direction(),
            reduced_notional,
            base_amount_limit,
            skip_fluctuation_check,
        )?;
        let exchanged_position_size = base_amount * side.sign();

        let realized_pnl = current.unrealized_pnl * exchanged_position_size.abs() / position.size.abs();
        let remainder = self.calc_remain_margin_with_funding_payment(&position, realized_pnl)?;
        let unrealized_pnl_after = current.unrealized_pnl - realized_pnl;

        let remain_open_notional = if position.size > Decimal::ZERO {
            current.position_notional - reduced_notional - unrealized_pnl_after
        } else {
            unrealized_pnl_after + current.position_notional - reduced_notional
        };
        if remain_open_notional <= Decimal::ZERO {
            return Err(EngineError::NonPositiveOpenNotional(remain_open_notional));
        }

        self.reduce_open_interest(&pair, position.open_notional - remain_open_notional);

        let mut updated = position;
        updated.size += exchanged_position_size;
        updated.margin = remainder.margin;
        updated.open_notional = remain_open_notional;
        updated.latest_cumulative_premium_fraction = remainder.latest_cumulative_premium_fraction;
        updated.touch(&self.block);

        Ok(PositionResp {
            position: updated,
            exchanged_notional_value: reduced_notional,
            exchanged_position_size,
            bad_debt: remainder.bad_debt,
            funding_payment: remainder.funding_payment,
            realized_pnl,
            unrealized_pnl_after,
            margin_to_vault: Decimal::ZERO,
            position_notional: current.position_notional - reduced_notional,
        })
    }

    pub(super) fn open_reverse_position(
        &mut self,
        position: Position,
        side: Side,
        quote_amount: Decimal,
        leverage: Decimal,
        base_amount_limit: Decimal,
        skip_fluctuation_check: bool,
    ) -> TradeResult {
        let notional = quote_amount * leverage;
        let current = self.position_notional_and_unrealized_pnl(&position, PnlCalcOption::Spot)?;

        if current.position_notional > notional {
            self.reduce_position(position, side, notional, base_amount_limit, skip_fluctuation_check)
        } else {
            self.close_and_open_reverse_position(
                position,
                side,
                quote_amount,
                leverage,
                base_amount_limit,
                skip_fluctuation_check,
            )
        }
    }

    fn close_and_open_reverse_position(
        &mut self,
        position: Position,
        side: Side,
        quote_amount: Decimal,
        leverage: Decimal,
        base_amount_limit: Decimal,
        skip_fluctuation_check: bool,
    ) -> TradeResult {
        let close = self.close_position_entirely(position, Decimal::ZERO, skip_fluctuation_check)?;
        if close.bad_debt > Decimal::ZERO {
            return Err(EngineError::UnderwaterPosition {
                bad_debt: close.bad_debt,
            });
        }

        let remaining_notional = quote_amount * leverage - close.exchanged_notional_value;
        if remaining_notional / leverage <= Decimal::ZERO {
            return Ok(close);
        }

        // the close already consumed part of the slippage budget. zero means
        // unbounded, so a spent budget must fail rather than reach the pool as zero.
        let base_amount_limit = if base_amount_limit > Decimal::ZERO {
            let left = base_amount_limit - close.exchanged_position_size.abs();
            if left <= Decimal::ZERO {
                return Err(PricingError::BaseLimitExceeded {
                    amount: close.exchanged_position_size.abs(),
                    limit: base_amount_limit,
                }
                .into());
            }
            left
        } else {
            Decimal::ZERO
        };

        let reopen = self.increase_position(
            close.position.clone(),
            side,
            remaining_notional,
            base_amount_limit,
            leverage,
        )?;
        Ok(close.followed_by(reopen))
    }

    /// Swaps the whole position back into the pool and stores the cleared state.
    pub(super) fn close_position_entirely(
        &mut self,
        position: Position,
        quote_amount_limit: Decimal,
        skip_fluctuation_check: bool,
    ) -> TradeResult {
        if position.is_empty() {
            return Err(EngineError::PositionZero);
        }

        let pair = position.pair.clone();
        let current = self.position_notional_and_unrealized_pnl(&position, PnlCalcOption::Spot)?;
        let remainder = self.calc_remain_margin_with_funding_payment(&position, current.unrealized_pnl)?;

        let exchanged_notional_value = self.vpool.swap_base_for_quote(
            &pair,
            Direction::closing_base(position.size),
            position.size.abs(),
            quote_amount_limit,
            skip_fluctuation_check,
        )?;

        self.reduce_open_interest(&pair, position.open_notional);

        let cleared = Position::zero(
            pair,
            position.trader_address.clone(),
            remainder.latest_cumulative_premium_fraction,
            self.block.height,
        );
        self.state.positions.set(cleared.clone());

        Ok(PositionResp {
            position: cleared,
            exchanged_notional_value,
            exchanged_position_size: -position.size,
            bad_debt: remainder.bad_debt,
            funding_payment: remainder.funding_payment,
            realized_pnl: current.unrealized_pnl,
            unrealized_pnl_after: Decimal::ZERO,
            margin_to_vault: -remainder.margin,
            position_notional: Decimal::ZERO,
        })
    }

    /// Closes the trader's whole position. bad debt is realized, leftover margin paid out.
    pub fn close_position(&mut self, pair: &Pair, trader: &Address) -> TradeResult {
        self.atomic(|engine| {
            engine.require_pair(pair)?;
            let position = engine.require_position(pair, trader)?;
            let resp = engine.close_position_entirely(position, Decimal::ZERO, false)?;

            let denom = pair.quote_denom();
            if resp.bad_debt > Decimal::ZERO {
                engine.settle_bad_debt(denom, resp.bad_debt.round())?;
            }

            let margin_to_vault = resp.margin_to_vault.round();
            if margin_to_vault < Decimal::ZERO {
                engine.withdraw_from_vault(denom, trader, margin_to_vault.abs())?;
            }

            let fee = engine.transfer_fee(pair, trader, resp.exchanged_notional_value)?;
            engine.emit_position_changed(&resp, fee)?;

            tracing::debug!(%pair, %trader, realized_pnl = %resp.realized_pnl, "position closed");
            Ok(resp)
        })
    }

    pub fn add_margin(&mut self, pair: &Pair, trader: &Address, margin: Coin) -> Result<MarginChangeResult, EngineError> {
        self.atomic(|engine| {
            let mut position = engine.margin_position(pair, trader, &margin)?;

            let remainder = engine.calc_remain_margin_with_funding_payment(&position, margin.amount)?;
            if remainder.bad_debt > Decimal::ZERO {
                return Err(EngineError::AddMarginWithBadDebt(remainder.bad_debt));
            }

            engine.transfer_to_module(trader, ModuleAccount::Vault, margin)?;

            position.margin = remainder.margin;
            position.latest_cumulative_premium_fraction = remainder.latest_cumulative_premium_fraction;
            position.touch(&engine.block);
            engine.state.positions.set(position.clone());

            engine.emit_margin_changed(&position, remainder.funding_payment)?;

            Ok(MarginChangeResult {
                position,
                funding_payment: remainder.funding_payment,
                margin_out: None,
            })
        })
    }

    pub fn remove_margin(
        &mut self,
        pair: &Pair,
        trader: &Address,
        margin: Coin,
    ) -> Result<MarginChangeResult, EngineError> {
        self.atomic(|engine| {
            let mut position = engine.margin_position(pair, trader, &margin)?;

            let remainder = engine.calc_remain_margin_with_funding_payment(&position, -margin.amount)?;
            if remainder.bad_debt > Decimal::ZERO {
                return Err(EngineError::RemoveMarginCausesBadDebt(remainder.bad_debt));
            }

            position.margin = remainder.margin;
            position.latest_cumulative_premium_fraction = remainder.latest_cumulative_premium_fraction;
            position.touch(&engine.block);

            let worst = engine.preference_position_notional_and_unrealized_pnl(&position, PnlPreference::Min)?;
            let free = free_collateral(
                position.margin,
                worst.unrealized_pnl,
                worst.position_notional,
                engine.params.maintenance_margin_ratio,
            );
            if free < Decimal::ZERO {
                return Err(EngineError::NotEnoughFreeCollateral(free));
            }

            engine.state.positions.set(position.clone());
            engine.withdraw_from_vault(&margin.denom, trader, margin.amount)?;
            engine.emit_margin_changed(&position, remainder.funding_payment)?;

            Ok(MarginChangeResult {
                position,
                funding_payment: remainder.funding_payment,
                margin_out: Some(margin),
            })
        })
    }

    // shared checks for add/remove margin
    fn margin_position(&self, pair: &Pair, trader: &Address, margin: &Coin) -> Result<Position, EngineError> {
        self.require_pair(pair)?;
        if margin.denom != pair.quote_denom() {
            return Err(EngineError::InvalidMarginDenom {
                expected: pair.quote_denom().to_string(),
                got: margin.denom.clone(),
            });
        }
        if !margin.is_positive() {
            return Err(EngineError::InvalidMarginAmount(margin.amount));
        }
        let position = self.require_position(pair, trader)?;
        if position.is_empty() {
            return Err(EngineError::PositionZero);
        }
        Ok(position)
    }

    /// Closes a position on a deactivated pool at its settlement price.
    pub fn settle_position(&mut self, pair: &Pair, trader: &Address) -> Result<Vec<Coin>, EngineError> {
        self.atomic(|engine| {
            engine.require_pair(pair)?;
            let position = engine.require_position(pair, trader)?;
            if position.is_empty() {
                return Err(EngineError::PositionZero);
            }

            let settlement_price = engine.vpool.settlement_price(pair)?;
            let settled_notional = settlement_price * position.size.abs();
            let pnl = position.unrealized_pnl(settled_notional);
            let remainder = engine.calc_remain_margin_with_funding_payment(&position, pnl)?;

            let denom = pair.quote_denom();
            if remainder.bad_debt > Decimal::ZERO {
                engine.settle_bad_debt(denom, remainder.bad_debt.round())?;
            }

            engine.reduce_open_interest(pair, position.open_notional);
            engine.state.positions.clear(
                pair,
                trader,
                remainder.latest_cumulative_premium_fraction,
                engine.block.height,
            );

            let mut settled_coins = Vec::new();
            let payout = remainder.margin.round();
            if payout > Decimal::ZERO {
                engine.withdraw_from_vault(denom, trader, payout)?;
                settled_coins.push(Coin::new(denom, payout));
            }

            engine.emit_event(EventPayload::PositionSettled(PositionSettledEvent {
                pair: pair.clone(),
                trader_address: trader.clone(),
                settled_coins: settled_coins.clone(),
            }));

            tracing::info!(%pair, %trader, %settlement_price, "position settled");
            Ok(settled_coins)
        })
    }

    // toll to the fee pool, spread to the ecosystem fund
    fn transfer_fee(&mut self, pair: &Pair, trader: &Address, notional: Decimal) -> Result<TxFee, EngineError> {
        let fee = calc_fee(notional, &self.params);
        let denom = pair.quote_denom();

        if fee.spread > Decimal::ZERO {
            self.transfer_to_module(trader, ModuleAccount::PerpEcosystemFund, Coin::new(denom, fee.spread))?;
        }
        if fee.toll > Decimal::ZERO {
            self.transfer_to_module(trader, ModuleAccount::FeePool, Coin::new(denom, fee.toll))?;
        }
        Ok(fee)
    }

    fn increase_open_interest(&mut self, pair: &Pair, trader: &Address, amount: Decimal) -> Result<(), EngineError> {
        let whitelisted = self.whitelist.is_whitelisted(trader);
        let metadata = self
            .state
            .pair_metadata
            .get_mut(pair)
            .ok_or_else(|| EngineError::PairMetadataNotFound(pair.clone()))?;

        let requested = metadata.open_interest_notional + amount;
        if let Some(cap) = metadata.max_open_interest_notional {
            if requested > cap && !whitelisted {
                return Err(EngineError::OpenInterestExceeded {
                    pair: pair.clone(),
                    requested,
                    cap,
                });
            }
        }
        metadata.open_interest_notional = requested;
        Ok(())
    }

    pub(super) fn reduce_open_interest(&mut self, pair: &Pair, amount: Decimal) {
        if let Some(metadata) = self.state.pair_metadata.get_mut(pair) {
            metadata.open_interest_notional = (metadata.open_interest_notional - amount).max(Decimal::ZERO);
        }
    }

    fn emit_position_changed(&mut self, resp: &PositionResp, fee: TxFee) -> Result<(), EngineError> {
        let position = &resp.position;
        let mark_price = self.vpool.mark_price(&position.pair)?;

        self.emit_event(EventPayload::PositionChanged(PositionChangedEvent {
            pair: position.pair.clone(),
            trader_address: position.trader_address.clone(),
            margin: position.margin,
            position_notional: resp.position_notional,
            exchanged_position_size: resp.exchanged_position_size,
            exchanged_notional: resp.exchanged_notional_value,
            transaction_fee: Coin::new(position.pair.quote_denom(), fee.total()),
            position_size: position.size,
            realized_pnl: resp.realized_pnl,
            unrealized_pnl_after: resp.unrealized_pnl_after,
            bad_debt: resp.bad_debt,
            mark_price,
            funding_payment: resp.funding_payment,
            block_height: self.block.height,
            block_time_ms: self.block.time.as_millis(),
        }));
        Ok(())
    }

    fn emit_margin_changed(&mut self, position: &Position, funding_payment: Decimal) -> Result<(), EngineError> {
        let valuation = self.position_notional_and_unrealized_pnl(position, PnlCalcOption::Spot)?;
        let mut resp = PositionResp::new(position.clone());
        resp.funding_payment = funding_payment;
        resp.unrealized_pnl_after = valuation.unrealized_pnl;
        resp.position_notional = valuation.position_notional;
        self.emit_position_changed(&resp, TxFee::zero())
    }
}
