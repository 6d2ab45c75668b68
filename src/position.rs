// 4.0: position records and the transient responses produced by every clearing house transition.
// pnl here is open-notional based: long pnl = notional - openNotional, short the reverse.

use crate::types::{Address, BlockContext, Pair, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One per (pair, trader). size > 0 is long, size < 0 is short, zero is flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub pair: Pair,
    pub trader_address: Address,
    pub size: Decimal,
    pub margin: Decimal,
    pub open_notional: Decimal,
    pub latest_cumulative_premium_fraction: Decimal,
    pub block_number: i64,
}

impl Position {
    /// The cleared state. flat positions stay stored in this form.
    pub fn zero(
        pair: Pair,
        trader_address: Address,
        latest_cumulative_premium_fraction: Decimal,
        block_number: i64,
    ) -> Self {
        Self {
            pair,
            trader_address,
            size: Decimal::ZERO,
            margin: Decimal::ZERO,
            open_notional: Decimal::ZERO,
            latest_cumulative_premium_fraction,
            block_number,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_zero()
    }

    pub fn side(&self) -> Option<Side> {
        Side::of_size(self.size)
    }

    pub fn is_cleared(&self) -> bool {
        self.size.is_zero() && self.margin.is_zero() && self.open_notional.is_zero()
    }

    pub fn touch(&mut self, block: &BlockContext) {
        self.block_number = block.height;
    }

    // 4.1: paper gains/losses given what the position is worth now
    pub fn unrealized_pnl(&self, position_notional: Decimal) -> Decimal {
        unrealized_pnl(self.size, self.open_notional, position_notional)
    }
}

pub fn unrealized_pnl(size: Decimal, open_notional: Decimal, position_notional: Decimal) -> Decimal {
    if size.is_zero() {
        Decimal::ZERO
    } else if size < Decimal::ZERO {
        open_notional - position_notional
    } else {
        position_notional - open_notional
    }
}

// 4.2: which price source values a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PnlCalcOption {
    Spot,
    Twap,
    Oracle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PnlPreference {
    Max,
    Min,
}

/// Price basis for a margin ratio: one source, or the better/worse of spot and twap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginRatioBasis {
    Price(PnlCalcOption),
    Preference(PnlPreference),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotionalAndPnl {
    pub position_notional: Decimal,
    pub unrealized_pnl: Decimal,
}

impl NotionalAndPnl {
    pub fn zero() -> Self {
        Self {
            position_notional: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    /// Picks by pnl. ties keep `self`.
    pub fn prefer(self, other: Self, preference: PnlPreference) -> Self {
        match preference {
            PnlPreference::Max if other.unrealized_pnl > self.unrealized_pnl => other,
            PnlPreference::Min if other.unrealized_pnl < self.unrealized_pnl => other,
            _ => self,
        }
    }
}

/// Outcome of one transition. margin_to_vault > 0 means the trader owes the vault,
/// < 0 means the vault pays the trader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionResp {
    pub position: Position,
    pub exchanged_notional_value: Decimal,
    pub exchanged_position_size: Decimal,
    pub bad_debt: Decimal,
    pub funding_payment: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl_after: Decimal,
    pub margin_to_vault: Decimal,
    pub position_notional: Decimal,
}

impl PositionResp {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            exchanged_notional_value: Decimal::ZERO,
            exchanged_position_size: Decimal::ZERO,
            bad_debt: Decimal::ZERO,
            funding_payment: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl_after: Decimal::ZERO,
            margin_to_vault: Decimal::ZERO,
            position_notional: Decimal::ZERO,
        }
    }

    // close followed by a fresh open in the other direction.
    // flows add up, the position and its notional come from the reopen.
    pub fn followed_by(self, reopen: PositionResp) -> PositionResp {
        PositionResp {
            position: reopen.position,
            exchanged_notional_value: self.exchanged_notional_value + reopen.exchanged_notional_value,
            exchanged_position_size: self.exchanged_position_size + reopen.exchanged_position_size,
            bad_debt: self.bad_debt + reopen.bad_debt,
            funding_payment: self.funding_payment + reopen.funding_payment,
            realized_pnl: self.realized_pnl + reopen.realized_pnl,
            unrealized_pnl_after: Decimal::ZERO,
            margin_to_vault: self.margin_to_vault + reopen.margin_to_vault,
            position_notional: reopen.position_notional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidateResp {
    pub bad_debt: Decimal,
    pub fee_to_liquidator: Decimal,
    pub fee_to_perp_ecosystem_fund: Decimal,
    pub liquidator: Address,
    pub position_resp: PositionResp,
}

impl LiquidateResp {
    /// Checked before any liquidation funds move.
    pub fn validate(&self) -> Result<(), String> {
        if self.liquidator.as_str().is_empty() {
            return Err("liquidator address must be set".to_string());
        }
        for (name, value) in [
            ("bad_debt", self.bad_debt),
            ("fee_to_liquidator", self.fee_to_liquidator),
            ("fee_to_perp_ecosystem_fund", self.fee_to_perp_ecosystem_fund),
        ] {
            if value < Decimal::ZERO {
                return Err(format!("{name} must not be negative, got {value}"));
            }
        }
        if self.position_resp.position.trader_address.as_str().is_empty() {
            return Err("position response must carry the liquidated position".to_string());
        }
        Ok(())
    }
}
