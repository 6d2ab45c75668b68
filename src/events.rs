// 11.0: every state change produces an event. consumed by off-chain indexers, so the
// field sets are fixed. the EventPayload enum lists all event types.

use crate::types::{Address, Coin, Pair, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    PositionChanged(PositionChangedEvent),
    PositionLiquidated(PositionLiquidatedEvent),
    PositionSettled(PositionSettledEvent),

    // Pair events
    FundingRateChanged(FundingRateChangedEvent),

    // Fund movements
    Transfer(TransferEvent),
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::PositionChanged(_) => "position_changed",
            EventPayload::PositionLiquidated(_) => "position_liquidated",
            EventPayload::PositionSettled(_) => "position_settled",
            EventPayload::FundingRateChanged(_) => "funding_rate_changed",
            EventPayload::Transfer(_) => "transfer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionChangedEvent {
    pub pair: Pair,
    pub trader_address: Address,
    pub margin: Decimal,
    pub position_notional: Decimal,
    pub exchanged_position_size: Decimal,
    pub exchanged_notional: Decimal,
    pub transaction_fee: Coin,
    pub position_size: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl_after: Decimal,
    pub bad_debt: Decimal,
    pub mark_price: Decimal,
    pub funding_payment: Decimal,
    pub block_height: i64,
    pub block_time_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub pair: Pair,
    pub trader_address: Address,
    pub exchanged_quote_amount: Decimal,
    pub exchanged_position_size: Decimal,
    pub liquidator_address: Address,
    pub fee_to_liquidator: Coin,
    pub fee_to_ecosystem_fund: Coin,
    pub bad_debt: Decimal,
    pub margin: Decimal,
    pub position_notional: Decimal,
    pub position_size: Decimal,
    pub unrealized_pnl: Decimal,
    pub mark_price: Decimal,
    pub block_height: i64,
    pub block_time_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSettledEvent {
    pub pair: Pair,
    pub trader_address: Address,
    pub settled_coins: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRateChangedEvent {
    pub pair: Pair,
    pub mark_price: Decimal,
    pub index_price: Decimal,
    pub latest_funding_rate: Decimal,
    pub latest_premium_fraction: Decimal,
    pub cumulative_premium_fraction: Decimal,
    pub block_height: i64,
    pub block_time_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub coin: Coin,
}
