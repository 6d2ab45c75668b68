//! Persisted clearing house state.
//!
//! Positions are keyed by (pair, trader), pair metadata by pair and
//! prepaid bad debt by denom. BTreeMaps keep iteration order deterministic.

use crate::position::Position;
use crate::types::{Address, Pair};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionStore {
    positions: BTreeMap<(Pair, Address), Position>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &Pair, trader: &Address) -> Option<&Position> {
        self.positions.get(&(pair.clone(), trader.clone()))
    }

    pub fn set(&mut self, position: Position) {
        let key = (position.pair.clone(), position.trader_address.clone());
        self.positions.insert(key, position);
    }

    /// Overwrites with the cleared state. the key stays so repeated reads see zero.
    pub fn clear(&mut self, pair: &Pair, trader: &Address, premium_fraction: Decimal, block_number: i64) {
        self.set(Position::zero(pair.clone(), trader.clone(), premium_fraction, block_number));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_positions<'a>(&'a self, pair: &'a Pair) -> impl Iterator<Item = &'a Position> + 'a {
        self.positions
            .values()
            .filter(move |p| &p.pair == pair && !p.is_empty())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairMetadata {
    pub pair: Pair,
    /// One running total per funding epoch. never empty.
    pub cumulative_premium_fractions: Vec<Decimal>,
    /// Sum of open notional over every open position of the pair.
    pub open_interest_notional: Decimal,
    pub max_open_interest_notional: Option<Decimal>,
}

impl PairMetadata {
    pub fn new(pair: Pair) -> Self {
        Self {
            pair,
            cumulative_premium_fractions: vec![Decimal::ZERO],
            open_interest_notional: Decimal::ZERO,
            max_open_interest_notional: None,
        }
    }

    pub fn with_open_interest_cap(mut self, cap: Decimal) -> Self {
        self.max_open_interest_notional = Some(cap);
        self
    }

    pub fn latest_cumulative_premium_fraction(&self) -> Decimal {
        self.cumulative_premium_fractions
            .last()
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Appends this epoch's premium fraction on top of the running total.
    pub fn push_premium_fraction(&mut self, premium_fraction: Decimal) -> Decimal {
        let cumulative = self.latest_cumulative_premium_fraction() + premium_fraction;
        self.cumulative_premium_fractions.push(cumulative);
        cumulative
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairMetadataStore {
    pairs: BTreeMap<Pair, PairMetadata>,
}

impl PairMetadataStore {
    pub fn get(&self, pair: &Pair) -> Option<&PairMetadata> {
        self.pairs.get(pair)
    }

    pub fn get_mut(&mut self, pair: &Pair) -> Option<&mut PairMetadata> {
        self.pairs.get_mut(pair)
    }

    pub fn set(&mut self, metadata: PairMetadata) {
        self.pairs.insert(metadata.pair.clone(), metadata);
    }

    pub fn pairs(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.keys()
    }
}

/// Ecosystem fund credit already advanced to the vault, per denom.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrepaidBadDebtStore {
    balances: BTreeMap<String, Decimal>,
}

impl PrepaidBadDebtStore {
    pub fn get(&self, denom: &str) -> Decimal {
        self.balances.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn set(&mut self, denom: &str, amount: Decimal) {
        self.balances.insert(denom.to_string(), amount.max(Decimal::ZERO));
    }

    pub fn increment(&mut self, denom: &str, amount: Decimal) -> Decimal {
        let new_balance = self.get(denom) + amount;
        self.set(denom, new_balance);
        self.get(denom)
    }

    pub fn decrement(&mut self, denom: &str, amount: Decimal) -> Decimal {
        let new_balance = self.get(denom) - amount;
        self.set(denom, new_balance);
        self.get(denom)
    }
}

/// Everything the clearing house persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerpState {
    pub positions: PositionStore,
    pub pair_metadata: PairMetadataStore,
    pub prepaid_bad_debt: PrepaidBadDebtStore,
}
