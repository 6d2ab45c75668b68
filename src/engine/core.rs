// 8.0 engine/core.rs: main engine. holds clearing house state, params and the injected keepers.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::config::Params;
use crate::events::{Event, EventId, EventPayload};
use crate::keepers::{Bank, Oracle, PricingEngine, Whitelist};
use crate::store::{PairMetadata, PerpState, PrepaidBadDebtStore};
use crate::position::Position;
use crate::types::{Address, BlockContext, Pair, Timestamp};
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine<V, O, B> {
    pub(super) config: EngineConfig,
    pub(super) params: Params,
    pub(super) state: PerpState,
    pub(super) vpool: V,
    pub(super) oracle: O,
    pub(super) bank: B,
    pub(super) whitelist: Box<dyn Whitelist>,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) block: BlockContext,
}

/// Copy of everything a transaction may touch.
pub(super) struct Checkpoint<V, B> {
    state: PerpState,
    vpool: V,
    bank: B,
    next_event_id: u64,
}

impl<V, O, B> Engine<V, O, B>
where
    V: PricingEngine + Clone,
    O: Oracle,
    B: Bank + Clone,
{
    pub fn new(params: Params, config: EngineConfig, vpool: V, oracle: O, bank: B) -> Result<Self, EngineError> {
        params.validate()?;
        Ok(Self {
            config,
            params,
            state: PerpState::default(),
            vpool,
            oracle,
            bank,
            whitelist: Box::new(BTreeSet::<Address>::new()),
            events: Vec::new(),
            next_event_id: 1,
            block: BlockContext::new(1, Timestamp::from_millis(0)),
        })
    }

    pub fn with_whitelist(mut self, whitelist: impl Whitelist + 'static) -> Self {
        self.whitelist = Box::new(whitelist);
        self
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn block(&self) -> BlockContext {
        self.block
    }

    pub fn set_block(&mut self, block: BlockContext) {
        self.block = block;
        self.vpool.begin_block(&block);
        self.oracle.begin_block(&block);
    }

    pub fn advance_block(&mut self, block_time_ms: i64) {
        let next = self.block.next(block_time_ms);
        self.set_block(next);
    }

    /// Registers funding metadata for a pair. the pool itself lives in the pricing keeper.
    pub fn add_pair(&mut self, pair: Pair) -> Result<(), EngineError> {
        self.add_pair_metadata(PairMetadata::new(pair))
    }

    pub fn add_pair_metadata(&mut self, metadata: PairMetadata) -> Result<(), EngineError> {
        if self.state.pair_metadata.get(&metadata.pair).is_some() {
            return Err(EngineError::PairAlreadyExists(metadata.pair));
        }
        tracing::info!(pair = %metadata.pair, "registered pair");
        self.state.pair_metadata.set(metadata);
        Ok(())
    }

    pub fn pair_metadata(&self, pair: &Pair) -> Option<&PairMetadata> {
        self.state.pair_metadata.get(pair)
    }

    pub fn position(&self, pair: &Pair, trader: &Address) -> Option<&Position> {
        self.state.positions.get(pair, trader)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.state.positions.iter()
    }

    pub fn prepaid_bad_debt(&self) -> &PrepaidBadDebtStore {
        &self.state.prepaid_bad_debt
    }

    pub fn cumulative_premium_fraction(&self, pair: &Pair) -> Result<Decimal, EngineError> {
        self.state
            .pair_metadata
            .get(pair)
            .map(PairMetadata::latest_cumulative_premium_fraction)
            .ok_or_else(|| EngineError::PairMetadataNotFound(pair.clone()))
    }

    pub fn vpool(&self) -> &V {
        &self.vpool
    }

    pub fn vpool_mut(&mut self) -> &mut V {
        &mut self.vpool
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut B {
        &mut self.bank
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(super) fn checkpoint(&self) -> Checkpoint<V, B> {
        Checkpoint {
            state: self.state.clone(),
            vpool: self.vpool.clone(),
            bank: self.bank.clone(),
            next_event_id: self.next_event_id,
        }
    }

    pub(super) fn restore(&mut self, checkpoint: Checkpoint<V, B>) {
        self.state = checkpoint.state;
        self.vpool = checkpoint.vpool;
        self.bank = checkpoint.bank;
        self.events.retain(|e| e.id.0 < checkpoint.next_event_id);
        self.next_event_id = checkpoint.next_event_id;
    }

    // 8.2: runs one transaction. on error state, pool reserves, balances and
    // events emitted by the call are restored.
    pub(super) fn atomic<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let checkpoint = self.checkpoint();

        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.restore(checkpoint);
                tracing::debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.block.time, payload);
        self.next_event_id += 1;

        tracing::debug!(event_id = event.id.0, kind = event.payload.kind(), payload = ?event.payload);

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }

    pub(super) fn require_pair(&self, pair: &Pair) -> Result<&PairMetadata, EngineError> {
        if !self.vpool.exists_pool(pair) {
            return Err(EngineError::PairNotFound(pair.clone()));
        }
        self.state
            .pair_metadata
            .get(pair)
            .ok_or_else(|| EngineError::PairMetadataNotFound(pair.clone()))
    }

    pub(super) fn require_position(&self, pair: &Pair, trader: &Address) -> Result<Position, EngineError> {
        self.state
            .positions
            .get(pair, trader)
            .cloned()
            .ok_or_else(|| EngineError::PositionNotFound {
                pair: pair.clone(),
                trader: trader.clone(),
            })
    }
}
