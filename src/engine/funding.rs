//! Funding rate updates at the end of each funding epoch.

use super::core::Engine;
use super::results::FundingResult;
use crate::events::{EventPayload, FundingRateChangedEvent};
use crate::funding::{funding_rate, premium_fraction};
use crate::keepers::{Bank, Oracle, PricingEngine};
use crate::types::{EpochInfo, Pair};
use rust_decimal::Decimal;

impl<V, O, B> Engine<V, O, B>
where
    V: PricingEngine + Clone,
    O: Oracle,
    B: Bank + Clone,
{
    /// Epoch hook. only the funding epoch updates premium fractions; pairs
    /// without a pool or a usable price are skipped for this epoch.
    pub fn after_epoch_end(&mut self, epoch: &EpochInfo) -> Vec<FundingResult> {
        if epoch.identifier != self.params.funding_rate_interval {
            return Vec::new();
        }
        if epoch.duration_ms <= 0 {
            tracing::warn!(epoch = %epoch.identifier, duration_ms = epoch.duration_ms, "funding epoch without duration");
            return Vec::new();
        }

        let pairs: Vec<Pair> = self.state.pair_metadata.pairs().cloned().collect();
        let mut results = Vec::with_capacity(pairs.len());

        for pair in pairs {
            if let Some(result) = self.update_funding(&pair, epoch.duration_ms) {
                results.push(result);
            }
        }

        results
    }

    fn update_funding(&mut self, pair: &Pair, epoch_duration_ms: i64) -> Option<FundingResult> {
        if !self.vpool.exists_pool(pair) {
            tracing::warn!(%pair, "no pool for pair, skipping funding");
            return None;
        }

        let index_price = match self.oracle.current_twap(pair.base_denom(), pair.quote_denom()) {
            Ok(price) if price > Decimal::ZERO => price,
            Ok(price) => {
                tracing::warn!(%pair, %price, "index price not positive, skipping funding");
                return None;
            }
            Err(err) => {
                tracing::warn!(%pair, error = %err, "no index price, skipping funding");
                return None;
            }
        };

        let mark_price = match self.vpool.mark_price_twap(pair, self.params.twap_lookback_window_ms) {
            Ok(price) if price > Decimal::ZERO => price,
            Ok(price) => {
                tracing::warn!(%pair, %price, "mark price not positive, skipping funding");
                return None;
            }
            Err(err) => {
                tracing::warn!(%pair, error = %err, "no mark price, skipping funding");
                return None;
            }
        };

        let premium_fraction = premium_fraction(mark_price, index_price, epoch_duration_ms);
        let cumulative_premium_fraction = self
            .state
            .pair_metadata
            .get_mut(pair)?
            .push_premium_fraction(premium_fraction);
        let funding_rate = funding_rate(premium_fraction, index_price);

        tracing::info!(
            %pair,
            %mark_price,
            %index_price,
            %premium_fraction,
            %cumulative_premium_fraction,
            "funding rate updated"
        );

        self.emit_event(EventPayload::FundingRateChanged(FundingRateChangedEvent {
            pair: pair.clone(),
            mark_price,
            index_price,
            latest_funding_rate: funding_rate,
            latest_premium_fraction: premium_fraction,
            cumulative_premium_fraction,
            block_height: self.block.height,
            block_time_ms: self.block.time.as_millis(),
        }));

        Some(FundingResult {
            pair: pair.clone(),
            mark_price,
            index_price,
            premium_fraction,
            funding_rate,
            cumulative_premium_fraction,
        })
    }
}
