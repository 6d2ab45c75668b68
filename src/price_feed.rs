// 9.0 price_feed.rs: MOCKED index price oracle. posted prices are sampled once per block
// and served as a time weighted average over a fixed window.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::keepers::{Oracle, OracleError};
use crate::types::BlockContext;

/// Time weighted average over (timestamp_ms, price) samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwapCalculator {
    samples: VecDeque<(i64, Decimal)>,
    window_ms: i64,
    max_samples: usize,
}

impl TwapCalculator {
    pub fn new(window_ms: i64) -> Self {
        Self {
            samples: VecDeque::new(),
            window_ms,
            max_samples: 1000,
        }
    }

    pub fn add_sample(&mut self, timestamp_ms: i64, price: Decimal) {
        // one sample per timestamp, the latest wins
        if matches!(self.samples.back(), Some((ts, _)) if *ts == timestamp_ms) {
            self.samples.pop_back();
        }
        self.samples.push_back((timestamp_ms, price));

        // keep one sample older than the window so its price covers the window start
        while self.samples.len() > 1 && timestamp_ms - self.samples[1].0 >= self.window_ms {
            self.samples.pop_front();
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// TWAP up to `now_ms`. the newest sample holds until now.
    pub fn twap(&self, now_ms: i64) -> Option<Decimal> {
        let window_start = now_ms - self.window_ms;
        let mut weighted_sum = Decimal::ZERO;
        let mut total_time = Decimal::ZERO;
        let mut period_end = now_ms;

        for (ts, price) in self.samples.iter().rev() {
            let start = (*ts).max(window_start);
            if period_end > start {
                let duration = Decimal::from(period_end - start);
                weighted_sum += *price * duration;
                total_time += duration;
            }
            if *ts <= window_start {
                break;
            }
            period_end = *ts;
        }

        if total_time > Decimal::ZERO {
            Some(weighted_sum / total_time)
        } else {
            self.samples.back().map(|(_, p)| *p)
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Feed {
    latest: Decimal,
    twap: TwapCalculator,
}

/// Index prices keyed by (token0, token1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeed {
    feeds: BTreeMap<(String, String), Feed>,
    window_ms: i64,
    now_ms: i64,
}

impl PriceFeed {
    pub fn new(window_ms: i64) -> Self {
        Self {
            feeds: BTreeMap::new(),
            window_ms,
            now_ms: 0,
        }
    }

    /// Posts a price. it enters the TWAP at the current block time.
    pub fn set_price(&mut self, token0: &str, token1: &str, price: Decimal) {
        let window_ms = self.window_ms;
        let now_ms = self.now_ms;
        let feed = self
            .feeds
            .entry((token0.to_string(), token1.to_string()))
            .or_insert_with(|| Feed {
                latest: price,
                twap: TwapCalculator::new(window_ms),
            });
        feed.latest = price;
        feed.twap.add_sample(now_ms, price);
        tracing::debug!(token0, token1, %price, "index price posted");
    }

    pub fn latest_price(&self, token0: &str, token1: &str) -> Option<Decimal> {
        self.feeds
            .get(&(token0.to_string(), token1.to_string()))
            .map(|feed| feed.latest)
    }
}

impl Oracle for PriceFeed {
    fn current_twap(&self, token0: &str, token1: &str) -> Result<Decimal, OracleError> {
        self.feeds
            .get(&(token0.to_string(), token1.to_string()))
            .and_then(|feed| feed.twap.twap(self.now_ms))
            .ok_or_else(|| OracleError::NoPrice {
                token0: token0.to_string(),
                token1: token1.to_string(),
            })
    }

    fn begin_block(&mut self, block: &BlockContext) {
        self.now_ms = block.time.as_millis();
        for feed in self.feeds.values_mut() {
            feed.twap.add_sample(self.now_ms, feed.latest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use rust_decimal_macros::dec;

    #[test]
    fn twap_weights_samples_by_duration() {
        let mut twap = TwapCalculator::new(3_600_000);
        twap.add_sample(0, dec!(50000));
        twap.add_sample(1000, dec!(51000));

        // 50000 for 1s, 51000 for 1s
        assert_eq!(twap.twap(2000), Some(dec!(50500)));
        assert_eq!(twap.twap(1000), Some(dec!(50000)));
    }

    #[test]
    fn twap_window_drops_old_samples() {
        let mut twap = TwapCalculator::new(1000);
        twap.add_sample(0, dec!(10));
        twap.add_sample(1000, dec!(20));
        twap.add_sample(2000, dec!(30));
        assert_eq!(twap.sample_count(), 2);
        assert_eq!(twap.twap(2500), Some(dec!(25)));
    }

    #[test]
    fn single_sample_is_its_price() {
        let mut twap = TwapCalculator::new(1000);
        assert_eq!(twap.twap(0), None);
        twap.add_sample(5, dec!(7));
        assert_eq!(twap.twap(5), Some(dec!(7)));
    }

    #[test]
    fn feed_samples_every_block() {
        let mut feed = PriceFeed::new(10_000);
        assert_eq!(
            feed.current_twap("ubtc", "unusd"),
            Err(OracleError::NoPrice {
                token0: "ubtc".to_string(),
                token1: "unusd".to_string(),
            })
        );

        feed.set_price("ubtc", "unusd", dec!(10));
        feed.begin_block(&BlockContext::new(2, Timestamp::from_millis(1000)));
        feed.set_price("ubtc", "unusd", dec!(12));
        feed.begin_block(&BlockContext::new(3, Timestamp::from_millis(2000)));

        // 10 for the first second, 12 for the next
        assert_eq!(feed.current_twap("ubtc", "unusd"), Ok(dec!(11)));
        assert_eq!(feed.latest_price("ubtc", "unusd"), Some(dec!(12)));
    }
}
