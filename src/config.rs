// 7.0 config.rs: module parameters. one immutable Params value is handed to the engine
// at construction and threaded through every calculation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/** 7.1: clearing house parameters. ratios are fractions, 0.001 = 0.1% */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
    // Margin ratio below which a position can be liquidated
    pub maintenance_margin_ratio: Decimal,
    // Protocol fee on exchanged notional, paid to the fee pool
    pub toll_ratio: Decimal,
    // Fee on exchanged notional paid to the ecosystem fund
    pub spread_ratio: Decimal,
    // Fee on liquidated notional, split between liquidator and ecosystem fund
    pub liquidation_fee_ratio: Decimal,
    // Share of a position closed by one partial liquidation
    pub partial_liquidation_ratio: Decimal,
    // Epoch identifier the funding hook reacts to
    pub funding_rate_interval: String,
    // Window for mark and index TWAPs
    pub twap_lookback_window_ms: i64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            maintenance_margin_ratio: dec!(0.0625),
            toll_ratio: dec!(0.001),
            spread_ratio: dec!(0.001),
            liquidation_fee_ratio: dec!(0.025),
            partial_liquidation_ratio: dec!(0.25),
            funding_rate_interval: "30 min".to_string(),
            twap_lookback_window_ms: 15 * 60 * 1000,
        }
    }
}

impl Params {
    // Validate the parameters for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maintenance_margin_ratio <= Decimal::ZERO
            || self.maintenance_margin_ratio > Decimal::ONE
        {
            return Err(ConfigError::InvalidRatio {
                name: "maintenance_margin_ratio",
                value: self.maintenance_margin_ratio,
            });
        }

        for (name, value) in [
            ("toll_ratio", self.toll_ratio),
            ("spread_ratio", self.spread_ratio),
            ("liquidation_fee_ratio", self.liquidation_fee_ratio),
            ("partial_liquidation_ratio", self.partial_liquidation_ratio),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(ConfigError::InvalidRatio { name, value });
            }
        }

        if self.funding_rate_interval.trim().is_empty() {
            return Err(ConfigError::EmptyFundingInterval);
        }

        if self.twap_lookback_window_ms <= 0 {
            return Err(ConfigError::InvalidTwapWindow(self.twap_lookback_window_ms));
        }

        Ok(())
    }
}

// Parameter validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    InvalidRatio { name: &'static str, value: Decimal },

    #[error("funding rate interval must name an epoch")]
    EmptyFundingInterval,

    #[error("twap lookback window must be positive, got {0}ms")]
    InvalidTwapWindow(i64),
}
