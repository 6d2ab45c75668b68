// 1.0: all the primitives live here. pairs, addresses, coins, sides, pool directions, block time.
// amounts stay plain Decimal: bank amounts are integer valued, position math is 18+ digit decimal.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// 1.1: a two-denom market. written "base:quote", e.g. "ubtc:unusd".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    base: String,
    quote: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairParseError {
    #[error("pair {0:?} must have the form base:quote")]
    MissingSeparator(String),

    #[error("pair {0:?} has an empty denom")]
    EmptyDenom(String),

    #[error("pair {0:?} uses the same denom twice")]
    SameDenom(String),
}

impl Pair {
    pub fn new(base: &str, quote: &str) -> Result<Self, PairParseError> {
        let raw = format!("{base}:{quote}");
        if base.is_empty() || quote.is_empty() {
            return Err(PairParseError::EmptyDenom(raw));
        }
        if base.contains(':') || quote.contains(':') {
            return Err(PairParseError::MissingSeparator(raw));
        }
        if base == quote {
            return Err(PairParseError::SameDenom(raw));
        }
        Ok(Self {
            base: base.to_string(),
            quote: quote.to_string(),
        })
    }

    pub fn base_denom(&self) -> &str {
        &self.base
    }

    /// Margin, fees and pnl for this pair are all settled in the quote denom.
    pub fn quote_denom(&self) -> &str {
        &self.quote
    }
}

impl FromStr for Pair {
    type Err = PairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once(':')
            .ok_or_else(|| PairParseError::MissingSeparator(s.to_string()))?;
        Pair::new(base, quote)
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.base, self.quote)
    }
}

// 1.2: account address. module accounts get a fixed "module/<name>" address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn module(name: &str) -> Self {
        Self(format!("module/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.3: denom plus amount. amounts moved through the bank are whole units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: Decimal,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: Decimal) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

// Long = profit when price goes up. Short = profit when price goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => dec!(1),
            Side::Short => dec!(-1),
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Side of a signed base size. zero has no side.
    pub fn of_size(size: Decimal) -> Option<Self> {
        if size > Decimal::ZERO {
            Some(Side::Long)
        } else if size < Decimal::ZERO {
            Some(Side::Short)
        } else {
            None
        }
    }

    // quote flows into the pool when buying base, out of it when selling
    pub fn quote_direction(&self) -> Direction {
        match self {
            Side::Long => Direction::AddToPool,
            Side::Short => Direction::RemoveFromPool,
        }
    }
}

// 1.4: which way an asset moves relative to the virtual pool reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    AddToPool,
    RemoveFromPool,
}

impl Direction {
    /// Base direction used to price or unwind an existing position.
    /// a long sells its base back into the pool, a short buys it out.
    pub fn closing_base(size: Decimal) -> Self {
        if size < Decimal::ZERO {
            Direction::RemoveFromPool
        } else {
            Direction::AddToPool
        }
    }
}

// 1.5: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn plus_millis(&self, ms: i64) -> Self {
        Self(self.0 + ms)
    }
}

// 1.6: height + time of the block a call executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub height: i64,
    pub time: Timestamp,
}

impl BlockContext {
    pub fn new(height: i64, time: Timestamp) -> Self {
        Self { height, time }
    }

    pub fn next(&self, block_time_ms: i64) -> Self {
        Self {
            height: self.height + 1,
            time: self.time.plus_millis(block_time_ms),
        }
    }
}

// 1.7: an ended epoch as seen by the funding hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochInfo {
    pub identifier: String,
    pub duration_ms: i64,
}

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;
