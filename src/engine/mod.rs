// 8.0: clearing house engine. opens, reduces, reverses, closes and liquidates positions,
// settles funding and moves funds between traders and the module accounts.
// deterministic: pricing, oracle and bank are injected keepers.

mod config;
mod core;
mod funding;
mod liquidations;
mod margin;
mod positions;
mod queries;
mod results;
mod vault;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{
    EngineError, FundingResult, LiquidationOutcome, LiquidationRequest, MarginChangeResult,
    MultiLiquidationResult, PositionInfo, TradeResult,
};
