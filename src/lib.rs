// perp-clearinghouse: perpetual futures clearing house over a virtual AMM.
// isolated margin per (pair, trader), funding via cumulative premium fractions,
// partial and full liquidation, vault accounting with ecosystem fund backstop.
// all computation is deterministic. pricing, oracle and bank are injected keepers.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Pair, Address, Coin, Side, Direction, BlockContext
//   2.x  fees.rs: toll + spread on exchanged notional
//   3.x  keepers.rs: PricingEngine, Oracle, Bank, Whitelist traits + module accounts
//   4.x  position.rs: position record, pnl sources, PositionResp, LiquidateResp
//   5.x  funding.rs: premium fraction + funding rate per epoch
//   6.x  margin.rs: remaining margin, bad debt, margin ratio, free collateral
//   7.x  config.rs: module params + validation
//   8.x  engine/: clearing house: positions, liquidations, funding, vault, queries
//   9.0  price_feed.rs: index oracle with TWAP (mocked)
//   9.2  custody.rs: bank ledger (mocked)
//   9.3  vpool.rs: constant product virtual pool (mocked)
//   10.x store.rs: positions, pair metadata, prepaid bad debt
//   11.x events.rs: state transition events for indexers

// core clearing house modules
pub mod engine;
pub mod events;
pub mod fees;
pub mod funding;
pub mod margin;
pub mod position;
pub mod store;
pub mod types;

// integration modules
pub mod config;
pub mod custody;
pub mod keepers;
pub mod price_feed;
pub mod vpool;

// re exports for convenience
pub use config::{ConfigError, Params};
pub use custody::Ledger;
pub use engine::*;
pub use events::*;
pub use fees::{calc_fee, TxFee};
pub use funding::{funding_rate, intervals_per_day, premium_fraction};
pub use keepers::{Bank, BankError, ModuleAccount, Oracle, OracleError, PricingEngine, PricingError, Whitelist};
pub use margin::{
    calc_remain_margin, free_collateral, funding_payment, margin_ratio, require_more_margin_ratio, MarginRatioTooLow,
    MarginRemainder,
};
pub use position::*;
pub use price_feed::{PriceFeed, TwapCalculator};
pub use store::{PairMetadata, PerpState, PositionStore, PrepaidBadDebtStore};
pub use types::*;
pub use vpool::{ReserveSnapshot, Vpool, VpoolConfig, VpoolSet};
