//! Cache entities
//!
//! Mutable exchange state maintained from the stream: markets, runners,
//! their price ladders, and matched-order exposure.

mod ladder;
mod market;
mod order;
mod runner;

pub use ladder::{LevelLadder, PriceLadder};
pub use market::{is_valid_market_id, Market, MarketCache, MarketStatus};
pub use order::OrderCache;
pub use runner::{Runner, RunnerStatus};
