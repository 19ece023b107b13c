//! Exchange streaming market-data client
//!
//! Connects to the exchange's push stream over TLS, speaks the
//! newline-delimited subscription protocol, and folds each change line into
//! in-memory market and order caches with tick-aware prices.
//!
//! The usual flow: build a [`Subscription`] with credentials, wrap it in a
//! [`MarketCache`] for the market you care about, connect, authenticate,
//! subscribe, then drive [`MarketCache::poll`] in a loop.

pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod price;
pub mod scan;
pub mod subscription;
pub mod watchdog;

pub use cache::{
    is_valid_market_id, LevelLadder, Market, MarketCache, MarketStatus, OrderCache, PriceLadder,
    Runner, RunnerStatus,
};
pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use pipeline::{Pipeline, PipelineWriter};
pub use price::{Price, PriceSize};
pub use subscription::{
    Channel, CredentialsProvider, DataField, MarketDataFilter, MarketFilter, OrderFilter,
    RequestMessage, StaticCredentials, Subscription,
};
