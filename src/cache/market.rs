//! Market cache
//!
//! One `Market` per subscribed market id, mutated in place by the scanner.
//! `MarketCache` wires the market to its subscription and drives line
//! application.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::trace;

use super::order::OrderCache;
use super::runner::{Runner, RunnerStatus};
use crate::error::{Result, StreamError};
use crate::price::Price;
use crate::scan::{self, Op};
use crate::subscription::{Channel, ConnectionMessage, StatusMessage, Subscription};

/// Market lifecycle status, decoded from the single-byte wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketStatus {
    Open,
    Suspended,
    Closed,
    Inactive,
}

impl MarketStatus {
    /// Decode O/S/C/I; the set is fixed, anything else is None
    pub fn from_code(code: u8) -> Option<MarketStatus> {
        match code {
            b'O' => Some(MarketStatus::Open),
            b'S' => Some(MarketStatus::Suspended),
            b'C' => Some(MarketStatus::Closed),
            b'I' => Some(MarketStatus::Inactive),
            _ => None,
        }
    }
}

/// Checks the `1.<digits>` market id format
pub fn is_valid_market_id(id: &str) -> bool {
    match id.strip_prefix("1.") {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Mutable state for one market
#[derive(Debug)]
pub struct Market {
    id: String,
    start_time: Option<DateTime<Utc>>,
    status: MarketStatus,
    in_play: bool,
    version: i64,
    traded_volume: Decimal,
    publish_time: i64,
    update_latency_ms: i64,
    runners: HashMap<i64, Runner>,
    orders: OrderCache,
}

impl Market {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            start_time: None,
            status: MarketStatus::Inactive,
            in_play: false,
            version: 0,
            traded_volume: Decimal::ZERO,
            publish_time: 0,
            update_latency_ms: 0,
            runners: HashMap::new(),
            orders: OrderCache::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn status(&self) -> MarketStatus {
        self.status
    }

    pub fn is_in_play(&self) -> bool {
        self.in_play
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn traded_volume(&self) -> Decimal {
        self.traded_volume
    }

    /// Server publish time of the last applied change, epoch ms
    pub fn publish_time(&self) -> i64 {
        self.publish_time
    }

    /// Local receive time minus server publish time for the last change
    pub fn update_latency_ms(&self) -> i64 {
        self.update_latency_ms
    }

    pub fn runner(&self, id: i64) -> Option<&Runner> {
        self.runners.get(&id)
    }

    pub fn runners(&self) -> impl Iterator<Item = &Runner> {
        self.runners.values()
    }

    pub fn runner_count(&self) -> usize {
        self.runners.len()
    }

    pub fn orders(&self) -> &OrderCache {
        &self.orders
    }

    pub fn set_traded_volume(&mut self, tv: Decimal) {
        self.traded_volume = tv;
    }

    pub fn set_start_time(&mut self, t: DateTime<Utc>) {
        self.start_time = Some(t);
    }

    pub fn set_status(&mut self, status: MarketStatus) {
        self.status = status;
    }

    pub fn set_in_play(&mut self, in_play: bool) {
        self.in_play = in_play;
    }

    pub fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    pub fn set_publish_time(&mut self, pt: i64) {
        self.publish_time = pt;
        self.update_latency_ms = Utc::now().timestamp_millis() - pt;
    }

    /// Apply a runner definition
    ///
    /// Removed destroys the runner outright, ladders included. Any other
    /// status creates the runner if absent or updates it in place, leaving
    /// its ladders untouched.
    pub fn add_or_update_runner_definition(
        &mut self,
        id: i64,
        status: RunnerStatus,
        adjustment_factor: Option<Decimal>,
    ) {
        if status == RunnerStatus::Removed {
            self.runners.remove(&id);
            return;
        }
        let runner = self.runner_entry(id);
        runner.status = status;
        if let Some(af) = adjustment_factor {
            runner.adjustment_factor = af;
        }
    }

    /// Overwrite one best-available-to-back level
    pub fn update_best_available_to_back(&mut self, id: i64, level: u8, price: Price, size: Decimal) {
        self.runner_entry(id).best_available_to_back.update(level, price, size);
    }

    /// Overwrite one best-available-to-lay level
    pub fn update_best_available_to_lay(&mut self, id: i64, level: u8, price: Price, size: Decimal) {
        self.runner_entry(id).best_available_to_lay.update(level, price, size);
    }

    /// Overwrite the traded size at a price
    pub fn update_traded(&mut self, id: i64, odds: Decimal, size: Decimal) {
        self.runner_entry(id).traded.set(odds, size);
    }

    pub fn update_matched_back(&mut self, odds: Decimal, size: Decimal) {
        self.orders.update_matched_back(odds, size);
    }

    // A ladder update can outrun the runner definition; reference creates the
    // runner Hidden until its definition arrives.
    fn runner_entry(&mut self, id: i64) -> &mut Runner {
        self.runners.entry(id).or_insert_with(|| Runner::new(id))
    }
}

/// A live market driven by its subscription's line sequence
pub struct MarketCache {
    market: Market,
    subscription: Subscription,
    on_update: Option<Box<dyn FnMut(&Market) + Send>>,
}

impl MarketCache {
    /// Build a cache for one market, rejecting a malformed id up front
    pub fn new(subscription: Subscription, market_id: &str) -> Result<Self> {
        if !is_valid_market_id(market_id) {
            return Err(StreamError::InvalidMarketId(market_id.to_string()));
        }
        Ok(Self {
            market: Market::new(market_id.to_string()),
            subscription,
            on_update: None,
        })
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn subscription_mut(&mut self) -> &mut Subscription {
        &mut self.subscription
    }

    pub fn connected(&self) -> bool {
        self.subscription.connected()
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.subscription.connection_id()
    }

    /// Callback fired synchronously after each fully-applied data line.
    /// Runs on the consumption path and must not block.
    pub fn set_on_update(&mut self, callback: impl FnMut(&Market) + Send + 'static) {
        self.on_update = Some(Box::new(callback));
    }

    /// Drain one line from the subscription and apply it.
    /// Returns false once the line sequence has ended.
    pub async fn poll(&mut self) -> Result<bool> {
        match self.subscription.next_line().await {
            Some(line) => {
                self.apply(&line)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Apply one raw line to the cache and subscription state
    pub fn apply(&mut self, line: &[u8]) -> Result<()> {
        let started = Instant::now();
        match scan::op_of(line)? {
            Op::Connection => {
                let msg: ConnectionMessage = serde_json::from_slice(line)
                    .map_err(StreamError::from)?;
                self.subscription.on_connection(msg);
            }
            Op::Status => {
                let msg: StatusMessage = serde_json::from_slice(line)
                    .map_err(StreamError::from)?;
                self.subscription.on_status(&msg)?;
            }
            Op::MarketChange => {
                let ctx = scan::apply_market_change(line, &mut self.market)?;
                if let Some(pt) = ctx.publish_time {
                    self.market.set_publish_time(pt);
                }
                self.subscription.on_data(Channel::Market, &ctx);
                self.fire_on_update();
                trace!(
                    market_id = %self.market.id,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "market change applied"
                );
            }
            Op::OrderChange => {
                let ctx = scan::apply_order_change(line, &mut self.market)?;
                self.subscription.on_data(Channel::Order, &ctx);
                self.fire_on_update();
                trace!(
                    market_id = %self.market.id,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "order change applied"
                );
            }
            Op::Unknown => {
                trace!(len = line.len(), "unrecognized op, line skipped");
            }
        }
        Ok(())
    }

    fn fire_on_update(&mut self) {
        if let Some(callback) = self.on_update.as_mut() {
            callback(&self.market);
        }
    }

    /// Consume a line buffer from the transport
    pub fn apply_buf(&mut self, line: &Bytes) -> Result<()> {
        self.apply(line.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::testing::detached_subscription;
    use rust_decimal_macros::dec;

    fn test_cache() -> MarketCache {
        MarketCache::new(detached_subscription(), "1.1").unwrap()
    }

    #[test]
    fn test_market_id_validation() {
        assert!(is_valid_market_id("1.180631847"));
        assert!(!is_valid_market_id("2.1"));
        assert!(!is_valid_market_id("1."));
        assert!(!is_valid_market_id("1.1x"));
        assert!(!is_valid_market_id(""));

        assert!(matches!(
            MarketCache::new(detached_subscription(), "nope"),
            Err(StreamError::InvalidMarketId(_))
        ));
    }

    #[test]
    fn test_market_status_codes() {
        assert_eq!(MarketStatus::from_code(b'O'), Some(MarketStatus::Open));
        assert_eq!(MarketStatus::from_code(b'S'), Some(MarketStatus::Suspended));
        assert_eq!(MarketStatus::from_code(b'C'), Some(MarketStatus::Closed));
        assert_eq!(MarketStatus::from_code(b'I'), Some(MarketStatus::Inactive));
        assert_eq!(MarketStatus::from_code(b'Q'), None);
    }

    #[test]
    fn test_runner_lifecycle() {
        let mut cache = test_cache();
        let market = &mut cache.market;

        market.add_or_update_runner_definition(7, RunnerStatus::Active, Some(dec!(4.2)));
        market.update_traded(7, dec!(2.02), dec!(100));
        assert_eq!(market.runner(7).unwrap().status, RunnerStatus::Active);
        assert_eq!(market.runner(7).unwrap().adjustment_factor, dec!(4.2));

        // Removal discards the runner and its ladders, no history kept
        market.add_or_update_runner_definition(7, RunnerStatus::Removed, None);
        assert!(market.runner(7).is_none());

        // Re-adding starts from empty ladders
        market.add_or_update_runner_definition(7, RunnerStatus::Active, None);
        let runner = market.runner(7).unwrap();
        assert_eq!(runner.status, RunnerStatus::Active);
        assert!(runner.traded.is_empty());
    }

    #[test]
    fn test_definition_update_preserves_ladders() {
        let mut cache = test_cache();
        let market = &mut cache.market;

        market.update_best_available_to_back(9, 0, Price::of(dec!(3.0)), dec!(20));
        market.add_or_update_runner_definition(9, RunnerStatus::Active, None);

        let runner = market.runner(9).unwrap();
        assert_eq!(runner.status, RunnerStatus::Active);
        assert_eq!(runner.best_available_to_back.len(), 1);
    }

    #[test]
    fn test_ladder_update_creates_hidden_runner() {
        let mut cache = test_cache();
        cache.market.update_best_available_to_lay(11, 2, Price::of(dec!(4.0)), dec!(9));

        let runner = cache.market.runner(11).unwrap();
        assert_eq!(runner.status, RunnerStatus::Hidden);
        assert!(runner.best_available_to_lay.contains_level(2));
    }

    #[test]
    fn test_end_to_end_connection_then_market_change() {
        let mut cache = test_cache();

        cache
            .apply(br#"{"op":"connection","connectionId":"C1"}"#)
            .unwrap();
        cache
            .apply(br#"{"op":"mcm","pt":1581707853123,"mc":[{"id":"1.1","tv":17540.83}]}"#)
            .unwrap();

        assert_eq!(cache.connection_id(), Some("C1"));
        assert!(cache.connected());
        assert_eq!(cache.market().traded_volume(), dec!(17540.83));
        assert_eq!(cache.market().publish_time(), 1581707853123);
    }

    #[test]
    fn test_update_callback_fires_after_full_application() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut cache = test_cache();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        cache.set_on_update(move |market| {
            assert_eq!(market.traded_volume(), dec!(5.5));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cache
            .apply(br#"{"op":"mcm","pt":1,"mc":[{"id":"1.1","tv":5.5}]}"#)
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
