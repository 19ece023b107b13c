//! Subscription protocol state machine
//!
//! Owns the transport, allocates request ids, and remembers enough of every
//! subscription to replay it with resumption tokens after a reconnect. One
//! record is kept per channel; a later subscribe on the same channel replaces
//! the earlier one, matching what the server does.

mod messages;

pub use messages::{
    ConnectionMessage, DataField, MarketDataFilter, MarketFilter, OrderFilter, RequestMessage,
    StatusMessage,
};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::pipeline::Pipeline;
use crate::scan::LineContext;
use crate::watchdog::{self, WatchdogState};

/// Session credentials for the authentication handshake
pub trait CredentialsProvider: Send + Sync {
    /// A current session token; called on every authentication so a provider
    /// can refresh expired sessions
    fn token(&self) -> Result<String>;

    fn app_key(&self) -> &str;
}

/// Fixed token and key, for sessions managed elsewhere
pub struct StaticCredentials {
    app_key: String,
    token: String,
}

impl StaticCredentials {
    pub fn new(app_key: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            token: token.into(),
        }
    }
}

impl CredentialsProvider for StaticCredentials {
    fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    fn app_key(&self) -> &str {
        &self.app_key
    }
}

/// Outbound half of the transport
#[async_trait]
pub trait MessageSink: Send {
    async fn send(&mut self, msg: &RequestMessage) -> Result<()>;
}

/// The two subscription channels the protocol multiplexes on one socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Market,
    Order,
}

/// What we need to replay a subscription: the original request plus the
/// clocks learned from data since
#[derive(Debug, Clone)]
struct SubscriptionRecord {
    message: RequestMessage,
    clk: Option<String>,
    initial_clk: Option<String>,
}

pub struct Subscription {
    config: StreamConfig,
    provider: Arc<dyn CredentialsProvider>,
    sink: Option<Box<dyn MessageSink>>,
    lines: Option<mpsc::Receiver<Bytes>>,
    next_id: i64,
    records: HashMap<Channel, SubscriptionRecord>,
    connected: bool,
    connection_id: Option<String>,
    watchdog: Arc<WatchdogState>,
}

impl Subscription {
    pub fn new(provider: Arc<dyn CredentialsProvider>, config: StreamConfig) -> Result<Self> {
        if provider.app_key().is_empty() {
            return Err(StreamError::ConfigError("empty application key".to_string()));
        }
        let watchdog = Arc::new(WatchdogState::new(config.heartbeat_ms));
        Ok(Self {
            config,
            provider,
            sink: None,
            lines: None,
            next_id: 1,
            records: HashMap::new(),
            connected: false,
            connection_id: None,
            watchdog,
        })
    }

    /// Open the TLS transport and arm the stall watchdog. `on_stall` fires at
    /// most once, after which the line sequence ends.
    pub async fn connect(&mut self, on_stall: impl FnOnce() + Send + 'static) -> Result<()> {
        let (writer, lines) = Pipeline::connect(&self.config).await?;
        let lines = watchdog::guard(lines, self.watchdog.clone(), &self.config, Box::new(on_stall));
        self.sink = Some(Box::new(writer));
        self.lines = Some(lines);
        Ok(())
    }

    /// Wire a pre-built sink and line source instead of a live socket
    pub fn attach(&mut self, sink: Box<dyn MessageSink>, lines: mpsc::Receiver<Bytes>) {
        self.sink = Some(sink);
        self.lines = Some(lines);
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub(crate) fn watchdog(&self) -> &Arc<WatchdogState> {
        &self.watchdog
    }

    /// Send the authentication request; the outcome arrives as a status line
    pub async fn authenticate(&mut self) -> Result<i64> {
        let session = self.provider.token()?;
        if session.is_empty() {
            return Err(StreamError::ConfigError("empty session token".to_string()));
        }
        let id = self.allocate_id();
        let msg = RequestMessage::Authentication {
            id,
            session,
            app_key: self.provider.app_key().to_string(),
        };
        self.send(&msg).await?;
        Ok(id)
    }

    /// Subscribe the market channel, replacing any earlier market subscription
    pub async fn subscribe(
        &mut self,
        market_filter: MarketFilter,
        mut data_filter: MarketDataFilter,
    ) -> Result<i64> {
        data_filter.normalize();
        let id = self.allocate_id();
        let msg = RequestMessage::MarketSubscription {
            id,
            clk: None,
            initial_clk: None,
            market_filter,
            market_data_filter: data_filter,
        };
        self.send(&msg).await?;
        self.remember(Channel::Market, msg);
        Ok(id)
    }

    /// Subscribe the order channel, replacing any earlier order subscription
    pub async fn subscribe_orders(&mut self, order_filter: Option<OrderFilter>) -> Result<i64> {
        let id = self.allocate_id();
        let msg = RequestMessage::OrderSubscription {
            id,
            clk: None,
            initial_clk: None,
            order_filter,
        };
        self.send(&msg).await?;
        self.remember(Channel::Order, msg);
        Ok(id)
    }

    /// Replay every recorded subscription with its learned clocks so the
    /// server resumes the stream instead of restarting it. Request ids are
    /// reused from the original subscriptions. No-op with nothing recorded.
    pub async fn resubscribe(&mut self) -> Result<()> {
        let replays: Vec<RequestMessage> = [Channel::Market, Channel::Order]
            .iter()
            .filter_map(|channel| {
                self.records.get(channel).map(|record| {
                    let mut msg = record.message.clone();
                    msg.set_clocks(record.clk.clone(), record.initial_clk.clone());
                    msg
                })
            })
            .collect();
        for msg in replays {
            self.send(&msg).await?;
        }
        Ok(())
    }

    /// Next raw line from the transport; None once the sequence has ended
    pub async fn next_line(&mut self) -> Option<Bytes> {
        self.lines.as_mut()?.recv().await
    }

    pub(crate) fn on_connection(&mut self, msg: ConnectionMessage) {
        info!(connection_id = %msg.connection_id, "stream connection established");
        self.connection_id = Some(msg.connection_id);
        self.connected = true;
    }

    pub(crate) fn on_status(&mut self, msg: &StatusMessage) -> Result<()> {
        if msg.connection_closed == Some(true) {
            self.connected = false;
        }
        if msg.is_failure() {
            warn!(
                id = msg.id,
                error_code = msg.error_code.as_deref().unwrap_or(""),
                connection_closed = msg.connection_closed.unwrap_or(false),
                "stream request failed"
            );
            return Err(StreamError::Protocol {
                status_code: msg.status_code.clone(),
                error_code: msg.error_code.clone(),
                error_message: msg.error_message.clone(),
                connection_closed: msg.connection_closed.unwrap_or(false),
            });
        }
        debug!(id = msg.id, "request acknowledged");
        Ok(())
    }

    /// Fold a data line's envelope into subscription state: resumption clocks
    /// onto the matching record, heartbeat interval onto the watchdog
    pub(crate) fn on_data(&mut self, channel: Channel, ctx: &LineContext) {
        if let Some(hb) = ctx.heartbeat_ms {
            self.watchdog.set_heartbeat_ms(hb);
        }
        let Some(record) = self.records.get_mut(&channel) else {
            return;
        };
        // A stale id means the line belongs to a replaced subscription
        if let Some(request_id) = ctx.request_id {
            if request_id != record.message.id() {
                return;
            }
        }
        if let Some(clk) = &ctx.clk {
            if !clk.is_empty() {
                record.clk = Some(clk.clone());
            }
        }
        if let Some(initial_clk) = &ctx.initial_clk {
            if !initial_clk.is_empty() {
                record.initial_clk = Some(initial_clk.clone());
            }
        }
    }

    async fn send(&mut self, msg: &RequestMessage) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(StreamError::NotConnected)?;
        debug!(op = msg.op_name(), id = msg.id(), "sending request");
        sink.send(msg).await
    }

    fn remember(&mut self, channel: Channel, message: RequestMessage) {
        self.records.insert(
            channel,
            SubscriptionRecord {
                message,
                clk: None,
                initial_clk: None,
            },
        );
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every request it is asked to send
    pub(crate) struct RecordingSink {
        pub(crate) sent: Arc<Mutex<Vec<RequestMessage>>>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&mut self, msg: &RequestMessage) -> Result<()> {
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    /// A subscription with no transport attached; line application still works
    pub(crate) fn detached_subscription() -> Subscription {
        Subscription::new(
            Arc::new(StaticCredentials::new("test-key", "test-token")),
            StreamConfig::default(),
        )
        .unwrap()
    }

    /// A subscription wired to a recording sink and an open line channel
    pub(crate) fn recording_subscription() -> (
        Subscription,
        Arc<Mutex<Vec<RequestMessage>>>,
        mpsc::Sender<Bytes>,
    ) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(16);
        let mut subscription = detached_subscription();
        subscription.attach(Box::new(RecordingSink { sent: sent.clone() }), rx);
        (subscription, sent, tx)
    }
}
