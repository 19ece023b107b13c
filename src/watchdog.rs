//! Stream stall watchdog
//!
//! Wraps a line sequence in a forwarder that tracks when data last arrived.
//! Heartbeat lines count as data, so a healthy but quiet stream never trips.
//! When nothing arrives within a multiple of the advertised heartbeat
//! interval, the stall callback fires once and the sequence ends, leaving
//! reconnection policy to the caller.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;

use crate::config::StreamConfig;

/// Shared idle tracking between the forwarder task and the subscription
pub struct WatchdogState {
    started: Instant,
    last_seen_ms: AtomicU64,
    heartbeat_ms: AtomicU64,
    stalled: AtomicBool,
}

impl WatchdogState {
    pub fn new(default_heartbeat_ms: u64) -> Self {
        Self {
            started: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
            heartbeat_ms: AtomicU64::new(default_heartbeat_ms),
            stalled: AtomicBool::new(false),
        }
    }

    /// Adopt the heartbeat interval the server advertises
    pub fn set_heartbeat_ms(&self, ms: u64) {
        if ms > 0 {
            self.heartbeat_ms.store(ms, Ordering::Relaxed);
        }
    }

    pub fn heartbeat_ms(&self) -> u64 {
        self.heartbeat_ms.load(Ordering::Relaxed)
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Relaxed)
    }

    /// Mark data as just seen
    fn touch(&self) {
        self.last_seen_ms
            .store(self.started.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    /// Clear a previous stall so a fresh guard over the same state can fire.
    /// The state outlives the connection it watched; without this, a
    /// reconnect would inherit a tripped one-shot and never stall again.
    fn rearm(&self) {
        self.stalled.store(false, Ordering::SeqCst);
        self.touch();
    }

    /// Time since data was last seen
    pub fn idle(&self) -> Duration {
        let now = self.started.elapsed().as_millis() as u64;
        let last = self.last_seen_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }

    /// True only on the transition into the stalled state
    fn trip(&self) -> bool {
        !self.stalled.swap(true, Ordering::SeqCst)
    }
}

/// Wrap `lines` in a stall-watching forwarder. The returned receiver yields
/// the same sequence; it ends when the source ends or when the stream stalls,
/// and `on_stall` fires at most once.
pub fn guard(
    mut lines: mpsc::Receiver<Bytes>,
    state: Arc<WatchdogState>,
    config: &StreamConfig,
    on_stall: Box<dyn FnOnce() + Send>,
) -> mpsc::Receiver<Bytes> {
    let (tx, out) = mpsc::channel(config.line_queue_capacity);
    let poll = Duration::from_millis(config.watchdog_poll_ms.max(1));
    let multiplier = config.watchdog_multiplier;
    tokio::spawn(async move {
        let mut on_stall = Some(on_stall);
        state.rearm();
        let mut ticker = interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => {
                        state.touch();
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    let threshold =
                        Duration::from_millis((state.heartbeat_ms() as f64 * multiplier) as u64);
                    if state.idle() > threshold && state.trip() {
                        warn!(
                            idle_ms = state.idle().as_millis() as u64,
                            threshold_ms = threshold.as_millis() as u64,
                            "stream stalled, ending line sequence"
                        );
                        if let Some(callback) = on_stall.take() {
                            callback();
                        }
                        break;
                    }
                }
            }
        }
    });
    out
}
