//! Configuration module for the streaming client

use serde::Deserialize;
use std::env;

/// Streaming client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Streaming host
    pub host: String,

    /// TLS port
    pub port: u16,

    /// Socket receive buffer in bytes
    pub recv_buffer_bytes: usize,

    /// Read/write timeout in seconds
    pub io_timeout_secs: u64,

    /// Bounded capacity of the line queue between fill and drain stages
    pub line_queue_capacity: usize,

    /// Heartbeat interval assumed until the server advertises one, in ms
    pub heartbeat_ms: u64,

    /// Idle watchdog poll cadence in ms
    pub watchdog_poll_ms: u64,

    /// Idle threshold as a multiple of the heartbeat interval
    pub watchdog_multiplier: f64,
}

impl StreamConfig {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: env::var("STREAM_HOST")
                .unwrap_or_else(|_| "stream-api.betfair.com".to_string()),
            port: env::var("STREAM_PORT")
                .unwrap_or_else(|_| "443".to_string())
                .parse()
                .unwrap_or(443),
            recv_buffer_bytes: env::var("STREAM_RECV_BUFFER_BYTES")
                .unwrap_or_else(|_| "2097152".to_string())
                .parse()
                .unwrap_or(2 * 1024 * 1024),
            io_timeout_secs: env::var("STREAM_IO_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            line_queue_capacity: env::var("STREAM_LINE_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .unwrap_or(1024),
            heartbeat_ms: env::var("STREAM_HEARTBEAT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            watchdog_poll_ms: env::var("STREAM_WATCHDOG_POLL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            watchdog_multiplier: env::var("STREAM_WATCHDOG_MULTIPLIER")
                .unwrap_or_else(|_| "2.5".to_string())
                .parse()
                .unwrap_or(2.5),
        })
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: "stream-api.betfair.com".to_string(),
            port: 443,
            recv_buffer_bytes: 2 * 1024 * 1024,
            io_timeout_secs: 30,
            line_queue_capacity: 1024,
            heartbeat_ms: 5000,
            watchdog_poll_ms: 1000,
            watchdog_multiplier: 2.5,
        }
    }
}
