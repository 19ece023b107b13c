//! TLS line transport
//!
//! Connects the socket, performs the TLS handshake, and splits the stream:
//! a fill task reads newline-delimited frames into a bounded queue while the
//! writer half sends whole request frames. A full queue blocks the fill task,
//! pushing backpressure down to the socket buffer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::subscription::{MessageSink, RequestMessage};

const READ_BUFFER_BYTES: usize = 64 * 1024;

pub struct Pipeline;

impl Pipeline {
    /// Open the transport: writer half plus the queue the fill task drains
    /// lines into. The queue ends when the peer closes, a read fails, or a
    /// read exceeds the io timeout.
    pub async fn connect(config: &StreamConfig) -> Result<(PipelineWriter, mpsc::Receiver<Bytes>)> {
        let io_timeout = Duration::from_secs(config.io_timeout_secs);

        let addr = lookup_host((config.host.as_str(), config.port))
            .await?
            .next()
            .ok_or_else(|| StreamError::Connection(format!("no address for {}", config.host)))?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        // Sized before connect so the kernel honors it during the first burst
        socket.set_recv_buffer_size(config.recv_buffer_bytes as u32)?;
        let tcp = timeout(io_timeout, socket.connect(addr))
            .await
            .map_err(|_| StreamError::ConnectionTimeout)??;
        tcp.set_nodelay(true)?;

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| StreamError::Tls(e.to_string()))?;
        let tls = timeout(io_timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| StreamError::ConnectionTimeout)?
            .map_err(|e| StreamError::Tls(e.to_string()))?;
        info!(host = %config.host, port = config.port, "stream transport connected");

        let (read_half, write_half) = tokio::io::split(tls);
        let (tx, rx) = mpsc::channel(config.line_queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(fill(read_half, tx, io_timeout, shutdown_rx));

        Ok((
            PipelineWriter {
                writer: write_half,
                write_timeout: io_timeout,
                shutdown: shutdown_tx,
            },
            rx,
        ))
    }
}

/// Reads frames off the socket until the peer closes or the drain side hangs
/// up. Every exit path drops `tx`, which ends the line sequence cleanly.
async fn fill(
    read_half: ReadHalf<TlsStream<TcpStream>>,
    tx: mpsc::Sender<Bytes>,
    read_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut reader = BufReader::with_capacity(READ_BUFFER_BYTES, read_half);
    let mut buf = Vec::with_capacity(8 * 1024);
    loop {
        buf.clear();
        let read = tokio::select! {
            read = timeout(read_timeout, reader.read_until(b'\n', &mut buf)) => read,
            _ = shutdown.changed() => break,
        };
        match read {
            Err(_) => {
                warn!("socket read timed out, ending line sequence");
                break;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "socket read failed, ending line sequence");
                break;
            }
            Ok(Ok(0)) => {
                debug!("peer closed the stream");
                break;
            }
            Ok(Ok(_)) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                if buf.is_empty() {
                    continue;
                }
                if tx.send(Bytes::copy_from_slice(&buf)).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Writer half of the transport; also tears down the fill task on drop
pub struct PipelineWriter {
    writer: WriteHalf<TlsStream<TcpStream>>,
    write_timeout: Duration,
    shutdown: watch::Sender<bool>,
}

impl PipelineWriter {
    /// One request frame: JSON with nulls omitted, newline terminated
    pub(crate) fn encode(msg: &RequestMessage) -> Result<Vec<u8>> {
        let mut frame = serde_json::to_vec(msg)?;
        frame.push(b'\n');
        Ok(frame)
    }

    pub async fn close(&mut self) {
        let _ = self.shutdown.send(true);
        let _ = self.writer.shutdown().await;
    }
}

impl Drop for PipelineWriter {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[async_trait]
impl MessageSink for PipelineWriter {
    async fn send(&mut self, msg: &RequestMessage) -> Result<()> {
        let frame = Self::encode(msg)?;
        timeout(self.write_timeout, self.writer.write_all(&frame))
            .await
            .map_err(|_| StreamError::ConnectionTimeout)?
            .map_err(|e| StreamError::Write(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_newline_terminated_json() {
        let msg = RequestMessage::Authentication {
            id: 1,
            session: "S".to_string(),
            app_key: "K".to_string(),
        };
        let frame = PipelineWriter::encode(&msg).unwrap();
        assert_eq!(frame.last(), Some(&b'\n'));
        assert_eq!(
            &frame[..frame.len() - 1],
            br#"{"op":"authentication","id":1,"session":"S","appKey":"K"}"#
        );
    }

    #[test]
    fn test_encode_omits_unset_fields() {
        let msg = RequestMessage::OrderSubscription {
            id: 2,
            clk: None,
            initial_clk: None,
            order_filter: None,
        };
        let frame = PipelineWriter::encode(&msg).unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(!text.contains("clk"));
        assert!(!text.contains("null"));
    }
}
