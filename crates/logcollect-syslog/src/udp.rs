//! Syslog UDP listener
//!
//! One datagram carries one record. Records are parsed on receipt and
//! forwarded to the ingest channel; a full channel drops the record rather
//! than stalling the socket.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use logcollect_types::LogParts;

use crate::common::{SourceMetrics, forward};
use crate::error::{Result, SyslogSourceError};

/// Default syslog port used by the collector
const DEFAULT_PORT: u16 = 10514;

/// Default maximum syslog message size (8KB)
const DEFAULT_MAX_MESSAGE_SIZE: usize = 8192;

/// Syslog UDP listener configuration
#[derive(Debug, Clone)]
pub struct SyslogUdpSourceConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub address: String,

    /// Listen port
    pub port: u16,

    /// Largest datagram accepted; longer ones are truncated
    pub max_message_size: usize,
}

impl Default for SyslogUdpSourceConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl SyslogUdpSourceConfig {
    /// Get the socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// A bound syslog UDP listener
pub struct SyslogUdpSource {
    config: SyslogUdpSourceConfig,
    socket: UdpSocket,
    metrics: Arc<SourceMetrics>,
}

impl SyslogUdpSource {
    /// Bind the socket. Failure here is fatal for the collector.
    pub async fn bind(config: SyslogUdpSourceConfig) -> Result<Self> {
        let address = config.bind_address();
        let socket = UdpSocket::bind(&address)
            .await
            .map_err(|source| SyslogSourceError::Bind { address, source })?;

        Ok(Self {
            config,
            socket,
            metrics: Arc::new(SourceMetrics::new()),
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn metrics(&self) -> Arc<SourceMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Receive datagrams until `cancel` fires or the ingest channel closes
    pub async fn run(
        self,
        records: mpsc::Sender<LogParts>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let local = self.local_addr()?;
        tracing::info!(address = %local, "syslog UDP listener started");

        // One extra byte tells an oversized datagram apart from an exact fit
        let mut buf = vec![0u8; self.config.max_message_size + 1];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => {
                            let len = if len > self.config.max_message_size {
                                self.metrics.message_truncated();
                                tracing::debug!(peer = %peer, "oversized syslog datagram truncated");
                                self.config.max_message_size
                            } else {
                                len
                            };
                            if let Err(e) = forward(&buf[..len], &records, &self.metrics) {
                                tracing::info!(error = %e, "syslog UDP listener stopping");
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "syslog UDP receive error");
                        }
                    }
                }
            }
        }

        tracing::info!(address = %local, "syslog UDP listener stopped");
        Ok(())
    }
}
