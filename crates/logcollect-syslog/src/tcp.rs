//! Syslog TCP listener
//!
//! Both TCP framings are accepted on the same connection, record by record:
//! octet counting (`<len> <msg>`, RFC 6587 3.4.1) when a record starts with a
//! non-zero digit, newline-delimited otherwise. Each connection gets its own
//! task; records longer than the size limit are truncated and the remainder
//! discarded.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use logcollect_types::LogParts;

use crate::common::{SourceMetrics, forward};
use crate::error::{Result, SyslogSourceError};

/// Default syslog port used by the collector
const DEFAULT_PORT: u16 = 10514;

/// Default maximum syslog message size (8KB)
const DEFAULT_MAX_MESSAGE_SIZE: usize = 8192;

/// Default read buffer per connection (64KB)
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Syslog TCP listener configuration
#[derive(Debug, Clone)]
pub struct SyslogTcpSourceConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub address: String,

    /// Listen port
    pub port: u16,

    /// Longest record kept; the rest of the record is discarded
    pub max_message_size: usize,

    /// Read buffer size per connection
    pub buffer_size: usize,
}

impl Default for SyslogTcpSourceConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl SyslogTcpSourceConfig {
    /// Get the socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// A bound syslog TCP listener
pub struct SyslogTcpSource {
    config: SyslogTcpSourceConfig,
    listener: TcpListener,
    metrics: Arc<SourceMetrics>,
}

impl SyslogTcpSource {
    /// Bind the listener. Failure here is fatal for the collector.
    pub async fn bind(config: SyslogTcpSourceConfig) -> Result<Self> {
        let address = config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| SyslogSourceError::Bind { address, source })?;

        Ok(Self {
            config,
            listener,
            metrics: Arc::new(SourceMetrics::new()),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn metrics(&self) -> Arc<SourceMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Accept connections until `cancel` fires
    pub async fn run(
        self,
        records: mpsc::Sender<LogParts>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let local = self.local_addr()?;
        tracing::info!(address = %local, "syslog TCP listener started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let handler = ConnectionHandler {
                                config: self.config.clone(),
                                records: records.clone(),
                                metrics: Arc::clone(&self.metrics),
                                cancel: cancel.child_token(),
                                peer,
                            };
                            tokio::spawn(handler.handle(stream));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "syslog TCP accept error");
                        }
                    }
                }
            }
        }

        tracing::info!(address = %local, "syslog TCP listener stopped");
        Ok(())
    }
}

/// Handles a single TCP connection
struct ConnectionHandler {
    config: SyslogTcpSourceConfig,
    records: mpsc::Sender<LogParts>,
    metrics: Arc<SourceMetrics>,
    cancel: CancellationToken,
    peer: SocketAddr,
}

impl ConnectionHandler {
    async fn handle(self, stream: TcpStream) {
        self.metrics.connection_opened();
        tracing::debug!(peer = %self.peer, "syslog TCP connection opened");

        if let Err(e) = self.read_records(stream).await {
            tracing::debug!(peer = %self.peer, error = %e, "syslog TCP connection error");
        }

        self.metrics.connection_closed();
        tracing::debug!(peer = %self.peer, "syslog TCP connection closed");
    }

    async fn read_records(&self, stream: TcpStream) -> Result<()> {
        let mut reader = BufReader::with_capacity(self.config.buffer_size, stream);
        let mut record = Vec::with_capacity(self.config.max_message_size);

        loop {
            let read = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                read = read_record(&mut reader, &mut record, self.config.max_message_size) => read?,
            };

            match read {
                ReadLine::Eof => return Ok(()),
                ReadLine::Truncated => {
                    self.metrics.message_truncated();
                    forward(&record, &self.records, &self.metrics)?;
                }
                ReadLine::Complete => forward(&record, &self.records, &self.metrics)?,
            }
        }
    }
}

/// Outcome of reading one record
#[derive(Debug, PartialEq, Eq)]
enum ReadLine {
    /// A full record (or the final unterminated line before EOF)
    Complete,
    /// The record exceeded the limit; `buf` holds its first part
    Truncated,
    /// Nothing left to read
    Eof,
}

/// Longest accepted octet-count prefix; anything longer is read as a line
const MAX_LENGTH_DIGITS: usize = 9;

/// Read one record in whichever framing the sender used
async fn read_record<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_size: usize,
) -> io::Result<ReadLine> {
    let first = reader.fill_buf().await?.first().copied();
    match first {
        None => {
            buf.clear();
            Ok(ReadLine::Eof)
        }
        Some(b'1'..=b'9') => read_octet_counted(reader, buf, max_size).await,
        Some(_) => read_bounded_line(reader, buf, max_size).await,
    }
}

/// Read an octet-counted frame: `MSG-LEN SP MSG`.
///
/// A prefix that is not digits followed by a space is not a frame header;
/// the bytes already read become the start of a newline-delimited line.
async fn read_octet_counted<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_size: usize,
) -> io::Result<ReadLine> {
    buf.clear();

    loop {
        let Some(&byte) = reader.fill_buf().await?.first() else {
            return Ok(if buf.is_empty() {
                ReadLine::Eof
            } else {
                ReadLine::Complete
            });
        };

        match byte {
            b'0'..=b'9' if buf.len() < MAX_LENGTH_DIGITS => {
                buf.push(byte);
                reader.consume(1);
            }
            b' ' if !buf.is_empty() => {
                reader.consume(1);
                break;
            }
            _ => return read_line_into(reader, buf, max_size).await,
        }
    }

    // Only ASCII digits were pushed
    let mut remaining = buf
        .iter()
        .fold(0usize, |len, digit| len * 10 + usize::from(digit - b'0'));
    buf.clear();
    let mut truncated = false;

    while remaining > 0 {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside an octet-counted frame",
            ));
        }

        let take = available.len().min(remaining);
        let room = max_size.saturating_sub(buf.len());
        if take > room {
            truncated = true;
        }
        buf.extend_from_slice(&available[..take.min(room)]);

        reader.consume(take);
        remaining -= take;
    }

    Ok(if truncated {
        ReadLine::Truncated
    } else {
        ReadLine::Complete
    })
}

/// Read one newline-terminated line, storing at most `max_size` bytes
async fn read_bounded_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_size: usize,
) -> io::Result<ReadLine> {
    buf.clear();
    read_line_into(reader, buf, max_size).await
}

/// Append up to the next newline onto whatever `buf` already holds
async fn read_line_into<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_size: usize,
) -> io::Result<ReadLine> {
    let mut total = buf.len();
    let mut truncated = buf.len() > max_size;
    buf.truncate(max_size);

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match (total, truncated) {
                (0, _) => ReadLine::Eof,
                (_, true) => ReadLine::Truncated,
                (_, false) => ReadLine::Complete,
            });
        }

        let (consume, done) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        // Newline itself is not counted against the limit
        let content = if done { consume - 1 } else { consume };
        let room = max_size.saturating_sub(buf.len());
        if content > room {
            truncated = true;
        }
        buf.extend_from_slice(&available[..content.min(room)]);

        total += consume;
        reader.consume(consume);

        if done {
            return Ok(if truncated {
                ReadLine::Truncated
            } else {
                ReadLine::Complete
            });
        }
    }
}
