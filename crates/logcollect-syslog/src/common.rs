//! Shared functionality across the UDP and TCP listeners

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use logcollect_types::LogParts;

use crate::error::{Result, SyslogSourceError};
use crate::parser;

/// Counters kept by each listener
#[derive(Debug, Default)]
pub struct SourceMetrics {
    /// Currently open connections (TCP only)
    pub connections_active: AtomicU64,

    /// Total connections accepted (TCP only)
    pub connections_total: AtomicU64,

    /// Records received
    pub messages_received: AtomicU64,

    /// Bytes received
    pub bytes_received: AtomicU64,

    /// Records dropped because the ingest queue was full
    pub messages_dropped: AtomicU64,

    /// Records cut at the size limit
    pub messages_truncated: AtomicU64,
}

/// Point-in-time copy of [`SourceMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceMetricsSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub messages_dropped: u64,
    pub messages_truncated: u64,
}

impl SourceMetrics {
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            messages_truncated: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_received(&self, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_truncated(&self) {
        self.messages_truncated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SourceMetricsSnapshot {
        SourceMetricsSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            messages_truncated: self.messages_truncated.load(Ordering::Relaxed),
        }
    }
}

impl SourceMetricsSnapshot {
    /// Counters accumulated since `earlier`; `connections_active` stays current
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            connections_active: self.connections_active,
            connections_total: self.connections_total.saturating_sub(earlier.connections_total),
            messages_received: self.messages_received.saturating_sub(earlier.messages_received),
            bytes_received: self.bytes_received.saturating_sub(earlier.bytes_received),
            messages_dropped: self.messages_dropped.saturating_sub(earlier.messages_dropped),
            messages_truncated: self.messages_truncated.saturating_sub(earlier.messages_truncated),
        }
    }

    /// Whether any record was dropped or cut short
    pub fn has_losses(&self) -> bool {
        self.messages_dropped > 0 || self.messages_truncated > 0
    }
}

/// Log each listener's counters every `period` and once more when `cancel`
/// fires. Intervals with dropped or truncated records log at WARN.
pub async fn report_metrics(
    sources: Vec<(&'static str, Arc<SourceMetrics>)>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut previous = vec![SourceMetricsSnapshot::default(); sources.len()];
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = ticker.tick() => {
                for ((source, metrics), previous) in sources.iter().zip(previous.iter_mut()) {
                    let current = metrics.snapshot();
                    let delta = current.since(previous);
                    *previous = current;

                    if delta.has_losses() {
                        tracing::warn!(
                            source,
                            received = delta.messages_received,
                            dropped = delta.messages_dropped,
                            truncated = delta.messages_truncated,
                            "syslog records lost since last report"
                        );
                    } else if delta.messages_received > 0 {
                        tracing::debug!(
                            source,
                            received = delta.messages_received,
                            bytes = delta.bytes_received,
                            "syslog listener activity"
                        );
                    }
                }
            }
        }
    }

    for (source, metrics) in &sources {
        let totals = metrics.snapshot();
        tracing::info!(
            source,
            received = totals.messages_received,
            bytes = totals.bytes_received,
            dropped = totals.messages_dropped,
            truncated = totals.messages_truncated,
            connections = totals.connections_total,
            "syslog listener totals"
        );
    }
}

/// Parse a raw record and hand it to the ingest channel without waiting.
///
/// A full channel drops the record; a closed one is an error.
pub(crate) fn forward(
    raw: &[u8],
    records: &mpsc::Sender<LogParts>,
    metrics: &SourceMetrics,
) -> Result<()> {
    let raw = trim_trailing_newline(raw);
    if raw.is_empty() {
        return Ok(());
    }
    metrics.message_received(raw.len() as u64);

    match records.try_send(parser::parse(raw)) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            metrics.message_dropped();
            tracing::debug!("ingest queue full, syslog record dropped");
            Ok(())
        }
        Err(TrySendError::Closed(_)) => Err(SyslogSourceError::ChannelClosed),
    }
}

/// Trim a trailing LF or CRLF
pub fn trim_trailing_newline(data: &[u8]) -> &[u8] {
    let mut end = data.len();

    if end > 0 && data[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && data[end - 1] == b'\r' {
            end -= 1;
        }
    }

    &data[..end]
}
