use std::fmt::Write;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use logcollect_types::{LogLine, LogParts, Severity, fields};

use crate::buffer::RingBuffer;

/// Formats parsed syslog records and appends them to the ring buffer.
///
/// This is the only writer of the buffer.
#[derive(Clone)]
pub struct SyslogIngestor {
    buffer: RingBuffer,
    decode_severity: bool,
}

impl SyslogIngestor {
    pub fn new(buffer: RingBuffer, decode_severity: bool) -> Self {
        Self {
            buffer,
            decode_severity,
        }
    }

    /// Format one record and store it
    pub fn ingest(&self, parts: &LogParts) -> LogLine {
        let line: LogLine = Arc::from(format_line(parts, self.decode_severity));
        self.buffer.append(Arc::clone(&line));
        line
    }

    /// Consume records until the channel closes or `cancel` fires
    pub async fn run(self, mut records: mpsc::Receiver<LogParts>, cancel: CancellationToken) {
        let mut ingested: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                record = records.recv() => {
                    match record {
                        Some(parts) => {
                            self.ingest(&parts);
                            ingested += 1;
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::info!(ingested, "syslog ingestor stopped");
    }
}

/// Render a record as `[timestamp][hostname][tag][severity]: message\n`.
///
/// `tag` falls back to `app_name` and `message` falls back to `content`.
/// The severity segment is only present when `decode_severity` is set.
/// Missing fields render as empty segments.
pub fn format_line(parts: &LogParts, decode_severity: bool) -> String {
    let tag = first_present(parts, &[fields::TAG, fields::APP_NAME]);
    let message = first_present(parts, &[fields::MESSAGE, fields::CONTENT]);

    let mut line = String::with_capacity(128);
    push_segment(&mut line, parts.get(fields::TIMESTAMP));
    push_segment(&mut line, parts.get(fields::HOSTNAME));
    push_segment(&mut line, tag);
    if decode_severity {
        line.push('[');
        line.push_str(severity_name(parts.get(fields::SEVERITY)));
        line.push(']');
    }
    line.push_str(": ");
    push_value(&mut line, message);
    line.push('\n');
    line
}

/// Severity keyword for a field value, empty when it does not decode
pub fn severity_name(value: Option<&Value>) -> &'static str {
    value
        .and_then(Severity::from_value)
        .map(|s| s.as_str())
        .unwrap_or("")
}

/// First field among `keys` that is present and not null
fn first_present<'a>(parts: &'a LogParts, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| parts.get(*key))
        .find(|value| !value.is_null())
}

fn push_segment(line: &mut String, value: Option<&Value>) {
    line.push('[');
    push_value(line, value);
    line.push(']');
}

fn push_value(line: &mut String, value: Option<&Value>) {
    match value {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => line.push_str(s),
        Some(Value::Number(n)) => {
            let _ = write!(line, "{n}");
        }
        Some(Value::Bool(b)) => {
            let _ = write!(line, "{b}");
        }
        Some(other) => {
            let _ = write!(line, "{other}");
        }
    }
}
