//! Log processing for logcollect
//!
//! This crate provides the in-memory line buffer, record formatting,
//! periodic draining, console echo, subscriber fan-out and substring filtering.

mod broadcast;
mod buffer;
mod echo;
mod filter;
mod ingest;
mod publisher;

pub use broadcast::{Broadcaster, PublishReport, Subscription};
pub use buffer::{Cursor, RingBuffer, Snapshot};
pub use echo::{ConsoleEcho, DEFAULT_ECHO_QUEUE};
pub use filter::FilterQuery;
pub use ingest::{SyslogIngestor, format_line, severity_name};
pub use publisher::{PeriodicPublisher, TickReport};

// Re-export types used in our public API
pub use logcollect_types::{LogLine, LogParts, Payload, Severity};
