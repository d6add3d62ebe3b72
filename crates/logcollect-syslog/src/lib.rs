//! Syslog listeners for logcollect
//!
//! This crate receives syslog over UDP and TCP, parses each record into
//! [`LogParts`] and forwards it to the ingest channel.
//!
//! Both transports accept RFC 3164 (BSD) and RFC 5424 (IETF) records; the
//! format is detected per message.

mod common;
mod error;
pub mod parser;
pub mod tcp;
pub mod udp;

pub use common::{SourceMetrics, SourceMetricsSnapshot, report_metrics};
pub use error::{Result, SyslogSourceError};
pub use parser::parse;
pub use tcp::{SyslogTcpSource, SyslogTcpSourceConfig};
pub use udp::{SyslogUdpSource, SyslogUdpSourceConfig};

// Re-export types used in our public API
pub use logcollect_types::LogParts;
