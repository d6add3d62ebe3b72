//! Shared types for logcollect
//!
//! This crate contains data structures used across multiple logcollect crates.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

// ============================================================================
// Record Types
// ============================================================================

/// Named fields of one syslog record, as produced by the wire parser.
///
/// RFC 3164 records carry `tag` and `content`, RFC 5424 records carry
/// `app_name` and `message`. Both carry `timestamp`, `hostname`,
/// `priority`, `facility` and `severity`.
pub type LogParts = HashMap<String, Value>;

/// One formatted, immutable log line
pub type LogLine = Arc<str>;

/// A batch of drained lines shared by every stream subscriber
pub type Payload = Arc<str>;

/// Well-known field names in [`LogParts`]
pub mod fields {
    pub const TIMESTAMP: &str = "timestamp";
    pub const HOSTNAME: &str = "hostname";
    pub const TAG: &str = "tag";
    pub const APP_NAME: &str = "app_name";
    pub const MESSAGE: &str = "message";
    pub const CONTENT: &str = "content";
    pub const SEVERITY: &str = "severity";
    pub const FACILITY: &str = "facility";
    pub const PRIORITY: &str = "priority";
    pub const VERSION: &str = "version";
    pub const PROC_ID: &str = "proc_id";
    pub const MSG_ID: &str = "msg_id";
    pub const STRUCTURED_DATA: &str = "structured_data";
}

// ============================================================================
// Severity
// ============================================================================

/// Syslog severity (RFC 5424 section 6.2.1)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Informational,
    Debug,
}

impl Severity {
    /// All severities, ordered by numeric code
    pub const ALL: [Severity; 8] = [
        Self::Emergency,
        Self::Alert,
        Self::Critical,
        Self::Error,
        Self::Warning,
        Self::Notice,
        Self::Informational,
        Self::Debug,
    ];

    /// Map a numeric code (0-7) to a severity
    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Numeric code of this severity
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Short keyword used in formatted lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emerg",
            Self::Alert => "alert",
            Self::Critical => "crit",
            Self::Error => "err",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Informational => "info",
            Self::Debug => "debug",
        }
    }

    /// Decode a severity field value.
    ///
    /// Only integral JSON numbers in 0..=7 decode; strings, floats and
    /// out-of-range values do not.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(Self::from_code)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
