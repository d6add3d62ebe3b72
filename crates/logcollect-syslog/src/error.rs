//! Error types for the syslog listeners

use std::io;
use thiserror::Error;

/// Errors that can occur while running a syslog listener
#[derive(Error, Debug)]
pub enum SyslogSourceError {
    /// Failed to bind the listening socket
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Ingest channel closed
    #[error("record channel closed")]
    ChannelClosed,
}

/// Result type for syslog listener operations
pub type Result<T> = std::result::Result<T, SyslogSourceError>;
