//! Collector configuration
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! command-line flags, each layer overriding the previous one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Parser};
use serde::Deserialize;
use thiserror::Error;

/// logcollect - keep recent syslog in memory and serve it over HTTP
#[derive(Parser, Debug, Default)]
#[command(name = "logcollect")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum number of log entries to keep (approx 1KB/entry)
    #[arg(long)]
    pub max_log_entries: Option<usize>,

    /// Maximum number of filtered log entries to return
    #[arg(long)]
    pub max_filter_entries: Option<usize>,

    /// Interval, in seconds, between stream publishes
    #[arg(long)]
    pub log_read_interval: Option<u64>,

    /// Syslog host to listen on
    #[arg(long)]
    pub syslog_host: Option<String>,

    /// Syslog port to listen on (UDP and TCP)
    #[arg(long)]
    pub syslog_port: Option<u16>,

    /// HTTP host to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Decode the syslog severity into each line
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub sev: Option<bool>,

    /// Echo received lines to stdout
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub stdout: Option<bool>,
}

/// Effective configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub max_log_entries: usize,
    pub max_filter_entries: usize,
    /// Seconds between stream publishes
    pub log_read_interval: u64,
    pub syslog_host: String,
    pub syslog_port: u16,
    pub host: String,
    pub port: u16,
    pub sev: bool,
    pub stdout: bool,
    /// Batches queued per stream client before drops start
    pub stream_queue: usize,
    /// Parsed records queued between the listeners and the buffer
    pub ingest_queue: usize,
    /// Batches queued for the console writer before drops start
    pub echo_queue: usize,
    /// Seconds between listener counter reports
    pub metrics_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_log_entries: 50_000,
            max_filter_entries: 100,
            log_read_interval: 3,
            syslog_host: "0.0.0.0".into(),
            syslog_port: 10514,
            host: "0.0.0.0".into(),
            port: 3000,
            sev: false,
            stdout: true,
            stream_queue: 16,
            ingest_queue: 10_000,
            echo_queue: 64,
            metrics_interval: 60,
        }
    }
}

/// Errors while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Build the effective configuration for `args`
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file; keys not present keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override with any flags given on the command line
    pub fn apply(&mut self, args: &Args) {
        if let Some(v) = args.max_log_entries {
            self.max_log_entries = v;
        }
        if let Some(v) = args.max_filter_entries {
            self.max_filter_entries = v;
        }
        if let Some(v) = args.log_read_interval {
            self.log_read_interval = v;
        }
        if let Some(v) = &args.syslog_host {
            self.syslog_host = v.clone();
        }
        if let Some(v) = args.syslog_port {
            self.syslog_port = v;
        }
        if let Some(v) = &args.host {
            self.host = v.clone();
        }
        if let Some(v) = args.port {
            self.port = v;
        }
        if let Some(v) = args.sev {
            self.sev = v;
        }
        if let Some(v) = args.stdout {
            self.stdout = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max-log-entries", self.max_log_entries as u64),
            ("max-filter-entries", self.max_filter_entries as u64),
            ("log-read-interval", self.log_read_interval),
            ("stream-queue", self.stream_queue as u64),
            ("ingest-queue", self.ingest_queue as u64),
            ("echo-queue", self.echo_queue as u64),
            ("metrics-interval", self.metrics_interval),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.log_read_interval)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval)
    }

    pub fn http_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::load(&Args::default()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_log_entries, 50_000);
        assert_eq!(config.max_filter_entries, 100);
        assert_eq!(config.publish_interval(), Duration::from_secs(3));
        assert_eq!(config.metrics_interval(), Duration::from_secs(60));
        assert_eq!(config.http_address(), "0.0.0.0:3000");
        assert!(!config.sev);
        assert!(config.stdout);
    }

    #[test]
    fn test_cli_flags() {
        let args = Args::parse_from([
            "logcollect",
            "--max-log-entries",
            "10",
            "--port",
            "8080",
            "--sev",
            "--stdout",
            "false",
        ]);
        let config = Config::load(&args).unwrap();
        assert_eq!(config.max_log_entries, 10);
        assert_eq!(config.port, 8080);
        assert!(config.sev);
        assert!(!config.stdout);
    }

    #[test]
    fn test_file_then_flags() {
        let path = std::env::temp_dir().join(format!("logcollect-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "max-filter-entries = 7\nport = 9000\nsev = true").unwrap();
        drop(file);

        let args = Args {
            config: Some(path.clone()),
            port: Some(9100),
            ..Default::default()
        };
        let config = Config::load(&args).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.max_filter_entries, 7);
        assert_eq!(config.port, 9100);
        assert!(config.sev);
        assert_eq!(config.max_log_entries, 50_000);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = toml::from_str::<Config>("max-entries = 5").unwrap_err();
        assert!(err.to_string().contains("max-entries"));
    }

    #[test]
    fn test_zero_values_are_invalid() {
        let args = Args {
            log_read_interval: Some(0),
            ..Default::default()
        };
        assert!(matches!(Config::load(&args), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let args = Args {
            config: Some(PathBuf::from("/nonexistent/logcollect.toml")),
            ..Default::default()
        };
        assert!(matches!(Config::load(&args), Err(ConfigError::Read { .. })));
    }
}
