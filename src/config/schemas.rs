/// Configuration schemas - all config structures defined once with defaults
///
/// Every struct is declared through `config_struct!`, so a TOML file only
/// needs the fields it wants to change.
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config_struct;
use crate::logger::FileLogConfig;
use crate::ws::options::HubOption;

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

config_struct! {
    /// Listener configuration for the process entry point
    pub struct ServerConfig {
        /// Host/IP address to bind
        host: String = "127.0.0.1".to_string(),

        /// Port to bind
        port: u16 = 8080,

        /// Route that upgrades to a WebSocket
        path: String = "/ws".to_string(),

        /// Grace period for in-flight HTTP requests on shutdown
        shutdown_timeout_secs: u64 = 10,
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

// ============================================================================
// HUB CONFIGURATION
// ============================================================================

/// Authentication policy selectable from a config file
///
/// Custom predicates can only be installed in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Accept every upgraded connection
    Skip,
    /// Require `X-Auth: pass`
    Header,
}

config_struct! {
    /// Hub tuning knobs
    pub struct HubSettings {
        /// Largest inbound message accepted by the transport, in bytes
        max_message_size: usize = 1024,

        /// Transport write buffer, in bytes
        write_buffer_size: usize = 1024,

        /// Per-client outbound queue capacity
        client_send_size: usize = 20,

        /// Breaker bucket capacity (0 disables the breaker)
        breaker_capacity: u32 = 3,

        /// Breaker refill period, one token per period
        breaker_period_ms: u64 = 2000,

        /// Per-read deadline
        read_wait_secs: u64 = 1200,

        /// Per-write deadline
        write_wait_secs: u64 = 10,

        /// Authentication policy
        auth: AuthMode = AuthMode::Skip,
    }
}

impl HubSettings {
    /// Translate the file block into hub options.
    ///
    /// Applied after the built-in defaults, so every field here overrides
    /// its default.
    pub fn to_options(&self) -> Vec<HubOption> {
        let auth = match self.auth {
            AuthMode::Skip => HubOption::SkipAuth,
            AuthMode::Header => HubOption::HeaderAuth,
        };

        vec![
            HubOption::BufferSize {
                read: self.max_message_size,
                write: self.write_buffer_size,
            },
            HubOption::ClientSendSize(self.client_send_size),
            HubOption::Breaker {
                capacity: self.breaker_capacity,
                period: Duration::from_millis(self.breaker_period_ms),
            },
            HubOption::Deadlines {
                read: Duration::from_secs(self.read_wait_secs),
                write: Duration::from_secs(self.write_wait_secs),
            },
            auth,
        ]
    }
}

// ============================================================================
// LOGGING CONFIGURATION
// ============================================================================

config_struct! {
    /// Log file output (the console is always on)
    pub struct LoggingConfig {
        /// Write a copy of every log line to `file`
        file_enabled: bool = true,

        /// Log file path
        file: String = "logfiles/wshub.log".to_string(),

        /// Rotate once the file would exceed this size, in megabytes
        max_size_mb: u64 = 128,

        /// Rotated files kept next to the live one
        max_backups: usize = 30,
    }
}

impl LoggingConfig {
    /// File sink settings, or `None` when file output is off
    pub fn file_config(&self) -> Option<FileLogConfig> {
        if !self.file_enabled || self.file.is_empty() {
            return None;
        }
        Some(FileLogConfig {
            path: self.file.clone().into(),
            max_size_bytes: self.max_size_mb.saturating_mul(1024 * 1024),
            max_backups: self.max_backups,
        })
    }
}

// ============================================================================
// ROOT CONFIGURATION
// ============================================================================

config_struct! {
    /// Root configuration file
    pub struct Config {
        server: ServerConfig = ServerConfig::default(),
        hub: HubSettings = HubSettings::default(),
        logging: LoggingConfig = LoggingConfig::default(),
    }
}
