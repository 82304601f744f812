//! Structured logging
//!
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-subsystem debug control via --debug-<tag> flags
//! - Dual output: colored console + size-rotated log file
//! - A `Logger` trait so a hub can be pointed at another sink
//!
//! ## Usage
//!
//! ```no_run
//! use wshub::logger::{self, LogTag};
//!
//! logger::init();
//! logger::info(LogTag::Hub, "hub started");
//! logger::debug(LogTag::Client, "frame received"); // Only if --debug-client
//! logger::flush(); // before exit, once file logging is on
//! ```

mod config;
mod core;
mod file;
mod format;
mod levels;
mod tags;

use std::sync::Arc;

pub use config::{get_logger_config, init_from_args, set_logger_config, LoggerConfig};
pub use file::{init_file_logging, FileLogConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Initialize the logger system from command-line arguments
///
/// Call once at startup, before any logging occurs.
pub fn init() {
    config::init_from_args();
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level (only with --debug-<tag>)
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (only with --verbose or --verbose-<tag>)
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Force flush pending log file writes
///
/// Call during shutdown so the tail of the log reaches disk.
pub fn flush() {
    file::flush_file_logging();
}

/// Whether a message at this level/tag would be emitted
///
/// Lets callers skip building expensive messages.
pub fn enabled(tag: LogTag, level: LogLevel) -> bool {
    core::should_log(&tag, level)
}

/// Sink used by a hub and its clients.
///
/// The default is [`ConsoleLogger`]; applications may install their own
/// through the hub's logger option.
pub trait Logger: Send + Sync {
    fn log(&self, tag: LogTag, level: LogLevel, message: &str);

    fn enabled(&self, tag: LogTag, level: LogLevel) -> bool {
        let _ = (tag, level);
        true
    }
}

/// Logger that writes through this module's console formatter
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, tag: LogTag, level: LogLevel, message: &str) {
        core::log_internal(tag, level, message);
    }

    fn enabled(&self, tag: LogTag, level: LogLevel) -> bool {
        core::should_log(&tag, level)
    }
}

pub type SharedLogger = Arc<dyn Logger>;

/// Default logger handle
pub fn console() -> SharedLogger {
    Arc::new(ConsoleLogger)
}
