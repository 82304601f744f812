/// Logger configuration
///
/// Holds the minimum level and the per-tag debug/verbose sets. Populated from
/// command-line flags by `init_from_args`, or replaced wholesale by callers
/// (tests, embedding applications).
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

use super::levels::LogLevel;
use super::tags::LogTag;
use crate::arguments;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Minimum level threshold
    pub min_level: LogLevel,

    /// Tags with `--debug-<tag>` enabled
    pub debug_tags: HashSet<String>,

    /// Tags with `--verbose-<tag>` enabled
    pub verbose_tags: HashSet<String>,

    /// Restrict output to these tags (empty = all)
    pub enabled_tags: HashSet<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            verbose_tags: HashSet::new(),
            enabled_tags: HashSet::new(),
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

/// Scan command-line arguments for logging flags
///
/// Recognised: `--verbose`, `--quiet`, `--log-level <level>`,
/// `--debug-<tag>`, `--verbose-<tag>`, `--debug-all`.
pub fn init_from_args() {
    let mut config = LoggerConfig::default();

    if let Some(level) = arguments::get_arg_value("--log-level").and_then(|v| LogLevel::parse(&v)) {
        config.min_level = level;
    }
    if arguments::has_arg("--quiet") {
        config.min_level = LogLevel::Error;
    }
    if arguments::has_arg("--verbose") {
        config.min_level = LogLevel::Verbose;
    }

    let debug_all = arguments::has_arg("--debug-all");
    for tag in LogTag::ALL {
        let key = tag.to_debug_key();
        if debug_all || arguments::has_arg(&format!("--debug-{}", key)) {
            config.debug_tags.insert(key.clone());
        }
        if arguments::has_arg(&format!("--verbose-{}", key)) {
            config.verbose_tags.insert(key);
        }
    }

    // Debug lines need the threshold raised as well
    if !config.debug_tags.is_empty() && config.min_level < LogLevel::Debug {
        config.min_level = LogLevel::Debug;
    }

    set_logger_config(config);
}

pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    LOGGER_CONFIG.read().debug_tags.contains(&tag.to_debug_key())
}

pub fn is_verbose_enabled_for_tag(tag: &LogTag) -> bool {
    LOGGER_CONFIG.read().verbose_tags.contains(&tag.to_debug_key())
}
