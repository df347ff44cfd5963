use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use std::sync::OnceLock;

static LOGGER: OnceLock<ConsoleLogger> = OnceLock::new();

/// Writes timestamped records to stderr. The level is whatever
/// `log::max_level()` currently allows, so it can be raised or lowered
/// after the config has been read.
pub struct ConsoleLogger;

impl ConsoleLogger {
    /// Installs the logger. When `RUST_LOG` is set, env_logger takes over so
    /// per-module filters keep working.
    pub fn init(level: Level) -> Result<(), SetLoggerError> {
        if std::env::var_os("RUST_LOG").is_some() {
            return env_logger::try_init();
        }

        let logger = LOGGER.get_or_init(|| ConsoleLogger);
        log::set_logger(logger).map(|()| log::set_max_level(level.to_level_filter()))
    }
}

/// Parses a configured level name, falling back to `Info`.
pub fn parse_level(name: &str) -> LevelFilter {
    name.trim().parse().unwrap_or(LevelFilter::Info)
}

/// Applies the configured level unless `RUST_LOG` already decides it.
pub fn apply_level(name: &str) {
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(parse_level(name));
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!(
                "[{} {}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
