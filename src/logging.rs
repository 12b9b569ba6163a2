//! Stderr backend for the `log` facade.
//!
//! The library itself only emits through `log::*` macros; binaries and tests
//! call [`init`] once to see the output.

use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;

/// Log levels, from silent to everything
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Nothing = 0,
    User = 1,
    Error = 2,
    Warning = 3,
    Info = 4,
    Debug = 5,
    All = 6,
}

impl LogLevel {
    /// Create a LogLevel from an integer
    pub fn from_i32(level: i32) -> Self {
        match level {
            i32::MIN..=0 => LogLevel::Nothing,
            1 => LogLevel::User,
            2 => LogLevel::Error,
            3 => LogLevel::Warning,
            4 => LogLevel::Info,
            5 => LogLevel::Debug,
            _ => LogLevel::All,
        }
    }

    /// Level for a count of `-v` flags, starting from warnings
    pub fn from_verbosity(count: u8) -> Self {
        Self::from_i32(LogLevel::Warning as i32 + i32::from(count))
    }

    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Nothing => LevelFilter::Off,
            LogLevel::User | LogLevel::Error => LevelFilter::Error,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::All => LevelFilter::Trace,
        }
    }
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        let _ = writeln!(out, "[{:<5} {}] {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: StderrLogger = StderrLogger;

/// Install the stderr logger at `level`
///
/// Returns `false` (and changes nothing) if a logger is already installed.
pub fn init(level: LogLevel) -> bool {
    if log::set_logger(&LOGGER).is_err() {
        return false;
    }
    log::set_max_level(level.as_filter());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_from_i32() {
        assert_eq!(LogLevel::from_i32(-3), LogLevel::Nothing);
        assert_eq!(LogLevel::from_i32(3), LogLevel::Warning);
        assert_eq!(LogLevel::from_i32(42), LogLevel::All);
    }

    #[test]
    fn test_from_verbosity() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Warning);
        assert_eq!(LogLevel::from_verbosity(1), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(2), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(9), LogLevel::All);
    }

    #[test]
    fn test_filters() {
        assert_eq!(LogLevel::Nothing.as_filter(), LevelFilter::Off);
        assert_eq!(LogLevel::User.as_filter(), LevelFilter::Error);
        assert_eq!(LogLevel::Warning.as_filter(), LevelFilter::Warn);
        assert_eq!(LogLevel::All.as_filter(), LevelFilter::Trace);
    }

    #[test]
    #[serial]
    fn test_second_init_is_noop() {
        let first = init(LogLevel::Info);
        let level = log::max_level();
        assert!(!init(LogLevel::All));
        assert_eq!(log::max_level(), level);
        if first {
            assert_eq!(level, LevelFilter::Info);
        }
        log::info!("logging test message");
    }
}
