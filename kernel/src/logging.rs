//! Kernel logging facility
//!
//! Routes the `log` crate to COM1. Every record carries the timer tick count
//! so boot-time ordering is visible in the console capture. Log levels are
//! configured based on build configuration (debug/release).

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

use crate::interrupts::ticks;

/// Global logger instance available throughout the kernel
pub static LOGGER: Logger = Logger::new();

/// Serializes whole records so lines from different flows never interleave
pub struct Logger {
    inner: Mutex<()>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a new logger instance
    pub const fn new() -> Logger {
        Logger {
            inner: Mutex::new(()),
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    /// Formats messages as "[ticks][LEVEL] message"
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _guard = self.inner.lock();
            crate::console_println!("[{:>6}][{}] {}", ticks(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Level used when nothing overrides it: Debug for debug builds, Info for release.
pub const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Installs [`LOGGER`] as the `log` backend.
///
/// Fails if a logger was already installed; the existing one stays in place.
pub fn init() -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(default_level());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_follows_build_profile() {
        #[cfg(debug_assertions)]
        assert_eq!(default_level(), LevelFilter::Debug);
        #[cfg(not(debug_assertions))]
        assert_eq!(default_level(), LevelFilter::Info);
    }
}
