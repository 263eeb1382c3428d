//! Simple UEFI backend for the [`log`] crate.
//!
//! Records are written to the firmware text console, so anything logged at or below the configured level shows up
//! between menu redraws. Scanning failures that are not fatal are reported this way.

use core::fmt::Write;

use alloc::boxed::Box;
use log::{Level, Metadata, Record};
use uefi::{runtime, system::with_stdout};

/// A simple logging backend for UEFI.
pub struct UefiLogger {
    /// The most verbose level that is printed.
    level: Level,
}

impl Default for UefiLogger {
    fn default() -> Self {
        Self::new(Level::Info)
    }
}

impl UefiLogger {
    /// Constructs a new [`UefiLogger`] printing records up to `level`.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Constructs a new [`UefiLogger`], then immediately leaks it so that it can be used with `set_logger`.
    #[must_use = "Has no effect if the result is unused"]
    pub fn static_new(level: Level) -> &'static Self {
        Box::leak(Box::new(Self::new(level)))
    }
}

impl log::Log for UefiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let time = runtime::get_time().unwrap_or(runtime::Time::invalid());
            let level = record.level();
            let file = record.file().unwrap_or_default();
            let line = record.line().unwrap_or_default();
            let args = record.args();
            with_stdout(|stdout| {
                let _ = stdout.write_fmt(format_args!("[{time} {level} {file}:{line}] - {args}\n"));
            });
        }
    }

    fn flush(&self) {}
}
