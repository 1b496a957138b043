//! The serial logger. Every message goes to COM1, prefixed by a coloured tag for its level and
//! by the module that emitted it.
use crate::{
    config,
    x86_64::serial::{Com, Serial},
};
use core::fmt::Write;
use macros::init;
use sync::{Lazy, Spinlock};

pub static SERIAL: Lazy<Spinlock<Serial>> =
    Lazy::new(|| Spinlock::new(unsafe { Serial::new(Com::Com1) }));

struct Logger;

fn tag(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[1m\x1b[31m[!]\x1b[0m",
        log::Level::Warn => "\x1b[1m\x1b[33m[-]\x1b[0m",
        log::Level::Info => "\x1b[1m\x1b[32m[*]\x1b[0m",
        log::Level::Debug => "\x1b[1m\x1b[34m[#]\x1b[0m",
        log::Level::Trace => "\x1b[1m[~]\x1b[0m",
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // The lock keeps lines whole once several processors log
        let mut serial = SERIAL.lock();
        _ = writeln!(
            serial,
            "{} {}: {}",
            tag(record.level()),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Install the serial logger with the level from [`config::LOG_LEVEL`]. If a logger is already
/// installed, it is kept and only the level changes.
///
/// # Safety
/// A 16550 compatible UART must be present at COM1.
#[init]
pub unsafe fn setup() {
    if log::set_logger(&Logger).is_err() {
        log::warn!("A logger is already installed, keeping it");
    }
    log::set_max_level(config::LOG_LEVEL);
}

/// Release the serial port lock so a panic handler can still log, even if the panic happened
/// while a message was being written.
///
/// # Safety
/// Only the panicking processor may log after this call.
#[cold]
pub unsafe fn on_panic() {
    SERIAL.force_unlock();
}
