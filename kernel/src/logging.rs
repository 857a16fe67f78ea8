use core::fmt::Write;
use core::sync::atomic::{AtomicU8, Ordering};
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

use crate::arch::selectors;
use crate::arch::x86::{self, CPU};
use crate::arch::x86::serial::SERIAL;
use crate::sync::without_interrupts;

pub struct SerialLogger {
    log_level_int: AtomicU8,
}

// Table of log levels corresponding ANSI colour codes
const LOG_LEVEL_COLOURS: [&str; 6] = [
    "\x1b[0m",  // Off
    "\x1b[31m", // Error
    "\x1b[33m", // Warn
    "\x1b[32m", // Info
    "\x1b[34m", // Debug
    "\x1b[36m", // Trace
];

const RESET_COLOUR: &str = "\x1b[0m";

impl SerialLogger {
    fn get_log_level(&self) -> LevelFilter {
        match self.log_level_int.load(Ordering::Relaxed) {
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            5 => LevelFilter::Trace,
            _ => LevelFilter::Off,
        }
    }

    fn set_log_level(&self, level: LevelFilter) {
        self.log_level_int.store(level as u8, Ordering::Relaxed);
    }

    fn get_log_colour(&self, level: Level) -> &'static str {
        LOG_LEVEL_COLOURS
            .get(level as usize)
            .copied()
            .unwrap_or(RESET_COLOUR)
    }
}

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // writing a record masks interrupts, which faults in ring 3
        metadata.level() <= self.get_log_level()
            && selectors::may_mask_interrupts(x86::read_cs() as u32)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let colour = self.get_log_colour(record.level());

        // the timer handler logs too; holding the port with IRQ0 live would deadlock
        without_interrupts(&CPU, || {
            let mut serial = SERIAL.lock();
            // the port never reports an error
            let _ = writeln!(
                serial,
                "{}[{}] - {}: {}{}",
                colour,
                record.level(),
                record.target(),
                record.args(),
                RESET_COLOUR
            );
        });
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger {
    log_level_int: AtomicU8::new(LevelFilter::Info as u8),
};

pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Trace))?;
    LOGGER.set_log_level(level);

    Ok(())
}

pub fn set_level(level: LevelFilter) {
    LOGGER.set_log_level(level);
    log::info!("Log level set to {}", level);
}
