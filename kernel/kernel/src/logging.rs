//! Console logging: the `log` facade over the VGA and serial sinks.
//!
//! Records render as `[LEVEL] target: message`. The VGA always shows
//! them; serial mirrors them when `earlycon` enabled it. Ordinary
//! `kprint!`/`kprintln!` output takes the same path without the level
//! prefix.

use crate::drivers::{serial, vga};
use core::fmt;
use kernel_console::{ConsoleSink, SinkWriter};
use log::{LevelFilter, Log, Metadata, Record};

/// Sink fanning bytes out to the screen and (when enabled) the UART.
///
/// Each fragment takes the device locks with interrupts masked, so output
/// from tasks and interrupt context never tears mid-fragment.
struct ConsoleFanout;

impl ConsoleSink for ConsoleFanout {
    fn put_byte(&mut self, byte: u8) {
        self.put_bytes(&[byte]);
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        let mut vga = vga::VGA.lock_irq();
        for &b in bytes {
            vga.put_char(b);
        }
        if serial::is_enabled() {
            let mut serial = serial::SERIAL.lock_irq();
            for &b in bytes {
                serial.put_char(b);
            }
        }
    }
}

/// Write formatted text to the console (and serial, when enabled).
pub fn console_write(args: fmt::Arguments<'_>) {
    SinkWriter::new(ConsoleFanout).write(args);
}

/// Plain console output.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::logging::console_write(core::format_args!($($arg)*))
    };
}

/// Plain console output, newline-terminated.
#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint!("\n") };
    ($($arg:tt)*) => {
        $crate::logging::console_write(core::format_args!("{}\n", core::format_args!($($arg)*)))
    };
}

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        console_write(format_args!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

/// Install the console logger. Call once, after the VGA is usable.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}
