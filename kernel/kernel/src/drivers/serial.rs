//! COM1 serial console, 38400 8N1.
//!
//! The early/diagnostic channel: everything mirrored here survives a
//! wedged VGA and is what QEMU captures with `-serial`. Off by default;
//! the `earlycon` command-line flag turns it on. While disabled the sink
//! swallows bytes, so callers never branch.

use core::sync::atomic::{AtomicBool, Ordering};
use kernel_console::ConsoleSink;
use kernel_registers::ports::{inb, outb};
use kernel_sync::SpinLock;

const COM1: u16 = 0x3F8;

/// Line-status bit: transmit holding register empty.
const LSR_TRANSMIT_EMPTY: u8 = 0x20;

pub struct SerialConsole {
    initialized: bool,
}

/// The one COM1 port.
pub static SERIAL: SpinLock<SerialConsole> = SpinLock::new(SerialConsole { initialized: false });

static ENABLED: AtomicBool = AtomicBool::new(false);

impl SerialConsole {
    /// Program the UART: divisor 3 (38400 baud), 8N1, FIFO on.
    fn init(&mut self) {
        // Safety: standard COM1 bring-up sequence on its well-known ports.
        unsafe {
            outb(COM1 + 1, 0x00); // disable UART interrupts
            outb(COM1 + 3, 0x80); // DLAB on: next two writes set the divisor
            outb(COM1, 0x03); // divisor low: 38400 baud
            outb(COM1 + 1, 0x00); // divisor high
            outb(COM1 + 3, 0x03); // 8 bits, no parity, one stop bit
            outb(COM1 + 2, 0xC7); // FIFO on, cleared, 14-byte threshold
            outb(COM1 + 4, 0x0B); // IRQs enabled, RTS/DSR set
        }
        self.initialized = true;
    }

    fn wait_for_transmitter(&self) {
        // Safety: status read from the COM1 line-status register.
        while unsafe { inb(COM1 + 5) } & LSR_TRANSMIT_EMPTY == 0 {
            core::hint::spin_loop();
        }
    }

    pub fn put_char(&mut self, byte: u8) {
        if !self.initialized {
            return;
        }
        // Terminals want CRLF.
        if byte == b'\n' {
            self.wait_for_transmitter();
            // Safety: data write to COM1.
            unsafe { outb(COM1, b'\r') };
        }
        self.wait_for_transmitter();
        // Safety: data write to COM1.
        unsafe { outb(COM1, byte) };
    }
}

impl ConsoleSink for SerialConsole {
    fn put_byte(&mut self, byte: u8) {
        self.put_char(byte);
    }
}

/// Bring the port up and route console output to it (the `earlycon`
/// path).
pub fn enable() {
    SERIAL.lock().init();
    ENABLED.store(true, Ordering::Release);
}

/// Whether serial output is active.
#[must_use]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Acquire)
}
