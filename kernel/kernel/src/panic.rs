//! Fatal-error sink.
//!
//! A panic is irreversible: interrupts go off and stay off, the report
//! goes out, the CPU halts. The report must arrive even when the kernel
//! is in an arbitrary state — heap corrupt, paging half-done, console
//! locks held by the very context that is panicking. So this module
//! trusts nothing: it steals the device locks instead of taking them,
//! writes bytes one at a time straight at the sinks, and renders numbers
//! with the stack-only emitters from `kernel-console`.
//!
//! Output discipline follows the hardware: the full report (banner,
//! location, message, register dump) goes to the serial sink; the VGA
//! gets the short form plus a pointer to serial.

use crate::drivers::{serial, vga};
use core::fmt::{self, Write};
use kernel_console::num::{write_hex, write_udec};
use kernel_console::ConsoleSink;
use kernel_interrupts::InterruptFrame;
use kernel_registers::halt;
use kernel_sync::irq;

const BANNER_LINE: &str =
    "================================================================================\n";
const BANNER_TITLE: &str =
    "!!!                          KERNEL PANIC                                   !!!\n";

/// Both outputs, no locks, no buffering.
///
/// Built exclusively from stolen sink references; see the module docs.
struct PanicSinks<'a> {
    vga: &'a mut vga::VgaConsole,
    serial: Option<&'a mut serial::SerialConsole>,
}

impl PanicSinks<'_> {
    fn both(&mut self, text: &str) {
        self.vga_only(text);
        self.serial_only(text);
    }

    fn vga_only(&mut self, text: &str) {
        self.vga.put_bytes(text.as_bytes());
    }

    fn serial_only(&mut self, text: &str) {
        if let Some(serial) = self.serial.as_deref_mut() {
            serial.put_bytes(text.as_bytes());
        }
    }

    fn serial_hex(&mut self, label: &str, value: u32, width: usize) {
        self.serial_only(label);
        if let Some(serial) = self.serial.as_deref_mut() {
            write_hex(serial, value, width);
        }
    }
}

/// `fmt::Write` façade over both sinks so the message renders through
/// `format_args!` while still reaching the hardware byte by byte.
impl Write for PanicSinks<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.both(s);
        Ok(())
    }
}

fn emit_header(sinks: &mut PanicSinks<'_>, file: &str, line: u32) {
    sinks.vga_only("\n\n!!! KERNEL PANIC !!!\n");
    sinks.serial_only("\n\n");
    sinks.serial_only(BANNER_LINE);
    sinks.serial_only(BANNER_TITLE);
    sinks.serial_only(BANNER_LINE);

    sinks.both("Location: ");
    sinks.both(file);
    sinks.both(":");
    write_udec(sinks.vga, line);
    if let Some(serial) = sinks.serial.as_deref_mut() {
        write_udec(serial, line);
    }
    sinks.both("\n");
}

fn emit_footer(sinks: &mut PanicSinks<'_>) {
    sinks.vga_only("\nSystem halted.\n");
    sinks.serial_only("\nSystem halted. CPU in halt state.\n");
    sinks.serial_only(BANNER_LINE);
}

/// Full register dump to serial, short summary to the screen.
fn emit_frame(sinks: &mut PanicSinks<'_>, frame: &InterruptFrame) {
    sinks.serial_only("\nCPU Register Dump:\n");

    sinks.serial_hex("  EIP: 0x", frame.eip, 8);
    sinks.serial_hex("  CS:  0x", frame.cs, 4);
    sinks.serial_hex("  EFLAGS: 0x", frame.eflags, 8);
    sinks.serial_only("\n");

    sinks.serial_hex("  EAX: 0x", frame.eax, 8);
    sinks.serial_hex("  EBX: 0x", frame.ebx, 8);
    sinks.serial_hex("  ECX: 0x", frame.ecx, 8);
    sinks.serial_hex("  EDX: 0x", frame.edx, 8);
    sinks.serial_only("\n");

    sinks.serial_hex("  ESP: 0x", frame.esp, 8);
    sinks.serial_hex("  EBP: 0x", frame.ebp, 8);
    sinks.serial_hex("  ESI: 0x", frame.esi, 8);
    sinks.serial_hex("  EDI: 0x", frame.edi, 8);
    sinks.serial_only("\n");

    sinks.serial_hex("  DS:  0x", frame.ds, 4);
    sinks.serial_hex("  SS:  0x", frame.ss, 4);
    sinks.serial_only("\n");

    sinks.serial_only("  INT: ");
    if let Some(serial) = sinks.serial.as_deref_mut() {
        write_udec(serial, frame.vector);
    }
    sinks.serial_hex("  ERR: 0x", frame.error_code, 8);
    sinks.serial_only("\n");

    sinks.vga_only("EIP: 0x");
    write_hex(sinks.vga, frame.eip, 8);
    sinks.vga_only("  ESP: 0x");
    write_hex(sinks.vga, frame.esp, 8);
    sinks.vga_only("\n(See serial for full dump)\n");
}

fn report(file: &str, line: u32, frame: Option<&InterruptFrame>, args: fmt::Arguments<'_>) -> ! {
    irq::disable_interrupts();

    // Safety: interrupts are off and this function never returns; stolen
    // access cannot race anything (see SpinLock::steal).
    let mut sinks = PanicSinks {
        vga: unsafe { vga::VGA.steal() },
        serial: if serial::is_enabled() {
            Some(unsafe { serial::SERIAL.steal() })
        } else {
            None
        },
    };

    emit_header(&mut sinks, file, line);

    sinks.both("Message: ");
    // Errors out of Display impls have nowhere better to go; the bytes
    // already written stand.
    let _ = sinks.write_fmt(args);
    sinks.both("\n");

    if let Some(frame) = frame {
        emit_frame(&mut sinks, frame);
    }

    emit_footer(&mut sinks);

    loop {
        halt();
    }
}

/// Fatal error at a source location.
pub fn fatal(file: &str, line: u32, args: fmt::Arguments<'_>) -> ! {
    report(file, line, None, args)
}

/// Fatal error with the interrupted CPU state.
pub fn fatal_with_frame(
    file: &str,
    line: u32,
    frame: &InterruptFrame,
    args: fmt::Arguments<'_>,
) -> ! {
    report(file, line, Some(frame), args)
}

/// Panic with the caller's source location.
#[macro_export]
macro_rules! kpanic {
    ($($arg:tt)*) => {
        $crate::panic::fatal(file!(), line!(), core::format_args!($($arg)*))
    };
}

/// Panic unless `condition` holds.
#[macro_export]
macro_rules! kassert {
    ($condition:expr, $($arg:tt)*) => {
        if !$condition {
            $crate::panic::fatal(
                file!(),
                line!(),
                core::format_args!(
                    "Assertion failed: {} - {}",
                    stringify!($condition),
                    core::format_args!($($arg)*)
                ),
            )
        }
    };
}
