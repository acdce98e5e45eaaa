//! 8259 programmable interrupt controller pair.
//!
//! The PC's two cascaded 8259s power up mapping IRQs 0–7 onto CPU vectors
//! 8–15, squarely on top of the exception range. [`remap`] moves them to
//! vectors 32–47 with the standard four-word initialization sequence, then
//! masks every line; drivers unmask what they actually serve.
//!
//! Wire protocol (each step separated by an I/O delay):
//!
//! | step | master (0x20/0x21) | slave (0xA0/0xA1) | meaning              |
//! |------|--------------------|-------------------|----------------------|
//! | ICW1 | 0x11 → cmd         | 0x11 → cmd        | init, expect ICW4    |
//! | ICW2 | 0x20 → data        | 0x28 → data       | vector offsets 32/40 |
//! | ICW3 | 0x04 → data        | 0x02 → data       | cascade on IRQ2      |
//! | ICW4 | 0x01 → data        | 0x01 → data       | 8086 mode            |
//! | mask | 0xFF → data        | 0xFF → data       | all lines off        |

use kernel_registers::ports::{inb, io_wait, outb};

const MASTER_COMMAND: u16 = 0x20;
const MASTER_DATA: u16 = 0x21;
const SLAVE_COMMAND: u16 = 0xA0;
const SLAVE_DATA: u16 = 0xA1;

/// ICW1: initialization, ICW4 follows.
const ICW1_INIT_ICW4: u8 = 0x11;
/// ICW4: 8086/88 mode.
const ICW4_8086: u8 = 0x01;
/// OCW2: non-specific end of interrupt.
const EOI: u8 = 0x20;

/// Remap the controllers to vectors 32–47 and mask every line.
///
/// # Safety
/// Reprograms live interrupt routing; must run with interrupts disabled,
/// before any line is unmasked, at CPL0.
pub unsafe fn remap() {
    unsafe {
        outb(MASTER_COMMAND, ICW1_INIT_ICW4);
        io_wait();
        outb(SLAVE_COMMAND, ICW1_INIT_ICW4);
        io_wait();

        // ICW2: vector offsets.
        outb(MASTER_DATA, 0x20);
        io_wait();
        outb(SLAVE_DATA, 0x28);
        io_wait();

        // ICW3: slave on master line 2; slave's cascade identity.
        outb(MASTER_DATA, 0x04);
        io_wait();
        outb(SLAVE_DATA, 0x02);
        io_wait();

        outb(MASTER_DATA, ICW4_8086);
        io_wait();
        outb(SLAVE_DATA, ICW4_8086);
        io_wait();

        // Everything masked until a driver asks otherwise.
        outb(MASTER_DATA, 0xFF);
        outb(SLAVE_DATA, 0xFF);
    }
}

/// Signal end-of-interrupt for a hardware line: always to the master,
/// additionally to the slave for lines ≥ 8. Lines ≥ 16 are ignored.
pub fn send_eoi(line: u8) {
    if line >= 16 {
        return;
    }
    unsafe {
        if line >= 8 {
            outb(SLAVE_COMMAND, EOI);
        }
        outb(MASTER_COMMAND, EOI);
    }
}

/// Mask (disable) a hardware line. Lines ≥ 16 are ignored.
///
/// # Safety
/// Silences a device; only call while reconfiguring its driver.
pub unsafe fn set_mask(line: u8) {
    let (port, bit) = match line {
        0..=7 => (MASTER_DATA, line),
        8..=15 => (SLAVE_DATA, line - 8),
        _ => return,
    };
    unsafe {
        let value = inb(port) | (1 << bit);
        outb(port, value);
    }
}

/// Unmask (enable) a hardware line. Lines ≥ 16 are ignored.
///
/// # Safety
/// The line's handler must be registered before interrupts start arriving.
pub unsafe fn clear_mask(line: u8) {
    let (port, bit) = match line {
        0..=7 => (MASTER_DATA, line),
        8..=15 => (SLAVE_DATA, line - 8),
        _ => return,
    };
    unsafe {
        let value = inb(port) & !(1 << bit);
        outb(port, value);
    }
}
