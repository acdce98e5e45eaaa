//! Interrupt entry stubs.
//!
//! One tiny naked stub per vector normalizes the stack — vectors the CPU
//! gives no error code get a zero placeholder — and funnels into
//! [`interrupt_common`], which materializes the shared
//! [`InterruptFrame`] layout, switches to kernel data segments, and calls
//! the Rust-side [`interrupt_entry`].
//!
//! On the way out the frame is popped back into the CPU. A handler that
//! rewrote the frame therefore rewrites the interrupted context; that is
//! the scheduler's context-switch mechanism, so the save/restore order
//! here and the field order of `InterruptFrame` must never drift apart.

use kernel_info::segments;
use kernel_interrupts::{DISPATCHER, Dispatch, InterruptFrame};

/// Stub for a vector where the CPU pushes no error code: push the zero
/// placeholder, then the vector.
macro_rules! stub {
    ($name:ident, $vector:literal) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            core::arch::naked_asm!(
                "push 0",
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym interrupt_common,
            )
        }
    };
}

/// Stub for a vector where the CPU already pushed an error code.
macro_rules! stub_with_error_code {
    ($name:ident, $vector:literal) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            core::arch::naked_asm!(
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym interrupt_common,
            )
        }
    };
}

// CPU exceptions 0-31. The CPU pushes an error code for 8, 10-14 and 17;
// everything else gets the placeholder.
stub!(isr0, 0);
stub!(isr1, 1);
stub!(isr2, 2);
stub!(isr3, 3);
stub!(isr4, 4);
stub!(isr5, 5);
stub!(isr6, 6);
stub!(isr7, 7);
stub_with_error_code!(isr8, 8);
stub!(isr9, 9);
stub_with_error_code!(isr10, 10);
stub_with_error_code!(isr11, 11);
stub_with_error_code!(isr12, 12);
stub_with_error_code!(isr13, 13);
stub_with_error_code!(isr14, 14);
stub!(isr15, 15);
stub!(isr16, 16);
stub_with_error_code!(isr17, 17);
stub!(isr18, 18);
stub!(isr19, 19);
stub!(isr20, 20);
stub!(isr21, 21);
stub!(isr22, 22);
stub!(isr23, 23);
stub!(isr24, 24);
stub!(isr25, 25);
stub!(isr26, 26);
stub!(isr27, 27);
stub!(isr28, 28);
stub!(isr29, 29);
stub!(isr30, 30);
stub!(isr31, 31);

// Remapped hardware lines 0-15 on vectors 32-47.
stub!(irq0, 32);
stub!(irq1, 33);
stub!(irq2, 34);
stub!(irq3, 35);
stub!(irq4, 36);
stub!(irq5, 37);
stub!(irq6, 38);
stub!(irq7, 39);
stub!(irq8, 40);
stub!(irq9, 41);
stub!(irq10, 42);
stub!(irq11, 43);
stub!(irq12, 44);
stub!(irq13, 45);
stub!(irq14, 46);
stub!(irq15, 47);

/// Entry-stub addresses, indexed by vector, for the IDT.
pub static STUB_TABLE: [extern "C" fn(); 48] = [
    isr0, isr1, isr2, isr3, isr4, isr5, isr6, isr7, isr8, isr9, isr10, isr11, isr12, isr13,
    isr14, isr15, isr16, isr17, isr18, isr19, isr20, isr21, isr22, isr23, isr24, isr25, isr26,
    isr27, isr28, isr29, isr30, isr31, irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7, irq8,
    irq9, irq10, irq11, irq12, irq13, irq14, irq15,
];

/// Shared save/dispatch/restore sequence.
///
/// After the stub's pushes the stack holds `vector`, `error code` and the
/// CPU's `eip/cs/eflags[/esp/ss]`. `pusha` and the data-segment push
/// complete the [`InterruptFrame`] layout; `esp` then *is* a pointer to
/// the frame and is passed as the cdecl argument.
#[unsafe(naked)]
extern "C" fn interrupt_common() {
    core::arch::naked_asm!(
        "pusha",

        // Save the interrupted data segment, switch to kernel data.
        "xor eax, eax",
        "mov ax, ds",
        "push eax",
        "mov ax, {kernel_data}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",

        // interrupt_entry(&mut frame)
        "push esp",
        "call {entry}",
        "add esp, 4",

        // Reload the (possibly rewritten) data segment and registers.
        "pop eax",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "popa",

        // Drop vector + error code, return into the frame's context.
        "add esp, 8",
        "iretd",

        kernel_data = const segments::KERNEL_DATA,
        entry = sym interrupt_entry,
    )
}

/// Rust side of every interrupt: route hardware vectors through the IRQ
/// tables (which issue EOI), everything else through the exception
/// tables. An exception nobody handles is fatal.
extern "C" fn interrupt_entry(frame: &mut InterruptFrame) {
    if frame.irq_line().is_some() {
        DISPATCHER.dispatch_irq(frame);
        return;
    }

    match DISPATCHER.dispatch_exception(frame) {
        Dispatch::Handled => {}
        Dispatch::Unhandled { vector, mnemonic } => crate::panic::fatal_with_frame(
            file!(),
            line!(),
            frame,
            format_args!("Unhandled CPU Exception: {} (INT {})", mnemonic, vector),
        ),
    }
}
