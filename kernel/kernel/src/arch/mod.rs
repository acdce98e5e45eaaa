//! i386 descriptor tables and interrupt entry plumbing.

pub mod gdt;
pub mod idt;
pub mod stubs;

use kernel_interrupts::{DISPATCHER, InterruptFrame, PAGE_FAULT_VECTOR, PageFaultError};
use kernel_registers::read_cr2;

/// Register the CPU-exception handlers the core provides. Everything not
/// registered here panics with its mnemonic through the common entry.
pub fn install_exception_handlers() {
    DISPATCHER.register_exception(PAGE_FAULT_VECTOR as u8, page_fault_handler);
}

/// Vector 14: decode CR2 and the error code, then panic with the frame.
fn page_fault_handler(frame: &mut InterruptFrame) {
    // Safety: CPL0; CR2 is valid inside the #PF handler.
    let fault_address = unsafe { read_cr2() };
    let error = PageFaultError::from_bits(frame.error_code);
    crate::panic::fatal_with_frame(
        file!(),
        line!(),
        frame,
        format_args!(
            "Page Fault at {:#x} - {}",
            fault_address,
            error.explain()
        ),
    )
}
