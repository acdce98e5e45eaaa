//! # i386 register and instruction wrappers
//!
//! Typed views of the control registers the kernel touches (CR0, CR2, CR3,
//! EFLAGS) plus the handful of instructions that have no expression in
//! plain Rust: port I/O and `hlt`.
//!
//! Bit layouts are modelled with [`bitfield_struct`] so call sites read as
//! `cr0.with_paging(true)` instead of `cr0 | 0x8000_0000`. The raw
//! instruction wrappers only exist when compiling for `x86`; the layout
//! types are available everywhere so host tests can reason about them.
//!
//! All reads and writes of privileged registers are `unsafe`: they require
//! CPL0 and can take the machine down when misused (loading a bogus CR3,
//! enabling paging without a valid directory, and so on).

#![cfg_attr(not(any(test, doctest)), no_std)]

mod cr0;
mod cr2;
mod cr3;
mod eflags;
pub mod ports;

pub use cr0::Cr0;
pub use cr2::read_cr2;
pub use cr3::{read_cr3, write_cr3};
pub use eflags::Eflags;

/// Execute `hlt`: stop the CPU until the next interrupt.
///
/// With interrupts disabled this parks the CPU for good, which is exactly
/// what the panic path wants.
#[cfg(target_arch = "x86")]
#[inline]
pub fn halt() {
    unsafe { core::arch::asm!("hlt", options(nomem, nostack, preserves_flags)) }
}

/// Host stand-in so shared code paths compile in tests; spins instead.
#[cfg(not(target_arch = "x86"))]
#[inline]
pub fn halt() {
    core::hint::spin_loop();
}
