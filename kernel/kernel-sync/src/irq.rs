//! Interrupt masking as an RAII affair.
//!
//! `cli`/`sti` are the i386 critical-section primitive on a single CPU.
//! [`IrqGuard`] snapshots the IF bit of EFLAGS, disables interrupts, and
//! restores the *previous* state on drop — nesting guards therefore works
//! and never enables interrupts earlier than the outermost scope intended.
//!
//! Host builds (unit tests) have no interrupt flag; there the guard is
//! inert and `interrupts_enabled` reports `false`.

use kernel_registers::Eflags;

/// Disable maskable interrupts (`cli`).
///
/// Must only run in a context where `cli` is legal (CPL0).
#[cfg(target_arch = "x86")]
#[inline]
pub fn disable_interrupts() {
    unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
}

/// Enable maskable interrupts (`sti`).
///
/// Must only run in a context where `sti` is legal (CPL0).
#[cfg(target_arch = "x86")]
#[inline]
pub fn enable_interrupts() {
    unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
}

#[cfg(not(target_arch = "x86"))]
#[inline]
pub fn disable_interrupts() {}

#[cfg(not(target_arch = "x86"))]
#[inline]
pub fn enable_interrupts() {}

/// Whether maskable interrupts are currently enabled (EFLAGS.IF).
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    Eflags::read().interrupt_enable()
}

/// RAII guard: disables interrupts on creation, restores the prior state on
/// drop.
///
/// Only issues `sti` on drop if interrupts were enabled when the guard was
/// created, so nested guards compose.
pub struct IrqGuard {
    /// IF state at guard creation.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let were_enabled = interrupts_enabled();
        if were_enabled {
            disable_interrupts();
        }
        Self { were_enabled }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            enable_interrupts();
        }
    }
}
