//! # Kernel synchronization primitives
//!
//! A spin lock and an interrupt guard, and their composition.
//!
//! On a single-CPU kernel whose only preemption source is the timer
//! interrupt, disabling interrupts *is* the mutual-exclusion primitive.
//! The spin lock on its own protects data shared between ordinary kernel
//! paths; any state also touched from interrupt context must be taken via
//! [`SpinLock::lock_irq`], which masks interrupts first so the handler can
//! never spin on a lock its own CPU already holds.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod irq;
mod spin_lock;

pub use irq::IrqGuard;
pub use spin_lock::{IrqLockGuard, SpinLock, SpinLockGuard};
