//! # Interrupt dispatch
//!
//! The machinery between the CPU's 256 vectors and the kernel's typed
//! handlers:
//!
//! - [`InterruptFrame`] — the register snapshot every handler sees, with a
//!   layout fixed against the assembly entry stubs.
//! - [`Dispatcher`] — the handler tables. Vectors 0–31 are CPU exceptions;
//!   32–47 are the hardware lines remapped from the two cascaded 8259
//!   controllers; the rest are reserved.
//! - [`pic`] — the 8259 wire protocol (remap, end-of-interrupt, masks).
//! - [`pit`] — the 8254 channel-0 periodic timer and its tick sink.
//!
//! ## Flow of a hardware interrupt
//!
//! ```text
//! device ─▶ 8259 ─▶ CPU vector 32+n ─▶ asm stub ─▶ Dispatcher::dispatch_irq
//!                                                    │ 1. registered handler
//!                                                    │ 2. EOI to the PIC(s)
//!                                                    ▼
//!                                       iretd from the (possibly rewritten)
//!                                       InterruptFrame
//! ```
//!
//! Handlers run before end-of-interrupt is issued, and the frame they are
//! handed is live: whatever they leave in it is what `iretd` reloads. That
//! property is the entire context-switch mechanism of the scheduler.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod dispatch;
mod exceptions;
mod frame;
pub mod pic;
pub mod pit;

pub use dispatch::{
    DISPATCHER, Dispatch, Dispatcher, ExceptionHandler, IrqFrameHandler, IrqHandler,
};
pub use exceptions::{PageFaultError, exception_mnemonic};
pub use frame::InterruptFrame;

/// First CPU vector of the remapped hardware lines.
pub const IRQ_BASE_VECTOR: u32 = 32;

/// Number of hardware interrupt lines behind the two 8259s.
pub const IRQ_LINES: usize = 16;

/// Hardware line of the periodic timer.
pub const IRQ_TIMER: u8 = 0;

/// Hardware line of the PS/2 keyboard.
pub const IRQ_KEYBOARD: u8 = 1;

/// CPU vector of the page-fault exception.
pub const PAGE_FAULT_VECTOR: u32 = 14;
