//! # Diagnostic console plumbing
//!
//! The kernel talks to the operator through *byte sinks*: the VGA text
//! buffer, the COM1 UART, or a plain byte buffer. [`ConsoleSink`] is the
//! common seam — one method, one byte at a time — so identical formatting
//! code serves all three, and the panic path can bypass everything else
//! and push bytes straight at the hardware.
//!
//! Two formatting layers sit on top:
//!
//! - [`SinkWriter`] adapts any sink to [`core::fmt::Write`], counting the
//!   bytes it emits, so ordinary output uses `format_args!` like the rest
//!   of the Rust world.
//! - [`num`] holds heap-free, stack-only decimal/hex emitters used by the
//!   panic path, which must keep working when nothing else can be trusted.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod fmt;
pub mod num;
mod sink;

pub use fmt::{SinkWriter, write_into};
pub use sink::{BufferSink, ConsoleSink, NullSink};
