//! # Round-robin task scheduling
//!
//! Kernel-mode preemptive multitasking, driven entirely by the periodic
//! timer. There is no hand-rolled context switcher: the timer interrupt's
//! saved-then-restored register frame *is* the context, and a switch is a
//! field-by-field copy between a task's saved [`CpuContext`] and the live
//! [`InterruptFrame`](kernel_interrupts::InterruptFrame). Whatever the
//! frame holds when the handler returns is what `iretd` resumes.
//!
//! ```text
//!        timer tick (IRQ 0)
//!             │
//!             ▼
//!   Scheduler::preempt(frame)
//!     1. frame ──copy──► current.context    (save)
//!     2. current: Running → Ready, requeue
//!     3. next = ready queue head
//!     4. next.context ──copy──► frame       (restore)
//!             │
//!             ▼
//!        iretd resumes `next`
//! ```
//!
//! Task lifecycle: `Ready ⇄ Running`, `Running → Blocked` (explicit),
//! `Blocked → Ready` (unblock), `Running → Terminated` (exit; evicted on
//! the next tick and never requeued). Identifier 0 is the idle task: the
//! boot context itself, adopted at init.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod queue;
mod scheduler;
mod task;

pub use queue::ReadyQueue;
pub use scheduler::{Scheduler, SpawnError};
pub use task::{
    CpuContext, DEFAULT_TIMESLICE, TASK_NAME_LEN, TaskControlBlock, TaskMode, TaskState,
    prepare_initial_stack,
};
