//! Scheduler wiring: the global scheduler instance, the timer tick sink,
//! the task trampoline, and the task-facing API.
//!
//! Locking discipline: the tick sink runs inside the timer ISR with
//! interrupts already masked and takes the plain lock; every other path
//! runs with interrupts enabled and must use `lock_irq`, so an ISR can
//! never spin on a lock its own CPU holds.

use core::ptr::NonNull;
use kernel_interrupts::{InterruptFrame, pit};
use kernel_registers::halt;
use kernel_sched::{Scheduler, SpawnError, TaskControlBlock, TaskMode};
use kernel_sync::{SpinLock, irq};

use crate::kpanic;
use crate::memory::{self, PageBacking};

static SCHEDULER: SpinLock<Scheduler> = SpinLock::new(Scheduler::new());

/// Adopt the boot context as the idle task (identifier 0).
pub fn init() {
    let mut sched = SCHEDULER.lock_irq();
    let mut heap = memory::HEAP.lock_irq();
    if let Err(e) =
        sched.adopt_boot_context(&mut *heap, &mut PageBacking, memory::kernel_directory())
    {
        kpanic!("cannot create the idle task: {}", e);
    }
    log::info!("task management initialized (task 0: idle)");
}

/// Route timer ticks into the scheduler.
pub fn attach_timer() {
    pit::TIMER.set_tick_sink(tick_sink);
}

/// The tick sink: runs in the timer ISR, before EOI, with the live frame.
fn tick_sink(frame: &mut InterruptFrame) {
    SCHEDULER.lock().preempt(frame);
}

/// First instructions of every task.
///
/// The synthetic interrupt frame leaves the stack pointer at the word
/// holding the entry function; pick it up, enable interrupts, run it, and
/// treat returning as exiting.
#[unsafe(naked)]
extern "C" fn task_trampoline() {
    core::arch::naked_asm!(
        "sti",
        "pop eax",
        "test eax, eax",
        "jz 2f",
        "call eax",
        "2:",
        "call {exit}",
        exit = sym trampoline_exit,
    )
}

extern "C" fn trampoline_exit() -> ! {
    exit_current()
}

/// Create a kernel-mode task running `entry`.
pub fn spawn(name: &str, entry: extern "C" fn()) -> Result<NonNull<TaskControlBlock>, SpawnError> {
    let mut sched = SCHEDULER.lock_irq();
    let mut heap = memory::HEAP.lock_irq();
    let task = sched.spawn(
        &mut *heap,
        &mut PageBacking,
        name,
        entry as u32,
        task_trampoline as u32,
        TaskMode::Kernel,
        memory::kernel_directory(),
    )?;
    log::info!("created task {} ({})", unsafe { task.as_ref().id }, name);
    Ok(task)
}

/// Let timer ticks switch contexts from now on.
pub fn enable() {
    SCHEDULER.lock_irq().enable();
}

/// Give up the rest of the slice: wait for the next tick to reschedule.
#[allow(dead_code)]
pub fn yield_now() {
    halt();
}

/// Park the current task until someone unblocks it.
#[allow(dead_code)]
pub fn block_current() {
    SCHEDULER.lock_irq().block_current();
    yield_now();
}

/// Return a blocked task to the rotation.
///
/// # Safety
/// `task` must be a TCB obtained from [`spawn`] that has not been
/// destroyed.
#[allow(dead_code)]
pub unsafe fn unblock(task: NonNull<TaskControlBlock>) {
    // Safety: forwarded contract.
    unsafe { SCHEDULER.lock_irq().unblock(task.as_ptr()) };
}

/// Terminate the current task. The next tick evicts it; until then, halt
/// with interrupts enabled so that tick can arrive.
pub fn exit_current() -> ! {
    SCHEDULER.lock_irq().exit_current();
    irq::enable_interrupts();
    loop {
        halt();
    }
}
