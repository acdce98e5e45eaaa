use crate::{
    DEFAULT_TIMESLICE, ReadyQueue, TaskControlBlock, TaskMode, TaskState, prepare_initial_stack,
};
use core::ptr::{NonNull, null_mut};
use kernel_alloc::{HeapBacking, KernelHeap};
use kernel_info::memory::TASK_STACK_SIZE;
use kernel_interrupts::InterruptFrame;
use kernel_memory_addresses::PhysicalAddress;

/// Task creation failure.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum SpawnError {
    /// The heap could not provide the TCB or the kernel stack.
    #[error("out of memory creating a task")]
    OutOfMemory,
}

/// The round-robin scheduler.
///
/// # Invariants
/// - After [`adopt_boot_context`](Self::adopt_boot_context), `current` is
///   never null and exactly one task is Running.
/// - The ready queue holds exactly the Ready tasks; the Running task is
///   not among them.
/// - A Terminated task is never requeued.
///
/// All mutation happens either inside the timer interrupt (via
/// [`preempt`](Self::preempt)) or with interrupts disabled; the owner
/// wraps the scheduler in an interrupt-masking lock.
pub struct Scheduler {
    current: *mut TaskControlBlock,
    queue: ReadyQueue,
    next_id: u32,
    enabled: bool,
}

// Safety: raw TCB pointers are only dereferenced under the owner's lock.
unsafe impl Send for Scheduler {}

impl Scheduler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: null_mut(),
            queue: ReadyQueue::new(),
            next_id: 1,
            enabled: false,
        }
    }

    /// Wrap the boot context in the idle task (identifier 0) and make it
    /// current. Kernel stack 0 means "the boot stack".
    pub fn adopt_boot_context<B: HeapBacking>(
        &mut self,
        heap: &mut KernelHeap,
        backing: &mut B,
        page_directory: PhysicalAddress,
    ) -> Result<(), SpawnError> {
        let tcb = heap
            .alloc(size_of::<TaskControlBlock>(), backing)
            .ok_or(SpawnError::OutOfMemory)?
            .cast::<TaskControlBlock>();
        // Safety: fresh, correctly sized heap memory.
        unsafe {
            tcb.as_ptr().write(TaskControlBlock::new(
                0,
                "idle",
                TaskState::Running,
                TaskMode::Kernel,
                page_directory,
            ));
        }
        self.current = tcb.as_ptr();
        Ok(())
    }

    /// Create a task: TCB plus an 8 KiB kernel stack carrying a synthetic
    /// interrupt frame that resumes at `trampoline`, which in turn calls
    /// `entry_point`. The task is enqueued Ready.
    pub fn spawn<B: HeapBacking>(
        &mut self,
        heap: &mut KernelHeap,
        backing: &mut B,
        name: &str,
        entry_point: u32,
        trampoline: u32,
        mode: TaskMode,
        page_directory: PhysicalAddress,
    ) -> Result<NonNull<TaskControlBlock>, SpawnError> {
        let tcb = heap
            .alloc(size_of::<TaskControlBlock>(), backing)
            .ok_or(SpawnError::OutOfMemory)?
            .cast::<TaskControlBlock>();

        let Some(stack) = heap.alloc(TASK_STACK_SIZE, backing) else {
            heap.free(tcb.as_ptr().cast());
            return Err(SpawnError::OutOfMemory);
        };

        let id = self.next_id;
        self.next_id += 1;

        let mut task = TaskControlBlock::new(id, name, TaskState::Ready, mode, page_directory);
        task.kernel_stack = stack.as_ptr() as usize;

        // Safety: the stack allocation is TASK_STACK_SIZE bytes, 16-byte
        // aligned, exclusively ours.
        let words = unsafe {
            core::slice::from_raw_parts_mut(stack.as_ptr().cast::<u32>(), TASK_STACK_SIZE / 4)
        };
        let frame_base = prepare_initial_stack(words, entry_point, trampoline, mode);

        // Mirror the synthetic frame so the first switch installs it
        // verbatim.
        let c = &mut task.context;
        c.esp = (task.kernel_stack + frame_base * 4) as u32;
        c.eip = trampoline;
        c.cs = words[frame_base + 12];
        c.ds = words[frame_base];
        c.es = c.ds;
        c.fs = c.ds;
        c.gs = c.ds;
        c.eflags = words[frame_base + 13];
        if mode == TaskMode::User {
            c.user_esp = 0xC000_0000;
            c.ss = words[frame_base];
        }

        // Safety: fresh, correctly sized heap memory.
        unsafe {
            tcb.as_ptr().write(task);
            self.queue.push(tcb.as_ptr());
        }
        Ok(tcb)
    }

    /// Release a task's kernel stack and TCB back to the heap.
    ///
    /// # Safety
    /// `task` must come from [`spawn`](Self::spawn) on this scheduler, be
    /// neither current nor queued, and never be used again.
    pub unsafe fn destroy(&mut self, heap: &mut KernelHeap, task: *mut TaskControlBlock) {
        if task.is_null() {
            return;
        }
        // Safety: valid TCB per the caller's contract.
        unsafe {
            let stack = (*task).kernel_stack;
            if stack != 0 {
                heap.free(stack as *mut u8);
            }
            heap.free(task.cast());
        }
    }

    /// Let timer ticks actually switch contexts from now on.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The Running task, once the boot context is adopted.
    #[must_use]
    pub fn current(&self) -> Option<NonNull<TaskControlBlock>> {
        NonNull::new(self.current)
    }

    /// The timer tick entry: save the interrupted context, rotate the
    /// ready queue, restore the next context into the live frame.
    ///
    /// Runs inside the timer ISR. Does nothing until the scheduler is
    /// enabled and the boot context is adopted.
    pub fn preempt(&mut self, frame: &mut InterruptFrame) {
        if !self.enabled || self.current.is_null() {
            return;
        }

        // Safety: `current` is a valid TCB whenever non-null; queued
        // pointers likewise (scheduler owns all TCBs).
        unsafe {
            let current = &mut *self.current;
            match current.state {
                TaskState::Running => {
                    current.save_context(frame);
                    current.state = TaskState::Ready;
                    current.timeslice = current.timeslice.saturating_sub(1);
                    if current.timeslice == 0 {
                        current.timeslice = DEFAULT_TIMESLICE;
                    }
                    self.queue.push(self.current);
                }
                // Terminated: context is garbage to us, and the task must
                // never run again. Blocked: parked off-queue by
                // block_current; nothing to save either.
                TaskState::Terminated | TaskState::Blocked | TaskState::Ready => {}
            }

            let next = self.queue.pop();
            if next.is_null() {
                // Nobody else to run; keep going with what we have.
                (*self.current).state = TaskState::Running;
                return;
            }

            let previous_directory = (*self.current).page_directory;
            self.current = next;
            let next = &mut *next;
            next.state = TaskState::Running;
            next.timeslice = DEFAULT_TIMESLICE;

            if next.page_directory != previous_directory {
                kernel_vmem::activate(next.page_directory);
            }

            next.restore_context(frame);
        }
    }

    /// Park the Running task; it leaves the rotation until
    /// [`unblock`](Self::unblock). The caller is expected to yield.
    pub fn block_current(&mut self) {
        if !self.enabled || self.current.is_null() {
            return;
        }
        // Safety: `current` is a valid TCB whenever non-null.
        unsafe {
            (*self.current).state = TaskState::Blocked;
        }
    }

    /// Return a Blocked task to the rotation. Tasks in any other state
    /// are left alone.
    ///
    /// # Safety
    /// `task` must be a valid TCB owned by this scheduler.
    pub unsafe fn unblock(&mut self, task: *mut TaskControlBlock) {
        if task.is_null() {
            return;
        }
        // Safety: valid TCB per the caller's contract.
        unsafe {
            if (*task).state == TaskState::Blocked {
                (*task).state = TaskState::Ready;
                self.queue.push(task);
            }
        }
    }

    /// Mark the Running task Terminated. The next tick evicts it; the
    /// caller halts until then.
    pub fn exit_current(&mut self) {
        if self.current.is_null() {
            return;
        }
        // Safety: `current` is a valid TCB whenever non-null.
        unsafe {
            (*self.current).state = TaskState::Terminated;
        }
    }

    /// Ready-queue length; diagnostics and tests.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.queue.len()
    }

    /// Whether a task is linked into the ready queue; diagnostics and
    /// tests.
    #[must_use]
    pub fn is_queued(&self, task: *const TaskControlBlock) -> bool {
        self.queue.contains(task)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_alloc::HeapError;
    use std::alloc::{Layout, alloc_zeroed, dealloc};

    const PAGE: usize = 4096;

    struct Arena {
        base: *mut u8,
        layout: Layout,
    }

    impl Arena {
        fn new(bytes: usize) -> Self {
            let layout = Layout::from_size_align(bytes, PAGE).unwrap();
            let base = unsafe { alloc_zeroed(layout) };
            assert!(!base.is_null());
            Self { base, layout }
        }
    }

    impl Drop for Arena {
        fn drop(&mut self) {
            unsafe { dealloc(self.base, self.layout) };
        }
    }

    struct ArenaBacking {
        start: usize,
        end: usize,
    }

    impl HeapBacking for ArenaBacking {
        fn provide_page(&mut self, addr: usize) -> Result<(), HeapError> {
            if addr >= self.start && addr + PAGE <= self.end {
                Ok(())
            } else {
                Err(HeapError::Exhausted)
            }
        }
    }

    struct Rig {
        _arena: Arena,
        heap: KernelHeap,
        backing: ArenaBacking,
        sched: Scheduler,
    }

    const TRAMPOLINE: u32 = 0x0010_4000;

    fn rig() -> Rig {
        let arena = Arena::new(64 * PAGE);
        let start = arena.base as usize;
        let heap = KernelHeap::new(start, start + 64 * PAGE);
        let backing = ArenaBacking {
            start,
            end: start + 64 * PAGE,
        };
        let mut r = Rig {
            _arena: arena,
            heap,
            backing,
            sched: Scheduler::new(),
        };
        r.sched
            .adopt_boot_context(&mut r.heap, &mut r.backing, PhysicalAddress::new(0x1000))
            .unwrap();
        r
    }

    fn spawn(r: &mut Rig, name: &str) -> NonNull<TaskControlBlock> {
        r.sched
            .spawn(
                &mut r.heap,
                &mut r.backing,
                name,
                0x0020_0000,
                TRAMPOLINE,
                TaskMode::Kernel,
                PhysicalAddress::new(0x1000),
            )
            .unwrap()
    }

    fn current_id(sched: &Scheduler) -> u32 {
        unsafe { sched.current().unwrap().as_ref().id }
    }

    /// The scheduler invariants: exactly one Running, the queue holds
    /// exactly the Ready tasks, current is not queued.
    fn check_invariants(sched: &Scheduler, all: &[NonNull<TaskControlBlock>]) {
        let current = sched.current().unwrap();
        let mut running = 0;
        for &task in all {
            let t = unsafe { task.as_ref() };
            match t.state {
                TaskState::Running => {
                    running += 1;
                    assert_eq!(task, current, "Running task is not current");
                    assert!(!sched.is_queued(task.as_ptr()), "Running task queued");
                }
                TaskState::Ready => {
                    assert!(sched.is_queued(task.as_ptr()), "Ready task not queued");
                }
                TaskState::Blocked | TaskState::Terminated => {
                    assert!(!sched.is_queued(task.as_ptr()), "parked task queued");
                }
            }
        }
        assert_eq!(running, 1, "exactly one task must be Running");
    }

    #[test]
    fn boot_context_becomes_the_idle_task() {
        let r = rig();
        let idle = r.sched.current().unwrap();
        let idle = unsafe { idle.as_ref() };
        assert_eq!(idle.id, 0);
        assert_eq!(idle.name(), "idle");
        assert_eq!(idle.state, TaskState::Running);
        assert_eq!(idle.kernel_stack, 0);
        assert_eq!(r.sched.ready_count(), 0);
    }

    #[test]
    fn spawn_builds_the_synthetic_frame_on_the_new_stack() {
        let mut r = rig();
        let task = spawn(&mut r, "worker");
        let t = unsafe { task.as_ref() };

        assert_eq!(t.id, 1);
        assert_eq!(t.state, TaskState::Ready);
        assert!(r.sched.is_queued(task.as_ptr()));
        assert_ne!(t.kernel_stack, 0);
        assert_eq!(t.timeslice, DEFAULT_TIMESLICE);

        // Saved context mirrors the frame at the top of the fresh stack.
        assert_eq!(t.context.eip, TRAMPOLINE);
        assert_eq!(t.context.eflags, 0x202);
        let frame_base = t.kernel_stack + TASK_STACK_SIZE - 15 * 4;
        assert_eq!(t.context.esp, frame_base as u32);

        let words =
            unsafe { core::slice::from_raw_parts(frame_base as *const u32, 15) };
        assert_eq!(words[11], TRAMPOLINE); // eip slot
        assert_eq!(words[14], 0x0020_0000); // entry-point word above the frame
    }

    #[test]
    fn disabled_scheduler_never_touches_the_frame() {
        let mut r = rig();
        let _t1 = spawn(&mut r, "t1");
        let mut frame = InterruptFrame {
            eip: 0x4242_4242,
            ..Default::default()
        };
        r.sched.preempt(&mut frame);
        assert_eq!(frame.eip, 0x4242_4242);
        assert_eq!(current_id(&r.sched), 0);
    }

    #[test]
    fn round_robin_rotates_through_all_tasks() {
        let mut r = rig();
        let t1 = spawn(&mut r, "t1");
        let t2 = spawn(&mut r, "t2");
        let t3 = spawn(&mut r, "t3");
        let idle = r.sched.current().unwrap();
        let all = [idle, t1, t2, t3];

        r.sched.enable();
        let mut frame = InterruptFrame::default();

        let mut order = Vec::new();
        for _ in 0..8 {
            r.sched.preempt(&mut frame);
            order.push(current_id(&r.sched));
            check_invariants(&r.sched, &all);
        }
        assert_eq!(order, [1, 2, 3, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn first_switch_installs_the_synthetic_frame_verbatim() {
        let mut r = rig();
        let _t1 = spawn(&mut r, "t1");
        r.sched.enable();

        let mut frame = InterruptFrame {
            eip: 0x0010_9999,
            eax: 77,
            ..Default::default()
        };
        r.sched.preempt(&mut frame);

        assert_eq!(frame.eip, TRAMPOLINE);
        assert_eq!(frame.eax, 0);
        assert_eq!(frame.eflags, 0x202);
        assert_eq!(frame.cs, kernel_info::segments::KERNEL_CODE);
    }

    #[test]
    fn preemption_saves_the_interrupted_context() {
        let mut r = rig();
        let _t1 = spawn(&mut r, "t1");
        let idle = r.sched.current().unwrap();
        r.sched.enable();

        let mut frame = InterruptFrame {
            eip: 0x0012_3456,
            ebx: 9,
            esp: 0x0009_F000,
            ..Default::default()
        };
        r.sched.preempt(&mut frame);

        let saved = unsafe { &idle.as_ref().context };
        assert_eq!(saved.eip, 0x0012_3456);
        assert_eq!(saved.ebx, 9);
        // esp is saved even though restore never feeds it back to the CPU.
        assert_eq!(saved.esp, 0x0009_F000);
    }

    #[test]
    fn empty_queue_keeps_the_current_task() {
        let mut r = rig();
        r.sched.enable();
        let mut frame = InterruptFrame {
            eip: 0x1111_1111,
            ..Default::default()
        };
        r.sched.preempt(&mut frame);
        assert_eq!(current_id(&r.sched), 0);
        assert_eq!(
            unsafe { r.sched.current().unwrap().as_ref().state },
            TaskState::Running
        );
        // No switch happened, the frame is untouched.
        assert_eq!(frame.eip, 0x1111_1111);
    }

    #[test]
    fn terminated_task_is_evicted_and_never_requeued() {
        let mut r = rig();
        let t1 = spawn(&mut r, "t1");
        let idle = r.sched.current().unwrap();
        r.sched.enable();
        let mut frame = InterruptFrame::default();

        // Switch to t1, then let it exit.
        r.sched.preempt(&mut frame);
        assert_eq!(current_id(&r.sched), 1);
        r.sched.exit_current();

        // Next tick evicts it in favor of idle.
        r.sched.preempt(&mut frame);
        assert_eq!(current_id(&r.sched), 0);
        assert!(!r.sched.is_queued(t1.as_ptr()));

        // And it stays gone.
        for _ in 0..4 {
            r.sched.preempt(&mut frame);
            assert_eq!(current_id(&r.sched), 0);
            assert!(!r.sched.is_queued(t1.as_ptr()));
        }

        // Its resources can now be reclaimed.
        let _ = idle;
        unsafe { r.sched.destroy(&mut r.heap, t1.as_ptr()) };
    }

    #[test]
    fn blocked_task_leaves_the_rotation_until_unblocked() {
        let mut r = rig();
        let t1 = spawn(&mut r, "t1");
        let t2 = spawn(&mut r, "t2");
        let idle = r.sched.current().unwrap();
        let all = [idle, t1, t2];
        r.sched.enable();
        let mut frame = InterruptFrame::default();

        // Run t1, block it, tick: it must not be requeued.
        r.sched.preempt(&mut frame);
        assert_eq!(current_id(&r.sched), 1);
        r.sched.block_current();
        r.sched.preempt(&mut frame);
        check_invariants(&r.sched, &all);

        // Rotation is now t2 ⇄ idle only.
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(current_id(&r.sched));
            r.sched.preempt(&mut frame);
        }
        assert!(!seen.contains(&1));

        // Unblock: t1 rejoins as Ready and gets picked again.
        unsafe { r.sched.unblock(t1.as_ptr()) };
        assert!(r.sched.is_queued(t1.as_ptr()));
        check_invariants(&r.sched, &all);

        let mut resumed = false;
        for _ in 0..4 {
            r.sched.preempt(&mut frame);
            if current_id(&r.sched) == 1 {
                resumed = true;
            }
        }
        assert!(resumed);
    }

    #[test]
    fn unblock_of_a_ready_task_does_not_duplicate_it() {
        let mut r = rig();
        let t1 = spawn(&mut r, "t1");
        unsafe { r.sched.unblock(t1.as_ptr()) };
        assert_eq!(r.sched.ready_count(), 1);
    }

    #[test]
    fn spawn_failure_rolls_back_cleanly() {
        // A 4-page heap window: room for TCBs, not for a task stack once
        // most of it is occupied.
        let arena = Arena::new(4 * PAGE);
        let start = arena.base as usize;
        let mut heap = KernelHeap::new(start, start + 4 * PAGE);
        let mut backing = ArenaBacking {
            start,
            end: start + 4 * PAGE,
        };
        let mut sched = Scheduler::new();
        sched
            .adopt_boot_context(&mut heap, &mut backing, PhysicalAddress::zero())
            .unwrap();
        let hog = heap.alloc(3 * PAGE, &mut backing).unwrap();

        let (_, used_before, free_before) = heap.stats();
        let result = sched.spawn(
            &mut heap,
            &mut backing,
            "big",
            0,
            TRAMPOLINE,
            TaskMode::Kernel,
            PhysicalAddress::zero(),
        );
        assert_eq!(result.unwrap_err(), SpawnError::OutOfMemory);
        assert_eq!(sched.ready_count(), 0);
        // The interim TCB allocation was given back.
        let (_, used_after, free_after) = heap.stats();
        assert_eq!(used_after, used_before);
        assert_eq!(free_after, free_before);

        heap.free(hog.as_ptr());
    }
}
