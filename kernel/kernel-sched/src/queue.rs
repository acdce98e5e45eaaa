use crate::TaskControlBlock;
use core::ptr::null_mut;

/// FIFO of Ready tasks, intrusively linked through
/// [`TaskControlBlock::next`].
///
/// # Invariants
/// - Exactly the Ready tasks are linked here, each at most once; the
///   Running task is never in the queue.
/// - `tail` is null iff `head` is null.
/// - The chain is acyclic: `next` is nulled on pop and overwritten on
///   push, and a task is never pushed twice (state machine's duty).
pub struct ReadyQueue {
    head: *mut TaskControlBlock,
    tail: *mut TaskControlBlock,
}

// Safety: raw TCB pointers are only dereferenced under the scheduler's
// lock.
unsafe impl Send for ReadyQueue {}

impl ReadyQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: null_mut(),
            tail: null_mut(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Append a task.
    ///
    /// # Safety
    /// `task` must be a valid TCB not currently linked into any queue.
    pub unsafe fn push(&mut self, task: *mut TaskControlBlock) {
        if task.is_null() {
            return;
        }
        // Safety: valid per the caller's contract.
        unsafe {
            (*task).next = null_mut();
            if self.head.is_null() {
                self.head = task;
                self.tail = task;
            } else {
                (*self.tail).next = task;
                self.tail = task;
            }
        }
    }

    /// Detach and return the head, or null when empty.
    #[must_use]
    pub fn pop(&mut self) -> *mut TaskControlBlock {
        let task = self.head;
        if task.is_null() {
            return null_mut();
        }
        // Safety: queued tasks are valid TCBs per the push contract.
        unsafe {
            self.head = (*task).next;
            if self.head.is_null() {
                self.tail = null_mut();
            }
            (*task).next = null_mut();
        }
        task
    }

    /// Number of queued tasks. O(n); diagnostics and tests.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut current = self.head;
        while !current.is_null() {
            n += 1;
            // Safety: queued tasks are valid TCBs per the push contract.
            current = unsafe { (*current).next };
        }
        n
    }

    /// Whether `task` is currently linked in. O(n); diagnostics and tests.
    #[must_use]
    pub fn contains(&self, task: *const TaskControlBlock) -> bool {
        let mut current = self.head;
        while !current.is_null() {
            if core::ptr::eq(current, task) {
                return true;
            }
            // Safety: queued tasks are valid TCBs per the push contract.
            current = unsafe { (*current).next };
        }
        false
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
