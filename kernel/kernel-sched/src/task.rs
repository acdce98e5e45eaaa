use kernel_info::segments;
use kernel_interrupts::InterruptFrame;
use kernel_memory_addresses::PhysicalAddress;
use kernel_registers::Eflags;

/// Capacity of a task's name field.
pub const TASK_NAME_LEN: usize = 32;

/// Ticks a task runs before its slice is considered spent.
pub const DEFAULT_TIMESLICE: u32 = 10;

/// Task lifecycle states.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskState {
    /// Queued, waiting for the scheduler to pick it.
    Ready,
    /// Owns the CPU right now. Exactly one task is Running.
    Running,
    /// Off the queue until explicitly unblocked.
    Blocked,
    /// Finished; evicted on the next tick and never requeued.
    Terminated,
}

/// Privilege mode of a task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskMode {
    /// Ring 0. Everything, for now.
    Kernel,
    /// Ring 3; reserved for future use.
    User,
}

/// Saved CPU context of a suspended task.
///
/// Field-for-field what [`InterruptFrame`] captures, kept in the same
/// units so a context switch is a plain copy. `esp` is recorded on save
/// but is only decorative on restore: `popa` skips its slot, so the stub
/// unwinds on whatever stack it entered with. Initial contexts depend on
/// that — their synthetic frame sits on the task's fresh stack and must be
/// consumed from there.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct CpuContext {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub ds: u32,
    pub es: u32,
    pub fs: u32,
    pub gs: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub user_esp: u32,
    pub ss: u32,
}

/// One schedulable task.
///
/// TCBs are heap-allocated by the scheduler and linked into the ready
/// queue through [`next`](Self::next) (intrusive, singly linked, no back
/// references, hence no cycles). The scheduler owns every TCB; stacks and
/// the TCB itself go back to the heap on destroy.
pub struct TaskControlBlock {
    /// Unique identifier; 0 is the idle task.
    pub id: u32,
    name: [u8; TASK_NAME_LEN],
    pub state: TaskState,
    pub mode: TaskMode,
    pub context: CpuContext,
    /// Base of the task's kernel stack, or 0 for the idle task (which
    /// runs on the boot stack).
    pub kernel_stack: usize,
    /// Base of the user stack; unused while every task is kernel-mode.
    pub user_stack: usize,
    /// Page directory this task runs under.
    pub page_directory: PhysicalAddress,
    /// Remaining ticks in the current slice.
    pub timeslice: u32,
    /// Static priority; recorded but not yet consulted.
    pub priority: u32,
    /// Ready-queue link. Null when not queued.
    pub(crate) next: *mut TaskControlBlock,
}

impl TaskControlBlock {
    /// Fill in a TCB value. `next` starts unlinked; the caller queues it.
    #[must_use]
    pub fn new(
        id: u32,
        name: &str,
        state: TaskState,
        mode: TaskMode,
        page_directory: PhysicalAddress,
    ) -> Self {
        let mut name_buf = [0u8; TASK_NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(TASK_NAME_LEN - 1);
        name_buf[..len].copy_from_slice(&bytes[..len]);
        Self {
            id,
            name: name_buf,
            state,
            mode,
            context: CpuContext::default(),
            kernel_stack: 0,
            user_stack: 0,
            page_directory,
            timeslice: DEFAULT_TIMESLICE,
            priority: 0,
            next: core::ptr::null_mut(),
        }
    }

    /// The task's name (the NUL-free prefix of the name field).
    #[must_use]
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(TASK_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    /// Copy the live interrupt frame into the saved context.
    ///
    /// `es`/`fs`/`gs` follow `ds`: the stub only saves one data selector
    /// and kernel tasks keep all four equal.
    pub fn save_context(&mut self, frame: &InterruptFrame) {
        let c = &mut self.context;
        c.edi = frame.edi;
        c.esi = frame.esi;
        c.ebp = frame.ebp;
        c.esp = frame.esp;
        c.ebx = frame.ebx;
        c.edx = frame.edx;
        c.ecx = frame.ecx;
        c.eax = frame.eax;
        c.ds = frame.ds;
        c.es = frame.ds;
        c.fs = frame.ds;
        c.gs = frame.ds;
        c.eip = frame.eip;
        c.cs = frame.cs;
        c.eflags = frame.eflags;
        c.user_esp = frame.user_esp;
        c.ss = frame.ss;
    }

    /// Copy the saved context over the live interrupt frame.
    ///
    /// `esp` is written into the frame's pusha slot, which `popa`
    /// discards; the kernel-mode stack pointer the stub unwinds with is
    /// deliberately left alone (see [`CpuContext`]).
    pub fn restore_context(&self, frame: &mut InterruptFrame) {
        let c = &self.context;
        frame.edi = c.edi;
        frame.esi = c.esi;
        frame.ebp = c.ebp;
        frame.esp = c.esp;
        frame.ebx = c.ebx;
        frame.edx = c.edx;
        frame.ecx = c.ecx;
        frame.eax = c.eax;
        frame.ds = c.ds;
        frame.eip = c.eip;
        frame.cs = c.cs;
        frame.eflags = c.eflags;
        frame.user_esp = c.user_esp;
        frame.ss = c.ss;
    }
}

/// Build the synthetic interrupt frame a fresh task starts from, at the
/// top of its kernel stack.
///
/// Written so the common stub, unwinding from the frame base, pops the
/// saved data segment and registers, skips vector/error, and `iretd`s into
/// the trampoline — leaving the stack pointer at the extra word holding
/// `entry_point`, where the trampoline picks it up.
///
/// Layout (ascending addresses from the returned index):
///
/// ```text
/// +0   ds            +9   vector (0)     +13  eflags (IF | bit 1)
/// +1..8  GPRs (0)    +10  error (0)      [+14 user esp, +15 ss]   user only
///                    +11  eip = trampoline
///                    +12  cs              top: entry_point
/// ```
///
/// Returns the word index of the frame base within `stack`; the task's
/// saved `esp` must point there so the first switch installs the frame
/// verbatim.
pub fn prepare_initial_stack(
    stack: &mut [u32],
    entry_point: u32,
    trampoline: u32,
    mode: TaskMode,
) -> usize {
    let (cs, ds) = match mode {
        TaskMode::Kernel => (segments::KERNEL_CODE, segments::KERNEL_DATA),
        TaskMode::User => (segments::USER_CODE, segments::USER_DATA),
    };

    let mut top = stack.len();
    let mut push = |value: u32| {
        top -= 1;
        stack[top] = value;
    };

    // The trampoline finds this above the frame.
    push(entry_point);

    if mode == TaskMode::User {
        // Privilege-crossing iretd also pops a stack: user SS and ESP.
        push(segments::USER_DATA);
        push(0xC000_0000);
    }

    push(Eflags::initial_task_flags().into_bits());
    push(cs);
    push(trampoline); // eip
    push(0); // error code
    push(0); // vector
    for _ in 0..8 {
        push(0); // eax, ecx, edx, ebx, esp, ebp, esi, edi
    }
    push(ds);

    top
}
