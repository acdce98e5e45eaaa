//! Fixed points of the kernel's memory layout.
//!
//! ```text
//! 0x0000_0000 ┌──────────────────────────────┐
//!             │ BIOS / IVT / VGA / low RAM   │  never allocated
//! 0x0010_0000 ├──────────────────────────────┤
//!             │ kernel image                 │  loaded here by Multiboot
//!             │ frame bitmap                 │  placed right after the image
//! 0x0040_0000 ├──────────────────────────────┤  end of the boot identity map
//!             │ (unmapped gap)               │
//! 0x0050_0000 ├──────────────────────────────┤
//!             │ kernel heap                  │  grows on demand
//! 0x1000_0000 ├──────────────────────────────┤  heap ceiling
//!             │ unused                       │
//! 0xFFFF_FFFF └──────────────────────────────┘
//! ```

/// Physical address the kernel image is loaded at (1 MiB).
pub const KERNEL_LOAD_BASE: u32 = 0x0010_0000;

/// Everything below this is BIOS/legacy territory and stays allocated.
pub const LOW_MEMORY_END: u32 = 0x0010_0000;

/// The boot page tables identity-map `[0, IDENTITY_MAP_END)` (4 MiB).
pub const IDENTITY_MAP_END: u32 = 0x0040_0000;

/// First virtual address served by the kernel heap.
pub const HEAP_START: u32 = 0x0050_0000;

/// Bytes the heap claims up front.
pub const HEAP_INITIAL_SIZE: u32 = 0x0010_0000;

/// Exclusive upper bound of the heap window (256 MiB).
pub const HEAP_END: u32 = 0x1000_0000;

/// Boot stack established by `_start` before `kernel_main` runs.
pub const BOOT_STACK_SIZE: usize = 16 * 1024;

/// Kernel stack handed to every spawned task.
pub const TASK_STACK_SIZE: usize = 8 * 1024;

/// Default periodic-timer rate in Hz.
pub const TIMER_HZ: u32 = 100;
