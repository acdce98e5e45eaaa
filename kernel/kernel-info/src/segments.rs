//! Segment selectors of the flat GDT.
//!
//! The descriptor tables are set up once at boot and never change; the
//! rest of the kernel only needs the selector values. Layout: null, kernel
//! code, kernel data, user code, user data (user selectors carry RPL 3).

/// Kernel code segment (ring 0).
pub const KERNEL_CODE: u32 = 0x08;

/// Kernel data segment (ring 0).
pub const KERNEL_DATA: u32 = 0x10;

/// User code segment with RPL 3 (reserved for future ring-3 tasks).
pub const USER_CODE: u32 = 0x1B;

/// User data segment with RPL 3 (reserved for future ring-3 tasks).
pub const USER_DATA: u32 = 0x23;
