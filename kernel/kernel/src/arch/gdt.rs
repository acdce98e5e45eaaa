//! Flat 32-bit Global Descriptor Table.
//!
//! Segmentation is a formality on i386 with paging: every segment spans
//! the whole 4 GiB address space and only the privilege levels matter.
//!
//! | Index | Selector | Segment                |
//! |-------|----------|------------------------|
//! | 0     | 0x00     | null                   |
//! | 1     | 0x08     | kernel code (DPL 0)    |
//! | 2     | 0x10     | kernel data (DPL 0)    |
//! | 3     | 0x18/1B  | user code (DPL 3)      |
//! | 4     | 0x20/23  | user data (DPL 3)      |
//!
//! The selector values the rest of the kernel uses live in
//! [`kernel_info::segments`]; the compile-time checks below keep the two
//! in agreement.

use kernel_info::segments;

/// Encode a flat 4 GiB segment descriptor.
///
/// `access` is the standard byte: present | DPL | S | type. Flags are
/// fixed at 4 KiB granularity, 32-bit default operand size.
const fn flat_descriptor(access: u8) -> u64 {
    const LIMIT: u64 = 0xF_FFFF; // 4 GiB in 4 KiB pages
    const FLAGS: u64 = 0b1100; // G=1 (page granularity), D/B=1 (32-bit)

    (LIMIT & 0xFFFF)
        | ((LIMIT >> 16) & 0xF) << 48
        | (access as u64) << 40
        | FLAGS << 52
}

/// Ring-0 code: present, DPL 0, code, execute/read.
const KERNEL_CODE_ACCESS: u8 = 0x9A;
/// Ring-0 data: present, DPL 0, data, read/write.
const KERNEL_DATA_ACCESS: u8 = 0x92;
/// Ring-3 code: present, DPL 3, code, execute/read.
const USER_CODE_ACCESS: u8 = 0xFA;
/// Ring-3 data: present, DPL 3, data, read/write.
const USER_DATA_ACCESS: u8 = 0xF2;

static GDT: [u64; 5] = [
    0,
    flat_descriptor(KERNEL_CODE_ACCESS),
    flat_descriptor(KERNEL_DATA_ACCESS),
    flat_descriptor(USER_CODE_ACCESS),
    flat_descriptor(USER_DATA_ACCESS),
];

// Selector constants and table layout must agree: selector = index << 3,
// user selectors carry RPL 3.
const _: () = {
    assert!(segments::KERNEL_CODE == 1 << 3);
    assert!(segments::KERNEL_DATA == 2 << 3);
    assert!(segments::USER_CODE == (3 << 3) | 3);
    assert!(segments::USER_DATA == (4 << 3) | 3);
};

/// Operand of `lgdt`: limit and linear base of the table.
#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u32,
}

/// Load the GDT and reload every segment register against it.
///
/// # Safety
/// CPL0, interrupts disabled. The far jump that reloads CS assumes the
/// kernel-code descriptor above; a wrong table here takes the machine
/// down on the next instruction fetch.
pub unsafe fn init() {
    let pointer = GdtPointer {
        limit: (size_of_val(&GDT) - 1) as u16,
        base: GDT.as_ptr() as u32,
    };

    unsafe {
        core::arch::asm!(
            "lgdt [{pointer}]",
            // CS can only be reloaded through a far transfer: push the
            // new selector and a return address, then far-return to it.
            "push {kcode}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            "mov {tmp}, {kdata}",
            "mov ds, {tmp:x}",
            "mov es, {tmp:x}",
            "mov fs, {tmp:x}",
            "mov gs, {tmp:x}",
            "mov ss, {tmp:x}",
            pointer = in(reg) &raw const pointer,
            kcode = const segments::KERNEL_CODE,
            kdata = const segments::KERNEL_DATA,
            tmp = out(reg) _,
        );
    }
}
