//! Multiboot header and the assembly entry.
//!
//! The bootloader scans the first 8 KiB of the image for the header (the
//! linker script pins it to the front), loads us at 1 MiB, puts its magic
//! in `EAX` and the info pointer in `EBX`, and jumps to `_start` with a
//! stack we must not trust.

use kernel_info::boot::{HEADER_CHECKSUM, HEADER_FLAGS, HEADER_MAGIC};
use kernel_info::memory::BOOT_STACK_SIZE;

#[repr(C)]
struct MultibootHeader {
    magic: u32,
    flags: u32,
    checksum: u32,
}

#[unsafe(link_section = ".multiboot")]
#[used]
static MULTIBOOT_HEADER: MultibootHeader = MultibootHeader {
    magic: HEADER_MAGIC,
    flags: HEADER_FLAGS,
    checksum: HEADER_CHECKSUM,
};

/// 16-byte aligned boot stack.
#[repr(align(16))]
struct Aligned<const N: usize>([u8; N]);

#[unsafe(link_section = ".bss.boot")]
#[unsafe(no_mangle)]
static mut BOOT_STACK: Aligned<BOOT_STACK_SIZE> = Aligned([0; BOOT_STACK_SIZE]);

/// The kernel entry point.
///
/// # Naked function & stack
/// Naked so the compiler makes no assumptions about the bootloader's
/// stack: we install our own before any Rust code runs, then hand the
/// bootloader's `EAX`/`EBX` to [`kernel_main`](crate::kernel_main) as
/// cdecl arguments. `kernel_main` never returns; the trailing halt loop
/// is a backstop.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        "cli",

        // Fresh kernel stack, top of BOOT_STACK.
        "mov esp, offset {stack}",
        "add esp, {stack_size}",
        "xor ebp, ebp",

        // kernel_main(magic, info), cdecl: push right-to-left.
        "push ebx",
        "push eax",
        "call {main}",

        "2:",
        "hlt",
        "jmp 2b",

        stack = sym BOOT_STACK,
        stack_size = const BOOT_STACK_SIZE,
        main = sym crate::kernel_main,
    )
}
