//! # Kernel entry point
//!
//! Bring-up happens in dependency order: console first (every later step
//! wants to talk), then descriptor tables and interrupt routing, the
//! physical allocator, paging, the heap, the scheduler, and finally the
//! timer that makes the scheduler live. Once interrupts are enabled the
//! boot context settles into being the idle task and everything else runs
//! off timer ticks.

#![no_std]
#![no_main]

mod arch;
mod boot;
mod drivers;
mod logging;
mod memory;
mod panic;
mod sched;
mod selftest;

use kernel_info::boot::{BOOTLOADER_MAGIC, MultibootInfo};
use kernel_info::cmdline::CmdLine;
use kernel_info::memory::TIMER_HZ;
use kernel_interrupts::{pic, pit};
use kernel_registers::halt;
use kernel_sync::irq;

/// Rust `panic!` lands in the kernel's own panic machinery.
#[panic_handler]
fn rust_panic(info: &core::panic::PanicInfo) -> ! {
    let (file, line) = match info.location() {
        Some(location) => (location.file(), location.line()),
        None => ("<unknown>", 0),
    };
    panic::fatal(file, line, format_args!("{}", info.message()))
}

/// C-level entry, called by [`boot::_start`] with the bootloader's
/// register contents.
#[unsafe(no_mangle)]
extern "C" fn kernel_main(magic: u32, info: *const MultibootInfo) -> ! {
    drivers::vga::init();
    crate::kprintln!("ClankerOS v0.1.0");
    crate::kprintln!("Booting kernel...");

    if magic != BOOTLOADER_MAGIC {
        crate::kprintln!("WARNING: bad bootloader magic {:#010x}", magic);
    }

    // Safety: a Multiboot-conforming loader left the info block in low
    // memory, which stays identity-mapped.
    let info = unsafe { &*info };
    let cmdline = if info.has_cmdline() {
        // Safety: the CMDLINE flag guarantees a NUL-terminated string.
        unsafe { CmdLine::from_raw(info.cmdline as usize as *const u8) }
    } else {
        CmdLine::empty()
    };

    if cmdline.has_flag("earlycon") {
        drivers::serial::enable();
    }
    logging::init();
    log::info!("command line: '{}'", cmdline.as_str());

    // Descriptor tables and interrupt routing. Unhandled exceptions panic
    // with their mnemonic from here on.
    unsafe {
        arch::gdt::init();
        arch::idt::init();
        pic::remap();
    }
    arch::install_exception_handlers();
    log::info!("interrupts routed (vectors 0-47)");

    // Memory: frames, then paging, then the heap on top of both.
    unsafe {
        memory::init_frames(info);
        memory::init_paging();
    }
    memory::init_heap();

    // Scheduling: idle task wraps this very context; the timer drives it.
    sched::init();
    let hz = unsafe { pit::init(TIMER_HZ) };
    sched::attach_timer();
    log::info!("timer at {} Hz", hz);

    selftest::run(&cmdline);

    selftest::spawn_demo_tasks();
    sched::enable();
    irq::enable_interrupts();
    log::info!("scheduler enabled, entering idle");

    // The boot context is now the idle task: halt until the next tick,
    // forever.
    loop {
        halt();
    }
}
