//! Boot-time self tests, selected by command-line flags, plus the demo
//! task set.
//!
//! `boottest` exercises the allocator, the identity mapping and the heap
//! end to end on real hardware state; `testpanic` and `testpagefault`
//! deliberately take the kernel down to prove the diagnostic paths work.

use kernel_info::cmdline::CmdLine;
use kernel_memory_addresses::VirtualAddress;

use crate::{kassert, kpanic, kprint, memory, sched};

pub fn run(cmdline: &CmdLine) {
    if cmdline.has_flag("boottest") {
        run_boot_tests();
    }
    if cmdline.has_flag("testpanic") {
        kpanic!("Test panic - this is intentional (value: {})", 42);
    }
    if cmdline.has_flag("testpagefault") {
        trigger_page_fault();
    }
}

fn run_boot_tests() {
    log::info!("running boot self-tests");
    frame_allocator_round_trip();
    identity_translation();
    heap_round_trip();
    log::info!("boot self-tests passed");
}

/// Allocate three frames, free the middle one, expect first-fit to hand
/// it back.
fn frame_allocator_round_trip() {
    let (Some(a), Some(b), Some(c)) = (
        memory::alloc_frame(),
        memory::alloc_frame(),
        memory::alloc_frame(),
    ) else {
        kpanic!("frame allocation failed during self-test");
    };
    kassert!(a != b && b != c, "frame allocator returned duplicates");

    memory::free_frame(b);
    let free_after = memory::free_frames();
    let Some(d) = memory::alloc_frame() else {
        kpanic!("frame re-allocation failed during self-test");
    };
    kassert!(d == b, "first-fit did not reuse the freed frame");
    kassert!(
        memory::free_frames() == free_after - 1,
        "free-frame count out of step"
    );

    memory::free_frame(a);
    memory::free_frame(c);
    memory::free_frame(d);
    log::info!("  frame allocator: ok");
}

/// The boot identity map must translate low addresses to themselves.
fn identity_translation() {
    let translated = memory::translate(VirtualAddress::new(0x1000));
    kassert!(
        translated.map(|pa| pa.as_u32()) == Some(0x1000),
        "identity translation of 0x1000 failed"
    );
    log::info!("  identity mapping: ok");
}

/// Heap allocate/write/read/free/realloc, mirroring real usage.
fn heap_round_trip() {
    let (Some(p1), Some(p2), Some(p3)) =
        (memory::kmalloc(32), memory::kmalloc(40), memory::kmalloc(64))
    else {
        kpanic!("heap allocation failed during self-test");
    };

    let slots = p2.as_ptr().cast::<u32>();
    for i in 0..10 {
        // Safety: p2 has room for ten u32 slots (40 bytes).
        unsafe { slots.add(i).write(i as u32 * 10) };
    }
    // Safety: just written above.
    kassert!(
        unsafe { slots.add(5).read() } == 50,
        "heap memory did not read back"
    );

    memory::kfree(p2.as_ptr());
    let Some(p1) = memory::krealloc(p1.as_ptr(), 128) else {
        kpanic!("heap realloc failed");
    };

    memory::kfree(p1.as_ptr());
    memory::kfree(p3.as_ptr());
    log::info!("  heap: ok");
}

/// Touch a known-unmapped address; the page-fault handler takes it from
/// there. Never returns if the handler works.
fn trigger_page_fault() {
    log::info!("about to read from unmapped address 0xDEADBEEF");
    // Safety: intentionally not safe at all; this read must fault.
    let value = unsafe { core::ptr::read_volatile(0xDEAD_BEEF as *const u32) };
    log::error!("survived the unmapped read (got {:#x})", value);
}

/// Three tasks that interleave their tags under the round-robin, five
/// iterations each, then exit through the trampoline.
pub fn spawn_demo_tasks() {
    for (name, entry) in [
        ("worker1", demo_task_one as extern "C" fn()),
        ("worker2", demo_task_two),
        ("worker3", demo_task_three),
    ] {
        if let Err(e) = sched::spawn(name, entry) {
            log::warn!("could not spawn {}: {}", name, e);
        }
    }
}

extern "C" fn demo_task_one() {
    demo_loop("P1");
}

extern "C" fn demo_task_two() {
    demo_loop("P2");
}

extern "C" fn demo_task_three() {
    demo_loop("P3");
}

fn demo_loop(tag: &str) {
    for i in 0..5 {
        kprint!("[{}:{}] ", tag, i);
        busy_wait();
    }
}

/// Bounded busy wait so the tags visibly interleave across timeslices.
fn busy_wait() {
    for _ in 0..400_000 {
        core::hint::spin_loop();
    }
}
