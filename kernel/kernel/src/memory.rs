//! Memory bring-up and the glue between the allocators and paging.
//!
//! Ownership lives in the library crates; this module pins down the
//! machine-specific parts: where the frame bitmap goes (right after the
//! kernel image, courtesy of the linker script's `kernel_end`), which
//! mapper reaches the paging structures (the identity map), and how the
//! heap gets its pages (frame + map, with rollback).

use core::sync::atomic::{AtomicU32, Ordering};
use kernel_alloc::{BootMemory, FrameBitmap, HeapBacking, HeapError, KernelHeap};
use kernel_info::boot::MultibootInfo;
use kernel_info::memory::{
    HEAP_END, HEAP_INITIAL_SIZE, HEAP_START, IDENTITY_MAP_END, KERNEL_LOAD_BASE,
};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress, align_up};
use kernel_sync::SpinLock;
use kernel_vmem::{AddressSpace, PageFlags, PhysMapper};

use crate::kpanic;

unsafe extern "C" {
    /// End of the kernel image; provided by the linker script.
    static kernel_end: u8;
}

static FRAMES: SpinLock<FrameBitmap> = SpinLock::new(FrameBitmap::empty());

pub(crate) static HEAP: SpinLock<KernelHeap> =
    SpinLock::new(KernelHeap::new(HEAP_START as usize, HEAP_END as usize));

/// Physical base of the kernel page directory, once paging is up.
static KERNEL_DIRECTORY: AtomicU32 = AtomicU32::new(0);

/// The kernel's `PhysMapper`: physical and virtual coincide for
/// everything the kernel touches (low memory is identity-mapped).
pub struct IdentityMapper;

static IDENTITY_MAPPER: IdentityMapper = IdentityMapper;

impl PhysMapper for IdentityMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        // Safety: identity map; the caller guarantees `pa` is mapped and
        // typed correctly.
        unsafe { &mut *(pa.as_u32() as usize as *mut T) }
    }
}

/// The kernel address space, reconstructed from the stored root.
fn kernel_space() -> AddressSpace<'static, IdentityMapper> {
    // Safety: KERNEL_DIRECTORY holds the directory init_paging installed.
    unsafe {
        AddressSpace::new(
            &IDENTITY_MAPPER,
            PhysicalAddress::new(KERNEL_DIRECTORY.load(Ordering::Acquire)),
        )
    }
}

/// Page directory the boot context (and every kernel task) runs under.
pub fn kernel_directory() -> PhysicalAddress {
    PhysicalAddress::new(KERNEL_DIRECTORY.load(Ordering::Acquire))
}

/// Initialize the physical frame allocator from the boot information.
///
/// # Safety
/// Call once, before paging; `info` must be the bootloader's block.
pub unsafe fn init_frames(info: &MultibootInfo) {
    // Safety: the linker guarantees the symbol; only its address is used.
    let image_end = unsafe { &raw const kernel_end } as u32;
    let bitmap_at = align_up(image_end, 4);

    // Safety: the memory-map flag guarantees the buffer; it sits in low
    // memory the kernel can read directly.
    let memory = match unsafe { info.memory_map() } {
        Some(map) => BootMemory::Map(map),
        None => BootMemory::Range {
            lower_kib: info.mem_lower,
            upper_kib: info.mem_upper,
        },
    };

    let bitmap_end = bitmap_at + (memory.bitmap_words() * size_of::<u32>()) as u32;

    let mut frames = FRAMES.lock();
    // Safety: the bitmap area lies past the image and below any frame the
    // allocator will hand out (it reserves [KERNEL_LOAD_BASE, bitmap_end)).
    unsafe {
        frames.init(
            memory,
            bitmap_at as usize as *mut u32,
            (KERNEL_LOAD_BASE, bitmap_end),
        );
    }

    log::info!(
        "physical memory: {} KiB total, {} KiB free",
        frames.total_bytes() / 1024,
        frames.free_bytes() / 1024
    );
}

/// Build the kernel page directory, identity-map the first 4 MiB and
/// switch paging on.
///
/// # Safety
/// Call once, after [`init_frames`], with interrupts disabled.
pub unsafe fn init_paging() {
    let mut frames = FRAMES.lock();

    let rw = PageFlags::PRESENT | PageFlags::WRITABLE;
    let space = match AddressSpace::create(&IDENTITY_MAPPER, &mut *frames) {
        Ok(space) => space,
        Err(e) => kpanic!("cannot allocate the kernel page directory: {}", e),
    };
    if let Err(e) = space.identity_map(&mut *frames, 0, IDENTITY_MAP_END, rw) {
        kpanic!("cannot identity-map low memory: {}", e);
    }

    KERNEL_DIRECTORY.store(space.root().as_u32(), Ordering::Release);
    // Safety: the executing code, stack and paging structures all lie in
    // the identity-mapped first 4 MiB.
    unsafe {
        kernel_vmem::enable_paging(space.root());
    }

    log::info!("paging enabled, directory at {}", space.root());
}

/// Claim the heap's initial megabyte.
pub fn init_heap() {
    let mut heap = HEAP.lock();
    if let Err(e) = heap.expand(&mut PageBacking, HEAP_INITIAL_SIZE as usize) {
        kpanic!("cannot initialize the kernel heap: {}", e);
    }
    let (total, _, _) = heap.stats();
    log::info!("heap: {} KiB at {:#010x}", total / 1024, HEAP_START);
}

/// Heap growth: allocate a frame, map it writable; on mapping failure the
/// frame goes back and the growth fails.
pub struct PageBacking;

impl HeapBacking for PageBacking {
    fn provide_page(&mut self, addr: usize) -> Result<(), HeapError> {
        let va = VirtualAddress::new(addr as u32);
        let mut frames = FRAMES.lock_irq();
        let frame = frames.alloc_frame().ok_or(HeapError::Exhausted)?;
        let rw = PageFlags::PRESENT | PageFlags::WRITABLE;
        if kernel_space().map_one(&mut *frames, va, frame, rw).is_err() {
            frames.free_frame(frame);
            return Err(HeapError::Exhausted);
        }
        Ok(())
    }
}

/// Allocate one physical frame.
pub fn alloc_frame() -> Option<PhysicalAddress> {
    FRAMES.lock_irq().alloc_frame()
}

/// Release one physical frame.
pub fn free_frame(frame: PhysicalAddress) {
    FRAMES.lock_irq().free_frame(frame);
}

/// Free frame count.
pub fn free_frames() -> usize {
    FRAMES.lock_irq().free_frames()
}

/// Translate a virtual address through the kernel directory.
pub fn translate(va: VirtualAddress) -> Option<PhysicalAddress> {
    kernel_space().translate(va)
}

/// Allocate from the kernel heap.
pub fn kmalloc(size: usize) -> Option<core::ptr::NonNull<u8>> {
    HEAP.lock_irq().alloc(size, &mut PageBacking)
}

/// Return a heap allocation.
pub fn kfree(ptr: *mut u8) {
    HEAP.lock_irq().free(ptr);
}

/// Resize a heap allocation.
pub fn krealloc(ptr: *mut u8, size: usize) -> Option<core::ptr::NonNull<u8>> {
    HEAP.lock_irq().realloc(ptr, size, &mut PageBacking)
}
