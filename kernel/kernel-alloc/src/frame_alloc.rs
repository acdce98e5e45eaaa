//! Bitmap allocator for physical 4 KiB frames.
//!
//! One bit per frame, a set bit meaning *not available*. The bitmap itself
//! lives in RAM the caller carves out right after the kernel image; this
//! module only receives the pointer.
//!
//! Initialization follows the boot information: with a memory map, the
//! frame count comes from the highest region end and exactly the
//! *available* regions are released; without one, the lower/upper memory
//! fields stand in. Low memory and the kernel image (bitmap included) are
//! then re-reserved. Counters only move on bit *transitions*, so redundant
//! marking is harmless.

use kernel_info::memory::{KERNEL_LOAD_BASE, LOW_MEMORY_END};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};

/// Where the frame allocator learns the machine's memory layout from.
///
/// Decoupled from the raw Multiboot block so the region source can be an
/// in-memory list under test. The iterator is consumed twice (sizing pass,
/// release pass), hence `Clone`.
#[derive(Clone)]
pub enum BootMemory<I> {
    /// A Multiboot memory map.
    Map(I),
    /// Fallback: the lower/upper memory fields, in KiB.
    Range { lower_kib: u32, upper_kib: u32 },
}

impl<I> BootMemory<I>
where
    I: Iterator<Item = kernel_info::boot::MemoryRegion> + Clone,
{
    /// Total number of frames this memory layout implies.
    ///
    /// With a map this is the frame containing the highest region end
    /// (clamped to the 32-bit address space); with the fallback it is
    /// lower + upper memory divided into frames. Zero fields yield an
    /// empty allocator in which every allocation fails cleanly.
    #[must_use]
    pub fn total_frames(&self) -> usize {
        match self {
            Self::Map(regions) => {
                let highest = regions
                    .clone()
                    .map(|r| r.end())
                    .max()
                    .unwrap_or(0)
                    .min(u64::from(u32::MAX) + 1);
                (highest / u64::from(PAGE_SIZE)) as usize
            }
            Self::Range {
                lower_kib,
                upper_kib,
            } => (((*lower_kib as u64 + *upper_kib as u64) * 1024) / u64::from(PAGE_SIZE)) as usize,
        }
    }

    /// `u32` words of bitmap storage needed for this layout.
    #[must_use]
    pub fn bitmap_words(&self) -> usize {
        self.total_frames().div_ceil(32)
    }
}

/// The physical frame allocator.
///
/// # Invariants
/// - `free + used == total` at every observation point.
/// - A set bit means the frame is not available.
/// - `bitmap` points at `words` writable `u32`s for the allocator's whole
///   lifetime.
pub struct FrameBitmap {
    bitmap: *mut u32,
    words: usize,
    total: usize,
    free: usize,
    used: usize,
}

// Safety: the raw bitmap pointer is only dereferenced under the owner's
// lock; the struct itself carries no thread affinity.
unsafe impl Send for FrameBitmap {}

impl FrameBitmap {
    /// An allocator with no memory; every allocation fails until
    /// [`init`](Self::init) runs.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            bitmap: core::ptr::null_mut(),
            words: 0,
            total: 0,
            free: 0,
            used: 0,
        }
    }

    /// Initialize from the boot memory layout.
    ///
    /// `storage` must provide [`BootMemory::bitmap_words`] writable words.
    /// `kernel_range` is the physical span of the kernel image *including
    /// the bitmap storage itself*; it is reserved along with all of low
    /// memory.
    ///
    /// # Safety
    /// - `storage` points at enough writable memory, exclusive to this
    ///   allocator from now on.
    /// - The ranges described by `memory` are real RAM on this machine.
    pub unsafe fn init<I>(
        &mut self,
        memory: BootMemory<I>,
        storage: *mut u32,
        kernel_range: (u32, u32),
    ) where
        I: Iterator<Item = kernel_info::boot::MemoryRegion> + Clone,
    {
        self.total = memory.total_frames();
        self.words = self.total.div_ceil(32);
        self.bitmap = storage;

        // Everything starts out reserved.
        for i in 0..self.words {
            // Safety: `storage` covers `words` words per the contract.
            unsafe { self.bitmap.add(i).write(u32::MAX) };
        }
        self.used = self.total;
        self.free = 0;

        // Release what the firmware says is usable RAM.
        match memory {
            BootMemory::Map(regions) => {
                for region in regions {
                    if region.kind == kernel_info::boot::RegionKind::Available {
                        self.mark_region_free(region.base, region.length);
                    }
                }
            }
            BootMemory::Range { upper_kib, .. } => {
                // Everything above 1 MiB; the first megabyte is BIOS/VGA
                // territory and stays reserved below.
                self.mark_region_free(
                    u64::from(KERNEL_LOAD_BASE),
                    u64::from(upper_kib) * 1024,
                );
            }
        }

        // Re-reserve the kernel image + bitmap, and low memory.
        let (kernel_start, kernel_end) = kernel_range;
        if kernel_end > kernel_start {
            self.mark_region_used(
                u64::from(kernel_start),
                u64::from(kernel_end - kernel_start),
            );
        }
        self.mark_region_used(0, u64::from(LOW_MEMORY_END));
    }

    /// Allocate the first free frame, or `None` when memory is exhausted.
    #[must_use]
    pub fn alloc_frame(&mut self) -> Option<PhysicalAddress> {
        for word_index in 0..self.words {
            // Safety: `word_index < words`, invariant of the struct.
            let word = unsafe { self.bitmap.add(word_index).read() };
            if word == u32::MAX {
                continue;
            }
            for bit in 0..32 {
                let frame = word_index * 32 + bit;
                if frame >= self.total {
                    return None;
                }
                if word & (1 << bit) == 0 {
                    self.mark_used(frame);
                    return Some(PhysicalAddress::from_frame_number(frame as u32));
                }
            }
        }
        None
    }

    /// Release a frame. Non-page-aligned addresses are silently ignored,
    /// as are frames outside the managed range and double frees.
    pub fn free_frame(&mut self, addr: PhysicalAddress) {
        if !addr.is_page_aligned() {
            return;
        }
        self.mark_free(addr.frame_number() as usize);
    }

    /// Whether a frame is currently reserved. Out-of-range frames read as
    /// reserved.
    #[must_use]
    pub fn frame_is_used(&self, frame: usize) -> bool {
        if frame >= self.total {
            return true;
        }
        // Safety: in-range frames lie within `words` words.
        let word = unsafe { self.bitmap.add(frame / 32).read() };
        word & (1 << (frame % 32)) != 0
    }

    #[inline]
    #[must_use]
    pub fn total_frames(&self) -> usize {
        self.total
    }

    #[inline]
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.free
    }

    #[inline]
    #[must_use]
    pub fn used_frames(&self) -> usize {
        self.used
    }

    /// Total managed memory in bytes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total as u64 * u64::from(PAGE_SIZE)
    }

    /// Free memory in bytes.
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.free as u64 * u64::from(PAGE_SIZE)
    }

    /// Reserved memory in bytes.
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.used as u64 * u64::from(PAGE_SIZE)
    }

    /// Set a frame's bit; counters move only if the bit actually flips.
    fn mark_used(&mut self, frame: usize) {
        if frame >= self.total {
            return;
        }
        let mask = 1u32 << (frame % 32);
        // Safety: in-range frames lie within `words` words.
        unsafe {
            let word_ptr = self.bitmap.add(frame / 32);
            let word = word_ptr.read();
            if word & mask == 0 {
                word_ptr.write(word | mask);
                self.used += 1;
                self.free -= 1;
            }
        }
    }

    /// Clear a frame's bit; counters move only if the bit actually flips.
    fn mark_free(&mut self, frame: usize) {
        if frame >= self.total {
            return;
        }
        let mask = 1u32 << (frame % 32);
        // Safety: in-range frames lie within `words` words.
        unsafe {
            let word_ptr = self.bitmap.add(frame / 32);
            let word = word_ptr.read();
            if word & mask != 0 {
                word_ptr.write(word & !mask);
                self.free += 1;
                self.used -= 1;
            }
        }
    }

    fn mark_region_used(&mut self, start: u64, length: u64) {
        for frame in Self::region_frames(start, length) {
            self.mark_used(frame);
        }
    }

    fn mark_region_free(&mut self, start: u64, length: u64) {
        for frame in Self::region_frames(start, length) {
            self.mark_free(frame);
        }
    }

    /// Inclusive frame range covering `[start, start + length)`.
    fn region_frames(start: u64, length: u64) -> core::ops::RangeInclusive<usize> {
        if length == 0 {
            #[allow(clippy::reversed_empty_ranges)]
            return 1..=0;
        }
        let first = start / u64::from(PAGE_SIZE);
        let last = (start + length - 1) / u64::from(PAGE_SIZE);
        // Frames beyond the managed range are rejected by mark_used/free;
        // clamp anyway so the loop terminates fast for huge regions.
        let clamp = u64::from(u32::MAX) / u64::from(PAGE_SIZE);
        (first.min(clamp) as usize)..=(last.min(clamp) as usize)
    }
}

impl kernel_vmem::FrameAlloc for FrameBitmap {
    fn alloc_frame(&mut self) -> Option<PhysicalAddress> {
        FrameBitmap::alloc_frame(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::boot::{MemoryRegion, RegionKind};

    const MIB: u64 = 1024 * 1024;

    fn region(base: u64, length: u64, kind: RegionKind) -> MemoryRegion {
        MemoryRegion { base, length, kind }
    }

    /// 16 MiB machine: 640 KiB low, available RAM from 1 MiB up, with the
    /// kernel occupying 1 MiB..1 MiB+128 KiB.
    fn boot_16_mib() -> Vec<MemoryRegion> {
        vec![
            region(0, 640 * 1024, RegionKind::Available),
            region(640 * 1024, 384 * 1024, RegionKind::Reserved(2)),
            region(MIB, 15 * MIB, RegionKind::Available),
        ]
    }

    struct Rig {
        _storage: Vec<u32>,
        pmm: FrameBitmap,
    }

    fn init_rig(regions: Vec<MemoryRegion>) -> Rig {
        let memory = BootMemory::Map(regions.clone().into_iter());
        let mut storage = vec![0u32; memory.bitmap_words()];
        let mut pmm = FrameBitmap::empty();
        unsafe {
            pmm.init(
                BootMemory::Map(regions.into_iter()),
                storage.as_mut_ptr(),
                (0x0010_0000, 0x0012_0000),
            );
        }
        Rig {
            _storage: storage,
            pmm,
        }
    }

    fn popcount(pmm: &FrameBitmap) -> usize {
        (0..pmm.total_frames())
            .filter(|&f| pmm.frame_is_used(f))
            .count()
    }

    #[test]
    fn counters_always_sum_to_total() {
        let mut rig = init_rig(boot_16_mib());
        let pmm = &mut rig.pmm;
        assert_eq!(pmm.total_frames(), 16 * 1024 * 1024 / 4096);
        assert_eq!(pmm.free_frames() + pmm.used_frames(), pmm.total_frames());

        let a = pmm.alloc_frame().unwrap();
        let b = pmm.alloc_frame().unwrap();
        assert_eq!(pmm.free_frames() + pmm.used_frames(), pmm.total_frames());

        pmm.free_frame(a);
        pmm.free_frame(b);
        assert_eq!(pmm.free_frames() + pmm.used_frames(), pmm.total_frames());
    }

    #[test]
    fn popcount_tracks_the_used_counter() {
        let mut rig = init_rig(boot_16_mib());
        let pmm = &mut rig.pmm;
        assert_eq!(popcount(pmm), pmm.used_frames());

        let frames: Vec<_> = (0..5).map(|_| pmm.alloc_frame().unwrap()).collect();
        assert_eq!(popcount(pmm), pmm.used_frames());
        for f in frames {
            pmm.free_frame(f);
        }
        assert_eq!(popcount(pmm), pmm.used_frames());
    }

    #[test]
    fn low_memory_and_kernel_image_start_reserved() {
        let rig = init_rig(boot_16_mib());
        // Frame 0 and the frame at 1 MiB (kernel base) must be taken.
        assert!(rig.pmm.frame_is_used(0));
        assert!(rig.pmm.frame_is_used((0x0010_0000 / 4096) as usize));
        // The byte after the kernel range is free.
        assert!(!rig.pmm.frame_is_used((0x0012_0000 / 4096) as usize));
    }

    #[test]
    fn first_fit_reuses_a_freed_frame() {
        let mut rig = init_rig(boot_16_mib());
        let pmm = &mut rig.pmm;

        let a = pmm.alloc_frame().unwrap();
        let b = pmm.alloc_frame().unwrap();
        let c = pmm.alloc_frame().unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);

        let free_before = pmm.free_frames();
        pmm.free_frame(b);
        assert_eq!(pmm.free_frames(), free_before + 1);

        // First-fit: the scan lands on the hole b left.
        let d = pmm.alloc_frame().unwrap();
        assert_eq!(d, b);
    }

    #[test]
    fn unaligned_free_is_silently_ignored() {
        let mut rig = init_rig(boot_16_mib());
        let pmm = &mut rig.pmm;
        let free_before = pmm.free_frames();
        pmm.free_frame(PhysicalAddress::new(0x0030_0001));
        assert_eq!(pmm.free_frames(), free_before);
    }

    #[test]
    fn double_free_does_not_inflate_counters() {
        let mut rig = init_rig(boot_16_mib());
        let pmm = &mut rig.pmm;
        let a = pmm.alloc_frame().unwrap();
        pmm.free_frame(a);
        let free_after_one = pmm.free_frames();
        pmm.free_frame(a);
        assert_eq!(pmm.free_frames(), free_after_one);
    }

    #[test]
    fn exhaustion_returns_none() {
        // Tiny machine: exactly 8 frames of usable RAM above 1 MiB.
        let regions = vec![region(MIB, 8 * 4096, RegionKind::Available)];
        let memory = BootMemory::Map(regions.clone().into_iter());
        let mut storage = vec![0u32; memory.bitmap_words()];
        let mut pmm = FrameBitmap::empty();
        unsafe {
            pmm.init(
                BootMemory::Map(regions.into_iter()),
                storage.as_mut_ptr(),
                (0, 0),
            );
        }

        let mut got = 0;
        while pmm.alloc_frame().is_some() {
            got += 1;
        }
        assert_eq!(got, 8);
        assert_eq!(pmm.free_frames(), 0);
        assert!(pmm.alloc_frame().is_none());
    }

    #[test]
    fn fallback_range_frees_above_one_mib_only() {
        let memory: BootMemory<std::iter::Empty<MemoryRegion>> = BootMemory::Range {
            lower_kib: 640,
            upper_kib: 15 * 1024,
        };
        let mut storage = vec![0u32; memory.bitmap_words()];
        let mut pmm = FrameBitmap::empty();
        unsafe {
            pmm.init(memory, storage.as_mut_ptr(), (0x0010_0000, 0x0011_0000));
        }
        assert!(pmm.frame_is_used(0));
        // First frame above the kernel range is available.
        assert!(!pmm.frame_is_used((0x0011_0000 / 4096) as usize));
        assert!(pmm.free_frames() > 0);
    }

    #[test]
    fn empty_boot_info_fails_every_allocation() {
        let memory: BootMemory<std::iter::Empty<MemoryRegion>> = BootMemory::Range {
            lower_kib: 0,
            upper_kib: 0,
        };
        let mut pmm = FrameBitmap::empty();
        unsafe {
            pmm.init(memory, core::ptr::null_mut(), (0, 0));
        }
        assert_eq!(pmm.total_frames(), 0);
        assert!(pmm.alloc_frame().is_none());
    }
}
