use crate::{FrameAlloc, PageEntryBits, PageFlags, PageTable, PhysMapper, flush_tlb};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};

/// Mapping failure.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum MapError {
    /// The frame allocator could not provide a page table.
    #[error("out of physical memory while creating a page table")]
    OutOfMemory,
}

/// One address space: a root page directory plus the mapper that makes its
/// physical structures reachable.
///
/// All mutation goes through the [`PhysMapper`], so the same code serves
/// the real identity-mapped kernel and the in-memory test rig.
pub struct AddressSpace<'m, M: PhysMapper> {
    mapper: &'m M,
    root: PhysicalAddress,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Wrap an existing directory.
    ///
    /// # Safety
    /// `root` must be the physical base of a 4 KiB page directory whose
    /// present entries all reference valid page tables, and it must be
    /// reachable through `mapper`.
    #[must_use]
    pub unsafe fn new(mapper: &'m M, root: PhysicalAddress) -> Self {
        Self { mapper, root }
    }

    /// Allocate and zero a fresh directory, then wrap it.
    pub fn create<A: FrameAlloc>(mapper: &'m M, alloc: &mut A) -> Result<Self, MapError> {
        let root = alloc.alloc_frame().ok_or(MapError::OutOfMemory)?;
        // Safety: the frame is fresh, page-aligned and ours; zeroing makes
        // every entry not-present.
        unsafe {
            let table: &mut PageTable = mapper.phys_to_mut(root);
            table.zero();
            Ok(Self::new(mapper, root))
        }
    }

    /// Physical base of the page directory (the CR3 value).
    #[inline]
    #[must_use]
    pub fn root(&self) -> PhysicalAddress {
        self.root
    }

    /// The page table covering `va`, if its directory entry is present.
    fn existing_table(&self, va: VirtualAddress) -> Option<&mut PageTable> {
        // Safety: `root` is a valid directory per the constructor contract.
        let directory: &mut PageTable = unsafe { self.mapper.phys_to_mut(self.root) };
        let pde = directory.entry(va.directory_index());
        // Safety: present directory entries reference live page tables.
        pde.present()
            .then(|| unsafe { self.mapper.phys_to_mut(pde.address()) })
    }

    /// The page table covering `va`, creating and installing a zeroed one
    /// when the directory entry is absent.
    fn ensure_table<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
    ) -> Result<&mut PageTable, MapError> {
        if let Some(table) = self.existing_table(va) {
            return Ok(table);
        }

        let table_pa = alloc.alloc_frame().ok_or(MapError::OutOfMemory)?;
        // Safety: fresh frame, page-aligned, owned by this directory entry
        // from here on.
        let table: &mut PageTable = unsafe { self.mapper.phys_to_mut(table_pa) };
        table.zero();

        // Safety: `root` is a valid directory per the constructor contract.
        let directory: &mut PageTable = unsafe { self.mapper.phys_to_mut(self.root) };
        directory.set_entry(
            va.directory_index(),
            PageEntryBits::from_parts(table_pa, PageFlags::PRESENT | PageFlags::WRITABLE),
        );
        Ok(table)
    }

    /// Map the page containing `va` to the frame containing `pa` with the
    /// given flags, creating the page table on demand. Invalidates the TLB
    /// entry for `va`.
    pub fn map_one<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageFlags,
    ) -> Result<(), MapError> {
        let table = self.ensure_table(alloc, va)?;
        table.set_entry(va.table_index(), PageEntryBits::from_parts(pa, flags));
        flush_tlb(va);
        Ok(())
    }

    /// Clear the mapping of the page containing `va`, if any, and
    /// invalidate its TLB entry. Unmapped addresses are a no-op.
    pub fn unmap_one(&self, va: VirtualAddress) {
        if let Some(table) = self.existing_table(va) {
            table.set_entry(va.table_index(), PageEntryBits::EMPTY);
            flush_tlb(va);
        }
    }

    /// Resolve `va` to a physical address (`frame | offset`), or `None` if
    /// any level of the walk is not present.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        // Safety: `root` is a valid directory per the constructor contract.
        let directory: &PageTable = unsafe { self.mapper.phys_to_mut(self.root) };
        let pde = directory.entry(va.directory_index());
        if !pde.present() {
            return None;
        }

        // Safety: present directory entries reference live page tables.
        let table: &PageTable = unsafe { self.mapper.phys_to_mut(pde.address()) };
        let pte = table.entry(va.table_index());
        if !pte.present() {
            return None;
        }

        Some(pte.address() + va.page_offset())
    }

    /// Identity-map `[start, end)` with `flags`, page by page.
    ///
    /// Boot uses this for the first 4 MiB so kernel code and data stay
    /// reachable the instant paging turns on.
    pub fn identity_map<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        start: u32,
        end: u32,
        flags: PageFlags,
    ) -> Result<(), MapError> {
        let mut addr = start;
        while addr < end {
            self.map_one(
                alloc,
                VirtualAddress::new(addr),
                PhysicalAddress::new(addr),
                flags,
            )?;
            addr += PAGE_SIZE;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 4 KiB-aligned frame; the "physical RAM" backing store of the
    /// tests.
    #[repr(align(4096))]
    struct Aligned4K([u8; 4096]);

    /// In-memory physical memory plus a mapper resolving fake physical
    /// addresses (plain byte offsets from zero) to frames of the store.
    struct TestPhys {
        frames: Vec<Box<Aligned4K>>,
    }

    impl TestPhys {
        fn with_frames(n: usize) -> Self {
            let mut frames = Vec::with_capacity(n);
            for _ in 0..n {
                frames.push(Box::new(Aligned4K([0; 4096])));
            }
            Self { frames }
        }
    }

    impl PhysMapper for TestPhys {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let idx = (pa.as_u32() >> 12) as usize;
            // Page tables are always addressed at their base.
            debug_assert_eq!(pa.page_offset(), 0);
            let ptr = (&raw const *self.frames[idx]) as *mut T;
            // Safety: the caller promises `T` matches the frame's bytes.
            unsafe { &mut *ptr }
        }
    }

    /// Bump allocator over the fake physical space.
    struct BumpAlloc {
        next: u32,
        end: u32,
    }

    impl BumpAlloc {
        fn new(start: u32, end: u32) -> Self {
            Self { next: start, end }
        }
    }

    impl FrameAlloc for BumpAlloc {
        fn alloc_frame(&mut self) -> Option<PhysicalAddress> {
            if self.next + PAGE_SIZE > self.end {
                return None;
            }
            let pa = self.next;
            self.next += PAGE_SIZE;
            Some(PhysicalAddress::new(pa))
        }
    }

    fn rig(frames: usize) -> (TestPhys, BumpAlloc) {
        (
            TestPhys::with_frames(frames),
            BumpAlloc::new(0, (frames as u32) << 12),
        )
    }

    const RW: PageFlags = PageFlags::PRESENT.union(PageFlags::WRITABLE);

    #[test]
    fn map_then_translate_returns_frame_plus_offset() {
        let (phys, mut alloc) = rig(16);
        let aspace = AddressSpace::create(&phys, &mut alloc).unwrap();

        let va = VirtualAddress::new(0x00C0_1000);
        let pa = PhysicalAddress::new(0x0000_5000);
        aspace.map_one(&mut alloc, va, pa, RW).unwrap();

        assert_eq!(
            aspace.translate(VirtualAddress::new(0x00C0_1ABC)),
            Some(PhysicalAddress::new(0x0000_5ABC))
        );
    }

    #[test]
    fn map_unmap_restores_translate_to_none() {
        let (phys, mut alloc) = rig(16);
        let aspace = AddressSpace::create(&phys, &mut alloc).unwrap();

        let va = VirtualAddress::new(0x0040_0000);
        aspace
            .map_one(&mut alloc, va, PhysicalAddress::new(0x0000_3000), RW)
            .unwrap();
        assert!(aspace.translate(va).is_some());

        aspace.unmap_one(va);
        assert_eq!(aspace.translate(va), None);
    }

    #[test]
    fn unmap_of_unmapped_address_is_a_noop() {
        let (phys, mut alloc) = rig(8);
        let aspace = AddressSpace::create(&phys, &mut alloc).unwrap();
        aspace.unmap_one(VirtualAddress::new(0xDEAD_B000));
        assert_eq!(aspace.translate(VirtualAddress::new(0xDEAD_B000)), None);
    }

    #[test]
    fn missing_table_is_created_with_present_writable() {
        let (phys, mut alloc) = rig(16);
        let aspace = AddressSpace::create(&phys, &mut alloc).unwrap();
        let root = aspace.root();

        let va = VirtualAddress::new(0x1234_5000);
        aspace
            .map_one(&mut alloc, va, PhysicalAddress::new(0x0000_6000), RW)
            .unwrap();

        let directory: &PageTable = unsafe { phys.phys_to_mut(root) };
        let pde = directory.entry(va.directory_index());
        assert!(pde.present());
        assert!(pde.writable());
    }

    #[test]
    fn identity_map_covers_the_range() {
        let (phys, mut alloc) = rig(32);
        let aspace = AddressSpace::create(&phys, &mut alloc).unwrap();

        aspace.identity_map(&mut alloc, 0, 0x8000, RW).unwrap();

        // The property the boot path depends on: translate(va) == va.
        assert_eq!(
            aspace.translate(VirtualAddress::new(0x1000)),
            Some(PhysicalAddress::new(0x1000))
        );
        assert_eq!(
            aspace.translate(VirtualAddress::new(0x7FFF)),
            Some(PhysicalAddress::new(0x7FFF))
        );
        assert_eq!(aspace.translate(VirtualAddress::new(0x8000)), None);
    }

    #[test]
    fn allocation_failure_propagates_as_out_of_memory() {
        // Room for the directory, nothing else.
        let (phys, mut alloc) = rig(1);
        let aspace = AddressSpace::create(&phys, &mut alloc).unwrap();
        let result = aspace.map_one(
            &mut alloc,
            VirtualAddress::new(0x0040_0000),
            PhysicalAddress::new(0),
            RW,
        );
        assert_eq!(result, Err(MapError::OutOfMemory));
    }

    #[test]
    fn sub_page_bits_of_the_target_are_ignored() {
        let (phys, mut alloc) = rig(16);
        let aspace = AddressSpace::create(&phys, &mut alloc).unwrap();

        let va = VirtualAddress::new(0x0080_0000);
        aspace
            .map_one(&mut alloc, va, PhysicalAddress::new(0x0000_5ABC), RW)
            .unwrap();
        assert_eq!(
            aspace.translate(va),
            Some(PhysicalAddress::new(0x0000_5000))
        );
    }
}
