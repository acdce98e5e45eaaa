use crate::PageFlags;
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// Entries per page directory or page table.
pub const PAGE_TABLE_ENTRIES: usize = 1024;

/// One 32-bit paging entry, either level.
///
/// Directory entries and table entries share this layout; the difference
/// is only what the frame field points at (a page table vs. a mapped
/// page).
///
/// | Bits  | Name | Meaning                                             |
/// |-------|------|-----------------------------------------------------|
/// | 0     | P    | present                                             |
/// | 1     | RW   | writable                                            |
/// | 2     | US   | user-accessible                                     |
/// | 3     | PWT  | write-through                                       |
/// | 4     | PCD  | cache disable                                       |
/// | 5     | A    | accessed (set by CPU)                               |
/// | 6     | D    | dirty (leaf only, set by CPU)                       |
/// | 7     | PS   | 4 MiB page (directory only, unused here)            |
/// | 8     | G    | global                                              |
/// | 9–11  | —    | free for OS use                                     |
/// | 12–31 | addr | physical frame number                               |
#[bitfield(u32)]
pub struct PageEntryBits {
    pub present: bool,
    pub writable: bool,
    pub user_access: bool,
    pub write_through: bool,
    pub cache_disabled: bool,
    pub accessed: bool,
    pub dirty: bool,
    /// 4 MiB page-size flag; this kernel maps 4 KiB pages only.
    pub large_page: bool,
    pub global: bool,
    #[bits(3)]
    pub os_avail: u8,
    /// Physical frame number (address bits 12–31).
    #[bits(20)]
    pub frame: u32,
}

impl PageEntryBits {
    /// An all-zero, not-present entry.
    pub const EMPTY: Self = Self::new();

    /// Build an entry from a (page-aligned) physical address and request
    /// flags. Sub-page bits of `pa` are discarded, as the hardware would.
    #[must_use]
    pub const fn from_parts(pa: PhysicalAddress, flags: PageFlags) -> Self {
        Self::from_bits((pa.as_u32() & !0xFFF) | flags.bits())
    }

    /// Physical address this entry refers to.
    #[must_use]
    pub const fn address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.frame() << 12)
    }
}

/// A page directory or page table: 1024 entries, 4 KiB, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntryBits; PAGE_TABLE_ENTRIES],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl PageTable {
    /// Clear every entry to not-present.
    pub fn zero(&mut self) {
        for entry in &mut self.entries {
            *entry = PageEntryBits::EMPTY;
        }
    }

    #[inline]
    #[must_use]
    pub fn entry(&self, index: usize) -> PageEntryBits {
        self.entries[index]
    }

    #[inline]
    pub fn set_entry(&mut self, index: usize, entry: PageEntryBits) {
        self.entries[index] = entry;
    }
}
