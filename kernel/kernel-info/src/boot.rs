//! Multiboot 1 boot information.
//!
//! The bootloader leaves a magic value in `EAX` and a pointer to the
//! [`MultibootInfo`] block in `EBX`. Which fields of the block are valid is
//! governed by [`InfoFlags`]; reading a field whose flag is clear yields
//! garbage, so every accessor here checks first.
//!
//! Reference: Multiboot Specification 0.6.96, §3.3.

use bitflags::bitflags;
use core::marker::PhantomData;

/// Magic the *kernel image* embeds in its Multiboot header.
pub const HEADER_MAGIC: u32 = 0x1BAD_B002;

/// Header flags: align modules on page boundaries, provide a memory map.
pub const HEADER_FLAGS: u32 = 0x0000_0003;

/// Header checksum: magic + flags + checksum must be zero.
pub const HEADER_CHECKSUM: u32 = HEADER_MAGIC.wrapping_add(HEADER_FLAGS).wrapping_neg();

/// Magic the *bootloader* passes in `EAX` when calling the kernel.
pub const BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;

bitflags! {
    /// Validity bits of the [`MultibootInfo`] fields.
    #[derive(Copy, Clone, Debug)]
    pub struct InfoFlags: u32 {
        /// `mem_lower` / `mem_upper` are valid.
        const MEMORY = 1 << 0;
        /// `boot_device` is valid.
        const BOOT_DEVICE = 1 << 1;
        /// `cmdline` points at a NUL-terminated command line.
        const CMDLINE = 1 << 2;
        /// `mods_count` / `mods_addr` are valid.
        const MODULES = 1 << 3;
        /// `mmap_length` / `mmap_addr` describe a memory map.
        const MEMORY_MAP = 1 << 6;
    }
}

/// The information block passed by the bootloader, up to the fields this
/// kernel consumes. The block lives in bootloader-owned memory; it is only
/// read, never written.
#[repr(C)]
pub struct MultibootInfo {
    pub flags: u32,
    /// KiB of conventional memory below 1 MiB.
    pub mem_lower: u32,
    /// KiB of memory above 1 MiB.
    pub mem_upper: u32,
    pub boot_device: u32,
    /// Physical address of the NUL-terminated command line.
    pub cmdline: u32,
    pub mods_count: u32,
    pub mods_addr: u32,
    pub syms: [u32; 4],
    /// Total byte length of the memory-map buffer.
    pub mmap_length: u32,
    /// Physical address of the first memory-map entry.
    pub mmap_addr: u32,
}

impl MultibootInfo {
    #[inline]
    #[must_use]
    pub fn info_flags(&self) -> InfoFlags {
        InfoFlags::from_bits_truncate(self.flags)
    }

    #[inline]
    #[must_use]
    pub fn has_memory_map(&self) -> bool {
        self.info_flags().contains(InfoFlags::MEMORY_MAP)
    }

    #[inline]
    #[must_use]
    pub fn has_cmdline(&self) -> bool {
        self.info_flags().contains(InfoFlags::CMDLINE)
    }

    /// Iterate the memory map, if the bootloader provided one.
    ///
    /// # Safety
    /// `mmap_addr`/`mmap_length` must describe readable memory laid out as
    /// Multiboot memory-map entries (guaranteed by a conforming bootloader
    /// when the flag is set, and by identity mapping of low memory here).
    #[must_use]
    pub unsafe fn memory_map(&self) -> Option<MemoryMapIter<'_>> {
        self.has_memory_map().then(|| MemoryMapIter {
            cursor: self.mmap_addr as usize as *const u8,
            end: (self.mmap_addr + self.mmap_length) as usize as *const u8,
            _info: PhantomData,
        })
    }
}

/// Kind of a memory-map region.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegionKind {
    /// Usable RAM.
    Available,
    /// Firmware-reserved, ACPI, defective or otherwise untouchable.
    Reserved(u32),
}

impl RegionKind {
    const AVAILABLE: u32 = 1;

    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            Self::AVAILABLE => Self::Available,
            other => Self::Reserved(other),
        }
    }
}

/// One decoded memory-map region.
#[derive(Copy, Clone, Debug)]
pub struct MemoryRegion {
    /// Start address. 64-bit in the wire format; above-4 GiB regions are
    /// irrelevant to a 32-bit kernel but still reported faithfully.
    pub base: u64,
    pub length: u64,
    pub kind: RegionKind,
}

impl MemoryRegion {
    /// Exclusive end address.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base + self.length
    }
}

/// Raw wire layout of one memory-map entry.
///
/// `size` counts the bytes *after* itself; successive entries sit at
/// `entry + size + 4`. The 64-bit fields are only 4-byte aligned, hence
/// `packed` and unaligned reads.
#[repr(C, packed)]
struct RawMmapEntry {
    size: u32,
    base: u64,
    length: u64,
    kind: u32,
}

/// Iterator over the bootloader's memory-map buffer.
#[derive(Clone)]
pub struct MemoryMapIter<'a> {
    cursor: *const u8,
    end: *const u8,
    _info: PhantomData<&'a MultibootInfo>,
}

impl Iterator for MemoryMapIter<'_> {
    type Item = MemoryRegion;

    fn next(&mut self) -> Option<MemoryRegion> {
        if self.cursor >= self.end {
            return None;
        }
        // Safety: construction guaranteed the buffer bounds; entries are
        // read unaligned because of the packed 64-bit fields.
        let raw = unsafe { core::ptr::read_unaligned(self.cursor.cast::<RawMmapEntry>()) };
        self.cursor = unsafe { self.cursor.add(raw.size as usize + size_of::<u32>()) };
        Some(MemoryRegion {
            base: raw.base,
            length: raw.length,
            kind: RegionKind::from_raw(raw.kind),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serialize entries the way a bootloader would: `size` excludes its
    /// own field, 20 payload bytes per entry here.
    fn encode_map(regions: &[(u64, u64, u32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        for &(base, length, kind) in regions {
            buf.extend_from_slice(&20u32.to_le_bytes());
            buf.extend_from_slice(&base.to_le_bytes());
            buf.extend_from_slice(&length.to_le_bytes());
            buf.extend_from_slice(&kind.to_le_bytes());
        }
        buf
    }

    fn iter_over(buf: &[u8]) -> MemoryMapIter<'_> {
        MemoryMapIter {
            cursor: buf.as_ptr(),
            end: unsafe { buf.as_ptr().add(buf.len()) },
            _info: PhantomData,
        }
    }

    #[test]
    fn decodes_entries_and_advances_by_size_plus_four() {
        let buf = encode_map(&[
            (0x0, 0x9_F000, 1),
            (0x10_0000, 0x3F0_0000, 1),
            (0xFFFC_0000, 0x4_0000, 2),
        ]);
        let regions: Vec<_> = iter_over(&buf).collect();
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].kind, RegionKind::Available);
        assert_eq!(regions[1].base, 0x10_0000);
        assert_eq!(regions[1].end(), 0x400_0000);
        assert_eq!(regions[2].kind, RegionKind::Reserved(2));
    }

    #[test]
    fn empty_map_yields_nothing() {
        let buf = encode_map(&[]);
        assert_eq!(iter_over(&buf).count(), 0);
    }

    #[test]
    fn header_checksum_sums_to_zero() {
        assert_eq!(
            HEADER_MAGIC
                .wrapping_add(HEADER_FLAGS)
                .wrapping_add(HEADER_CHECKSUM),
            0
        );
    }
}
