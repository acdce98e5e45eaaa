use bitfield_struct::bitfield;

/// Control register 0.
///
/// The machine-control bits that matter during bring-up. Only
/// [`paging`](Self::paging) (PG, bit 31) and
/// [`write_protect`](Self::write_protect) (WP, bit 16) are touched by this
/// kernel; the rest are modelled so a read-modify-write round trip never
/// clobbers state the bootloader established.
///
/// Reference: Intel SDM Vol. 3A, "Control Registers".
#[bitfield(u32)]
pub struct Cr0 {
    /// Protected mode enable (PE, bit 0). Set by the boot path long before
    /// Rust runs.
    pub protected_mode: bool,

    /// Monitor coprocessor (MP, bit 1).
    pub monitor_coprocessor: bool,

    /// x87 emulation (EM, bit 2).
    pub emulate_fpu: bool,

    /// Task switched (TS, bit 3).
    pub task_switched: bool,

    /// Extension type (ET, bit 4). Hardwired on modern CPUs.
    pub extension_type: bool,

    /// Numeric error reporting (NE, bit 5).
    pub numeric_error: bool,

    #[bits(10)]
    __: u16,

    /// Write protect (WP, bit 16): when set, CPL0 honors read-only pages.
    pub write_protect: bool,

    #[bits(1)]
    __: bool,

    /// Alignment mask (AM, bit 18).
    pub alignment_mask: bool,

    #[bits(10)]
    __: u16,

    /// Not write-through (NW, bit 29).
    pub not_write_through: bool,

    /// Cache disable (CD, bit 30).
    pub cache_disable: bool,

    /// Paging enable (PG, bit 31). Requires a valid directory in CR3.
    pub paging: bool,
}

impl Cr0 {
    /// Read the current CR0 value.
    ///
    /// # Safety
    /// Requires CPL0.
    #[cfg(target_arch = "x86")]
    #[inline]
    #[must_use]
    pub unsafe fn read() -> Self {
        let raw: u32;
        unsafe {
            core::arch::asm!("mov {}, cr0", out(reg) raw, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(raw)
    }

    /// Write this value to CR0.
    ///
    /// # Safety
    /// Requires CPL0. Setting [`paging`](Self::paging) with an invalid CR3
    /// faults on the next instruction fetch.
    #[cfg(target_arch = "x86")]
    #[inline]
    pub unsafe fn write(self) {
        unsafe {
            core::arch::asm!("mov cr0, {}", in(reg) self.into_bits(), options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_is_bit_31() {
        let cr0 = Cr0::new().with_paging(true);
        assert_eq!(cr0.into_bits(), 0x8000_0000);
    }

    #[test]
    fn enabling_paging_preserves_other_bits() {
        let boot = Cr0::from_bits(0x0000_0011); // PE | ET, a typical boot value
        let after = boot.with_paging(true);
        assert!(after.protected_mode());
        assert!(after.extension_type());
        assert_eq!(after.into_bits(), 0x8000_0011);
    }
}
