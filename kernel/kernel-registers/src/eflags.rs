use bitfield_struct::bitfield;

/// The EFLAGS register.
///
/// The scheduler builds initial task flags from this type (IF set plus the
/// always-one reserved bit) and the interrupt guard inspects
/// [`interrupt_enable`](Self::interrupt_enable) to know whether to restore
/// interrupts.
#[bitfield(u32)]
pub struct Eflags {
    /// Carry flag (CF, bit 0).
    pub carry: bool,

    /// Bit 1 is fixed to one on every x86.
    pub reserved_one: bool,

    /// Parity flag (PF, bit 2).
    pub parity: bool,

    #[bits(1)]
    __: bool,

    /// Auxiliary carry (AF, bit 4).
    pub auxiliary_carry: bool,

    #[bits(1)]
    __: bool,

    /// Zero flag (ZF, bit 6).
    pub zero: bool,

    /// Sign flag (SF, bit 7).
    pub sign: bool,

    /// Trap flag (TF, bit 8): single-step.
    pub trap: bool,

    /// Interrupt enable (IF, bit 9).
    pub interrupt_enable: bool,

    /// Direction flag (DF, bit 10).
    pub direction: bool,

    /// Overflow flag (OF, bit 11).
    pub overflow: bool,

    /// I/O privilege level (IOPL, bits 12–13).
    #[bits(2)]
    pub io_privilege: u8,

    /// Nested task (NT, bit 14).
    pub nested_task: bool,

    #[bits(17)]
    __: u32,
}

impl Eflags {
    /// The value installed into freshly created task contexts: interrupts
    /// enabled, mandatory bit 1 set, everything else clear (0x202).
    #[must_use]
    pub const fn initial_task_flags() -> Self {
        Self::new().with_reserved_one(true).with_interrupt_enable(true)
    }

    /// Read the live EFLAGS via `pushfd`/`pop`.
    #[cfg(target_arch = "x86")]
    #[inline]
    #[must_use]
    pub fn read() -> Self {
        let raw: u32;
        unsafe {
            core::arch::asm!("pushfd; pop {}", out(reg) raw, options(nomem, preserves_flags));
        }
        Self::from_bits(raw)
    }

    /// Host stand-in: reports interrupts permanently disabled, which is the
    /// conservative answer for lock guards under test.
    #[cfg(not(target_arch = "x86"))]
    #[inline]
    #[must_use]
    pub fn read() -> Self {
        Self::new()
    }
}
