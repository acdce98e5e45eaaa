use bitfield_struct::bitfield;

/// Well-known mnemonics for CPU exception vectors 0–31.
static EXCEPTION_MNEMONICS: [&str; 32] = [
    "Division By Zero",
    "Debug",
    "Non Maskable Interrupt",
    "Breakpoint",
    "Into Detected Overflow",
    "Out of Bounds",
    "Invalid Opcode",
    "No Coprocessor",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Bad TSS",
    "Segment Not Present",
    "Stack Fault",
    "General Protection Fault",
    "Page Fault",
    "Unknown Interrupt",
    "Coprocessor Fault",
    "Alignment Check",
    "Machine Check",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
];

/// Mnemonic for a CPU vector; vectors ≥ 32 answer `"Unknown Interrupt"`.
#[must_use]
pub fn exception_mnemonic(vector: u32) -> &'static str {
    EXCEPTION_MNEMONICS
        .get(vector as usize)
        .copied()
        .unwrap_or("Unknown Interrupt")
}

/// Page-fault error code (vector 14).
///
/// Each bit describes the access that faulted.
/// Reference: Intel SDM Vol. 3A, "Page-Fault Exception (#PF)".
#[bitfield(u32)]
pub struct PageFaultError {
    /// 0 = non-present page, 1 = protection violation on a present page.
    pub present: bool,

    /// 0 = read, 1 = write.
    pub write: bool,

    /// 1 = the access came from user mode (CPL 3).
    pub user: bool,

    /// 1 = a reserved bit was set in a paging structure.
    pub reserved_bit: bool,

    /// 1 = instruction fetch.
    pub instruction_fetch: bool,

    #[bits(27)]
    __: u32,
}

impl PageFaultError {
    /// One-line cause description for the panic message.
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        match (self.present(), self.write()) {
            (false, false) => "Read from non-present page",
            (false, true) => "Write to non-present page",
            (true, true) => "Write protection violation",
            (true, false) => "Read protection violation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_vectors_have_their_names() {
        assert_eq!(exception_mnemonic(0), "Division By Zero");
        assert_eq!(exception_mnemonic(13), "General Protection Fault");
        assert_eq!(exception_mnemonic(14), "Page Fault");
        assert_eq!(exception_mnemonic(31), "Reserved");
        assert_eq!(exception_mnemonic(32), "Unknown Interrupt");
        assert_eq!(exception_mnemonic(255), "Unknown Interrupt");
    }

    #[test]
    fn error_code_zero_is_a_non_present_read() {
        assert_eq!(PageFaultError::from_bits(0).explain(), "Read from non-present page");
    }

    #[test]
    fn explain_distinguishes_the_four_cases() {
        assert_eq!(
            PageFaultError::new().with_write(true).explain(),
            "Write to non-present page"
        );
        assert_eq!(
            PageFaultError::new().with_present(true).with_write(true).explain(),
            "Write protection violation"
        );
        assert_eq!(
            PageFaultError::new().with_present(true).explain(),
            "Read protection violation"
        );
    }
}
