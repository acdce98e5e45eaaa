//! Interrupt Descriptor Table.
//!
//! 256 eight-byte gates routing CPU vectors to the entry stubs in
//! [`stubs`](super::stubs). Exceptions 0–31 and hardware lines 32–47 get
//! interrupt gates (IF cleared on entry); everything else stays
//! not-present and faults into the general-protection path if ever taken.

use bitfield_struct::bitfield;
use core::mem::MaybeUninit;
use kernel_info::segments;

// An i386 gate is 8 bytes; the limit arithmetic below relies on it.
const _: () = assert!(size_of::<IdtEntry>() == 8);

/// Attribute byte of a gate: `| P | DPL(2) | S | type(4) |`.
#[bitfield(u8)]
pub struct GateAttributes {
    /// 0xE = 32-bit interrupt gate, 0xF = 32-bit trap gate.
    #[bits(4)]
    pub gate_type: u8,

    /// Must be zero for interrupt/trap gates.
    pub storage: bool,

    /// Privilege required to invoke via software `int`.
    #[bits(2)]
    pub dpl: u8,

    /// Entry is valid.
    pub present: bool,
}

impl GateAttributes {
    /// A present ring-0 32-bit interrupt gate (0x8E).
    #[must_use]
    pub const fn interrupt_gate() -> Self {
        Self::new().with_gate_type(0xE).with_present(true)
    }
}

/// One 8-byte gate descriptor.
#[repr(C)]
#[derive(Copy, Clone)]
struct IdtEntry {
    offset_lo: u16,
    selector: u16,
    zero: u8,
    attributes: u8,
    offset_hi: u16,
}

impl IdtEntry {
    const MISSING: Self = Self {
        offset_lo: 0,
        selector: 0,
        zero: 0,
        attributes: 0,
        offset_hi: 0,
    };

    fn gate(handler: u32, selector: u32, attributes: GateAttributes) -> Self {
        Self {
            offset_lo: (handler & 0xFFFF) as u16,
            selector: selector as u16,
            zero: 0,
            attributes: attributes.into_bits(),
            offset_hi: (handler >> 16) as u16,
        }
    }
}

/// The 256-entry table.
#[repr(C, align(16))]
struct Idt {
    entries: [IdtEntry; 256],
}

/// Operand of `lidt`.
#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

/// The global IDT. Written once during [`init`], before interrupts are
/// enabled; the CPU reads it from then on.
static mut IDT: MaybeUninit<Idt> = MaybeUninit::uninit();

/// Build the table (all 48 stub vectors as ring-0 interrupt gates) and
/// load it into IDTR.
///
/// # Safety
/// Call exactly once during bring-up, with interrupts disabled, after the
/// GDT is live (the gates reference the kernel code selector).
pub unsafe fn init() {
    let mut idt = Idt {
        entries: [IdtEntry::MISSING; 256],
    };

    let attributes = GateAttributes::interrupt_gate();
    for (vector, &stub) in super::stubs::STUB_TABLE.iter().enumerate() {
        idt.entries[vector] = IdtEntry::gate(stub as u32, segments::KERNEL_CODE, attributes);
    }

    #[allow(static_mut_refs)]
    unsafe {
        IDT.write(idt);
        let pointer = IdtPointer {
            limit: (size_of::<Idt>() - 1) as u16,
            base: IDT.assume_init_ref() as *const Idt as u32,
        };
        core::arch::asm!(
            "lidt [{pointer}]",
            pointer = in(reg) &raw const pointer,
            options(readonly, nostack, preserves_flags)
        );
    }
}
