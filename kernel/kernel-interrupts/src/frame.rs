/// CPU state captured at interrupt entry.
///
/// The assembly stubs build this on the interrupted stack, in this exact
/// order (lowest address first): the saved data segment, the eight
/// general-purpose registers as `pusha` stores them, the vector number and
/// error code pushed by the stub, then the five words the CPU itself
/// pushed. Vectors without a hardware error code get a zero placeholder so
/// every handler sees an identical layout.
///
/// The frame is *live*: on return from the handler chain the stub pops it
/// back into the CPU, so a handler that rewrites these fields rewrites the
/// interrupted context. The scheduler's context switch is nothing more
/// than copying a saved context over this struct.
///
/// `user_esp` and `ss` are only pushed by the CPU on a privilege-level
/// change; for kernel-mode interrupts those two slots read as whatever sat
/// on the stack, and handlers must not interpret them.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct InterruptFrame {
    /// Data segment selector saved by the stub.
    pub ds: u32,
    // Stored by `pusha`, in its push order reversed.
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// Stack pointer value `pusha` recorded; informational only — the stub
    /// pops it into nothing (`popa` skips ESP).
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    /// Vector number, pushed by the stub.
    pub vector: u32,
    /// Hardware error code, or the stub's zero placeholder.
    pub error_code: u32,
    // Pushed by the CPU.
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    /// Only valid when the interrupt crossed privilege levels.
    pub user_esp: u32,
    /// Only valid when the interrupt crossed privilege levels.
    pub ss: u32,
}

// The stubs and the struct must agree on every slot.
const _: () = assert!(size_of::<InterruptFrame>() == 16 * 4);

impl InterruptFrame {
    /// Hardware line for an IRQ frame (`vector - 32`), or `None` for
    /// non-IRQ vectors.
    #[inline]
    #[must_use]
    pub const fn irq_line(&self) -> Option<u8> {
        if self.vector >= crate::IRQ_BASE_VECTOR
            && self.vector < crate::IRQ_BASE_VECTOR + crate::IRQ_LINES as u32
        {
            Some((self.vector - crate::IRQ_BASE_VECTOR) as u8)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn layout_matches_the_stub_contract() {
        // ds at the bottom, CPU-pushed words at the top.
        assert_eq!(offset_of!(InterruptFrame, ds), 0);
        assert_eq!(offset_of!(InterruptFrame, edi), 4);
        assert_eq!(offset_of!(InterruptFrame, eax), 32);
        assert_eq!(offset_of!(InterruptFrame, vector), 36);
        assert_eq!(offset_of!(InterruptFrame, error_code), 40);
        assert_eq!(offset_of!(InterruptFrame, eip), 44);
        assert_eq!(offset_of!(InterruptFrame, ss), 60);
    }

    #[test]
    fn irq_line_maps_the_remapped_window() {
        let mut frame = InterruptFrame {
            vector: 32,
            ..Default::default()
        };
        assert_eq!(frame.irq_line(), Some(0));
        frame.vector = 47;
        assert_eq!(frame.irq_line(), Some(15));
        frame.vector = 14;
        assert_eq!(frame.irq_line(), None);
        frame.vector = 48;
        assert_eq!(frame.irq_line(), None);
    }
}
