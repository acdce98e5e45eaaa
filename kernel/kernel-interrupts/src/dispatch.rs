use crate::{IRQ_LINES, InterruptFrame, exception_mnemonic, pic};
use core::sync::atomic::{AtomicUsize, Ordering};

/// Observer handler for a hardware line: side effects only.
pub type IrqHandler = fn(&InterruptFrame);

/// Transforming handler for a hardware line: may rewrite the saved context
/// (the scheduler's tick entry is one of these).
pub type IrqFrameHandler = fn(&mut InterruptFrame);

/// Handler for a CPU exception or software vector.
pub type ExceptionHandler = fn(&mut InterruptFrame);

/// Outcome of exception dispatch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Dispatch {
    /// A registered handler ran.
    Handled,
    /// No handler for this vector; the caller decides the fallout (the
    /// kernel panics with the mnemonic and the frame).
    Unhandled {
        vector: u32,
        mnemonic: &'static str,
    },
}

/// The handler tables: 16 hardware lines (each with at most one handler of
/// either flavor) and 256 exception/software slots.
///
/// Slots store the handler as a raw function-pointer word in an
/// [`AtomicUsize`], zero meaning empty. Dispatch therefore takes no lock
/// and is safe from interrupt context; registration is a single store and
/// may race only with dispatch, never corrupting a slot.
pub struct Dispatcher {
    irq_observers: [AtomicUsize; IRQ_LINES],
    irq_transformers: [AtomicUsize; IRQ_LINES],
    exceptions: [AtomicUsize; 256],
}

/// The kernel-wide dispatcher the assembly stubs feed.
pub static DISPATCHER: Dispatcher = Dispatcher::new();

impl Dispatcher {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            irq_observers: [const { AtomicUsize::new(0) }; IRQ_LINES],
            irq_transformers: [const { AtomicUsize::new(0) }; IRQ_LINES],
            exceptions: [const { AtomicUsize::new(0) }; 256],
        }
    }

    /// Register an observer handler for a hardware line, replacing any
    /// transforming handler there. Out-of-range lines are ignored.
    pub fn register_irq(&self, line: u8, handler: IrqHandler) {
        let Some(slot) = self.irq_observers.get(line as usize) else {
            return;
        };
        slot.store(handler as usize, Ordering::Release);
        self.irq_transformers[line as usize].store(0, Ordering::Release);
    }

    /// Register a transforming handler for a hardware line, replacing any
    /// observer there. Out-of-range lines are ignored.
    pub fn register_irq_with_frame(&self, line: u8, handler: IrqFrameHandler) {
        let Some(slot) = self.irq_transformers.get(line as usize) else {
            return;
        };
        slot.store(handler as usize, Ordering::Release);
        self.irq_observers[line as usize].store(0, Ordering::Release);
    }

    /// Remove whatever handler the line has.
    pub fn unregister_irq(&self, line: u8) {
        if (line as usize) < IRQ_LINES {
            self.irq_observers[line as usize].store(0, Ordering::Release);
            self.irq_transformers[line as usize].store(0, Ordering::Release);
        }
    }

    /// Register a handler for a CPU vector.
    pub fn register_exception(&self, vector: u8, handler: ExceptionHandler) {
        self.exceptions[vector as usize].store(handler as usize, Ordering::Release);
    }

    /// Dispatch a hardware interrupt: run the line's handler (transforming
    /// flavor wins), then issue end-of-interrupt to the controller(s).
    ///
    /// Called from the IRQ stubs with interrupts masked. Frames whose
    /// vector is outside the remapped window are ignored entirely.
    pub fn dispatch_irq(&self, frame: &mut InterruptFrame) {
        let Some(line) = frame.irq_line() else {
            return;
        };

        let transformer = self.irq_transformers[line as usize].load(Ordering::Acquire);
        if transformer != 0 {
            // Safety: only `IrqFrameHandler` values are ever stored here.
            let handler: IrqFrameHandler = unsafe { core::mem::transmute(transformer) };
            handler(frame);
        } else {
            let observer = self.irq_observers[line as usize].load(Ordering::Acquire);
            if observer != 0 {
                // Safety: only `IrqHandler` values are ever stored here.
                let handler: IrqHandler = unsafe { core::mem::transmute(observer) };
                handler(frame);
            }
        }

        // EOI strictly after the handler chain.
        pic::send_eoi(line);
    }

    /// Dispatch a CPU exception (or software vector) to its handler.
    ///
    /// Returns [`Dispatch::Unhandled`] with the vector's mnemonic when no
    /// handler is registered; the caller owns the panic.
    #[must_use]
    pub fn dispatch_exception(&self, frame: &mut InterruptFrame) -> Dispatch {
        let slot = self.exceptions[(frame.vector & 0xFF) as usize].load(Ordering::Acquire);
        if slot != 0 {
            // Safety: only `ExceptionHandler` values are ever stored here.
            let handler: ExceptionHandler = unsafe { core::mem::transmute(slot) };
            handler(frame);
            Dispatch::Handled
        } else {
            Dispatch::Unhandled {
                vector: frame.vector,
                mnemonic: exception_mnemonic(frame.vector),
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
