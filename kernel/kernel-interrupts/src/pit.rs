//! 8254 programmable interval timer, channel 0.
//!
//! Channel 0 is wired to hardware line 0 and drives all preemption. The
//! chip divides a fixed 1.193182 MHz input clock by a 16-bit divisor;
//! [`init`] programs square-wave mode (mode 3) at the requested rate and
//! reports the rate actually achieved.
//!
//! Every tick increments a monotonic 64-bit counter and forwards the live
//! interrupt frame to a single registered *tick sink* — the scheduler —
//! before end-of-interrupt is issued by the dispatcher.

use crate::{DISPATCHER, IRQ_TIMER, InterruptFrame, pic};
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use kernel_registers::ports::outb;

/// Input clock of the 8254, in Hz.
pub const PIT_BASE_FREQUENCY: u32 = 1_193_182;

/// Channel-0 data port.
const CHANNEL0: u16 = 0x40;
/// Mode/command register.
const COMMAND: u16 = 0x43;
/// Channel 0, lobyte/hibyte access, mode 3 (square wave), binary.
const COMMAND_SQUARE_WAVE: u8 = 0x36;

/// A function invoked on every timer tick with the live interrupt frame.
pub type TickSink = fn(&mut InterruptFrame);

/// Timer state: tick counter, achieved rate, registered sink.
pub struct Timer {
    ticks: AtomicU64,
    actual_hz: AtomicU32,
    sink: AtomicUsize,
}

/// The kernel's one timer instance.
pub static TIMER: Timer = Timer::new();

impl Timer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            actual_hz: AtomicU32::new(0),
            sink: AtomicUsize::new(0),
        }
    }

    /// Ticks since boot. Strictly monotonic.
    #[inline]
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// The rate the divisor actually produces, in Hz. Zero before `init`.
    #[inline]
    #[must_use]
    pub fn frequency(&self) -> u32 {
        self.actual_hz.load(Ordering::Relaxed)
    }

    /// Register the single tick sink, replacing any previous one.
    pub fn set_tick_sink(&self, sink: TickSink) {
        self.sink.store(sink as usize, Ordering::Release);
    }

    /// One tick: bump the counter, forward the frame to the sink.
    ///
    /// Runs in interrupt context via [`timer_irq`]; exposed for the
    /// dispatch tests.
    pub fn tick(&self, frame: &mut InterruptFrame) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let sink = self.sink.load(Ordering::Acquire);
        if sink != 0 {
            // Safety: only `TickSink` values are ever stored here.
            let sink: TickSink = unsafe { core::mem::transmute(sink) };
            sink(frame);
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Divisor programming `hz` on the 8254, clamped to the chip's 16-bit
/// range. A zero request (and any request above the input clock) clamps to
/// divisor 1; requests below ~19 Hz clamp to 65 535.
#[must_use]
pub fn divisor_for(hz: u32) -> u16 {
    if hz == 0 {
        return 1;
    }
    (PIT_BASE_FREQUENCY / hz).clamp(1, 65_535) as u16
}

/// Transforming IRQ handler for hardware line 0.
fn timer_irq(frame: &mut InterruptFrame) {
    TIMER.tick(frame);
}

/// Program channel 0 at (approximately) `hz`, install the timer's handler
/// on hardware line 0 and unmask it. Returns the achieved rate.
///
/// # Safety
/// Reprograms the system timer; call once during bring-up, with interrupts
/// disabled, after [`pic::remap`].
pub unsafe fn init(hz: u32) -> u32 {
    let divisor = divisor_for(hz);
    let actual = PIT_BASE_FREQUENCY / u32::from(divisor);
    TIMER.actual_hz.store(actual, Ordering::Relaxed);

    unsafe {
        outb(COMMAND, COMMAND_SQUARE_WAVE);
        outb(CHANNEL0, (divisor & 0xFF) as u8);
        outb(CHANNEL0, (divisor >> 8) as u8);
    }

    DISPATCHER.register_irq_with_frame(IRQ_TIMER, timer_irq);
    unsafe {
        pic::clear_mask(IRQ_TIMER);
    }

    actual
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisor_for_the_default_rate() {
        // 1193182 / 100 = 11931 (integer division)
        assert_eq!(divisor_for(100), 11_931);
    }

    #[test]
    fn divisor_clamps_at_both_ends() {
        assert_eq!(divisor_for(0), 1);
        assert_eq!(divisor_for(PIT_BASE_FREQUENCY + 1), 1);
        assert_eq!(divisor_for(2_000_000), 1);
        assert_eq!(divisor_for(18), 65_535);
        assert_eq!(divisor_for(1), 65_535);
    }

    #[test]
    fn achieved_rate_round_trips_through_the_divisor() {
        let divisor = divisor_for(100);
        let actual = PIT_BASE_FREQUENCY / u32::from(divisor);
        // 1193182 / 11931 = 100 Hz (and a bit)
        assert_eq!(actual, 100);
    }

    #[test]
    fn ticks_are_monotonic_and_reach_the_sink() {
        static SEEN: AtomicU64 = AtomicU64::new(0);

        fn sink(frame: &mut InterruptFrame) {
            SEEN.fetch_add(1, Ordering::SeqCst);
            frame.eax = 0x71C7_0C1C;
        }

        let timer = Timer::new();
        timer.set_tick_sink(sink);

        let mut frame = InterruptFrame::default();
        let mut last = timer.ticks();
        for _ in 0..5 {
            timer.tick(&mut frame);
            let now = timer.ticks();
            assert!(now > last);
            last = now;
        }
        assert_eq!(SEEN.load(Ordering::SeqCst), 5);
        // The sink received the live frame by mutable reference.
        assert_eq!(frame.eax, 0x71C7_0C1C);
    }

    #[test]
    fn tick_without_sink_still_counts() {
        let timer = Timer::new();
        let mut frame = InterruptFrame::default();
        timer.tick(&mut frame);
        timer.tick(&mut frame);
        assert_eq!(timer.ticks(), 2);
    }
}
