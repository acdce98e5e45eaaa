use crate::irq::IrqGuard;
use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// A test-and-test-and-set spin lock.
///
/// The contended path spins on a plain load (cheap, cache-friendly) and
/// only retries the compare-exchange when the lock looks free.
pub struct SpinLock<T> {
    /// `true` while held.
    locked: AtomicBool,
    inner: UnsafeCell<T>,
}

// Safety: the lock provides mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    /// Try once; returns immediately.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
            .then_some(SpinLockGuard { lock: self })
    }

    /// Spin until acquired, then return a guard.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    /// Acquire with interrupts disabled for the guard's lifetime.
    ///
    /// The interrupt state is saved before the lock is taken and restored
    /// after it is released, in that order, so an interrupt handler on this
    /// CPU can never observe the lock held. Use this for any state an
    /// interrupt handler also touches (handler tables, the ready queue, the
    /// tick counter).
    #[inline]
    pub fn lock_irq(&self) -> IrqLockGuard<'_, T> {
        let irq = IrqGuard::new();
        let guard = self.lock();
        IrqLockGuard { _irq: irq, guard }
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Mutable access when holding `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Bypass the lock entirely.
    ///
    /// The panic path must reach the console even when the panicking
    /// context itself holds a console lock; taking it normally would spin
    /// forever on a single CPU.
    ///
    /// # Safety
    /// Only from a non-returning path (panic) with interrupts disabled:
    /// nothing else may touch the data concurrently, and no guard will be
    /// dropped afterwards that assumes exclusive access.
    #[inline]
    #[must_use]
    pub unsafe fn steal(&self) -> &mut T {
        unsafe { &mut *self.inner.get() }
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // Release publishes the critical section.
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Guard returned by [`SpinLock::lock_irq`].
///
/// Field order matters: the lock guard drops (releasing the lock) before
/// the interrupt guard restores IF.
pub struct IrqLockGuard<'a, T> {
    guard: SpinLockGuard<'a, T>,
    _irq: IrqGuard,
}

impl<T> Deref for IrqLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
